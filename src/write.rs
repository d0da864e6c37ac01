//! Minimal textual dumps of the IR, for assertion failures and `log::trace!` output.
//!
//! Grounded in the teacher's `write.rs` (one free `write_*` function per entity that needs
//! outside context to print, rather than a `Display` impl with nowhere to put that context) -
//! [`Instruction`] and [`Location`] already implement `Display` directly since they need nothing
//! beyond `self`, but a [`Function`] needs its block arena and a [`BasicBlockData`] needs its own
//! id, neither of which fits in a bare `&self` method. This is diagnostics only: there is no
//! reader for the format this produces.

use std::fmt;

use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::types::TypeHandle;

/// Write `block`'s label (or its bare id, if it has none yet) followed by its instructions, one
/// per indented line.
pub fn write_block<T: TypeHandle>(w: &mut impl fmt::Write, func: &Function<T>, block: Block) -> fmt::Result {
    writeln!(w, "{block}:")?;
    for &inst in func.block(block).insts() {
        writeln!(w, "    {}", func.inst(inst))?;
    }
    Ok(())
}

/// Write every block of `func`, in arena (creation) order, preceded by the function's own label.
pub fn write_function<T: TypeHandle>(w: &mut impl fmt::Write, func: &Function<T>) -> fmt::Result {
    writeln!(w, "function {}:", func.label())?;
    for (block, _) in func.blocks().iter() {
        write_block(w, func, block)?;
    }
    Ok(())
}

/// Convenience wrapper returning an owned `String`, for callers that don't already have a
/// `fmt::Write` sink handy (e.g. a `log::trace!` call site or a test assertion message).
pub fn function_to_string<T: TypeHandle>(func: &Function<T>) -> String {
    let mut s = String::new();
    write_function(&mut s, func).expect("writing to a String never fails");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::location::Location;
    use crate::symbols::{Label, SymbolTables};
    use crate::types::BasicType;

    #[test]
    fn dump_includes_block_and_instruction_text() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let mut f = Function::new(Label::new(0), BasicType::I64);
        f.ir_return(BasicType::Void, Location::Immediate(7));
        let _ = &mut symtab;

        let dump = function_to_string(&f);
        assert!(dump.contains("function L0:"));
        assert!(dump.contains("ret 7"));
    }
}
