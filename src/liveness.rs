//! Iterative backward liveness dataflow over a function's flattened instruction stream.

use std::collections::BTreeSet;

use crate::ir::entities::Inst;
use crate::ir::function::Function;
use crate::symbols::Local;
use crate::types::TypeHandle;

/// The instructions that can run immediately after `inst`: the next instruction in its own block,
/// or, if `inst` is the block's last instruction, the first instruction of each successor block.
fn successors_of<T: TypeHandle>(func: &Function<T>, inst: Inst) -> Vec<Inst> {
    for (_, block) in func.blocks().iter() {
        let insts = block.insts();
        if let Some(pos) = insts.iter().position(|&i| i == inst) {
            if pos + 1 < insts.len() {
                return vec![insts[pos + 1]];
            }
            return block
                .successors()
                .iter()
                .filter_map(|&s| func.block(s).insts().first().copied())
                .collect();
        }
    }
    Vec::new()
}

/// Run liveness to a fixpoint and record `live_in`/`live_out` on every instruction.
///
/// The dataflow is monotone (sets only grow) over a finite universe (the function's locals), so
/// this always terminates - per §5's ordering guarantees, that's the only termination property
/// this pass relies on.
pub fn compute<T: TypeHandle>(func: &mut Function<T>) {
    let all_insts: Vec<Inst> = func.layout_insts();
    let succs: Vec<(Inst, Vec<Inst>)> = all_insts.iter().map(|&i| (i, successors_of(func, i))).collect();

    loop {
        let mut changed = false;
        for &(inst, ref next) in succs.iter().rev() {
            let mut live_out: BTreeSet<Local> = BTreeSet::new();
            for &n in next {
                live_out.extend(func.inst(n).live_in().iter().copied());
            }
            *func.inst_mut(inst).live_out_mut() = live_out;
            if func.inst_mut(inst).apply_liveout() {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::ir::location::Location;
    use crate::symbols::{Label, SymbolTables};
    use crate::types::BasicType;

    #[test]
    fn straight_line_use_propagates_backward() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let mut f = Function::new(Label::new(0), BasicType::I64);

        let a = symtab.intern_label("a");
        let b = symtab.intern_label("b");
        let va = f.ir_var(&mut symtab, a, BasicType::I64);
        let vb = f.ir_var(&mut symtab, b, BasicType::I64);
        let sum = f.ir_add(&mut symtab, BasicType::I64, va, vb);
        f.ir_return(BasicType::Void, sum);

        compute(&mut f);

        let insts = f.layout_insts();
        let add_inst = insts[0];
        let a_local = va.as_local().unwrap();
        let b_local = vb.as_local().unwrap();
        assert!(f.inst(add_inst).live_in().contains(&a_local));
        assert!(f.inst(add_inst).live_in().contains(&b_local));

        let ret_inst = insts[1];
        assert!(!f.inst(ret_inst).live_out().contains(&a_local));
    }
}
