//! The function-level lowering driver: walks a function's blocks in layout order and drives
//! [`super::lower`]'s legalization routines to produce a stream of [`CodeEmitter`] calls.
//!
//! Everything in [`super::lower`] only knows how to turn one IR operation's already-resolved
//! operands into a machine-instruction sequence; this module is the part that knows about whole
//! functions - block labels, the calling convention, call-site register spilling, and frame
//! open/close (§4.7).

use crate::emit::{self, CodeEmitter, Condition, Mnemonic, Operand};
use crate::flags::Flags;
use crate::ir::entities::{Block, Inst};
use crate::ir::function::Function;
use crate::ir::location::Location;
use crate::ir::opcode::Opcode;
use crate::isa::x86::lower;
use crate::isa::x86::registers::{self, Gpr, ARG_REGISTERS};
use crate::isa::RegUnit;
use crate::pass::{self, PassKind};
use crate::symbols::{Local, SymbolTables};
use crate::types::TypeHandle;

/// This backend's calling convention.
///
/// Argument registers are `{RDI, RSI, RCX, RDX, R8, R9}` - **not** the System V AMD64 ABI's
/// `{RDI, RSI, RDX, RCX, R8, R9}` (§4.6, §9). This is a deliberate, self-consistent departure:
/// functions this backend compiles call each other correctly, but are not directly callable from
/// (or able to call) externally compiled System V code without an adapter.
#[derive(Copy, Clone, Debug)]
pub struct CallConv;

impl CallConv {
    /// The registers used to pass the first six integer/pointer arguments, in argument order.
    pub const ARG_REGISTERS: &'static [RegUnit] = ARG_REGISTERS;
    /// Arguments beyond the sixth are passed on the stack, one 8-byte slot each, pushed in
    /// reverse order so they read off the stack in argument order.
    pub const MAX_REGISTER_ARGS: usize = 6;
}

/// Run every pass lowering depends on (SSA, liveness, register allocation, linearization, φ
/// elimination, nop cleanup) and emit the function through `emitter`.
pub fn compile_function<T: TypeHandle, E: CodeEmitter>(
    func: &mut Function<T>,
    symtab: &mut SymbolTables<T>,
    flags: &Flags,
    emitter: &mut E,
) {
    pass::require(func, symtab, flags, PassKind::EnforceSsa);
    pass::require(func, symtab, flags, PassKind::Liveness);
    crate::regalloc::allocate(func, symtab, lower::allocatable_registers());
    pass::require(func, symtab, flags, PassKind::LinearizeCfg);
    pass::require(func, symtab, flags, PassKind::PhiElimination);
    pass::require(func, symtab, flags, PassKind::CleanupNops);

    let entry_label = symtab.label_name(func.label()).to_string();
    let is_start = entry_label == "_start";
    let frame_size = func.frame_size();

    let mut blocks: Vec<Block> = func.blocks().keys().collect();
    blocks.sort_by_key(|&b| func.block(b).layout_order().unwrap_or(u32::MAX));

    for (idx, &block) in blocks.iter().enumerate() {
        let is_entry = block == func.entry();
        let label = if is_entry {
            emit::global(entry_label.clone())
        } else {
            let l = func.block_mut(block).label_or_anon(symtab);
            emit::local(symtab.label_name(l).to_string())
        };
        emitter.emit_label(label);

        if is_entry {
            lower::open_frame(emitter, frame_size);
        }

        let insts = func.block(block).insts().to_vec();
        let next_order = blocks
            .get(idx + 1)
            .and_then(|&b| func.block(b).layout_order());

        for (pos, &inst) in insts.iter().enumerate() {
            let is_last = pos + 1 == insts.len();
            lower_inst(func, symtab, flags, emitter, block, inst, is_last, next_order, frame_size, is_start);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn lower_inst<T: TypeHandle, E: CodeEmitter>(
    func: &mut Function<T>,
    symtab: &mut SymbolTables<T>,
    flags: &Flags,
    e: &mut E,
    block: Block,
    inst: Inst,
    is_last: bool,
    next_order: Option<u32>,
    frame_size: u32,
    is_start: bool,
) {
    match func.inst(inst).opcode() {
        Opcode::Label => {}
        Opcode::LoadArg => {
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let n = match func.inst(inst).src()[0] {
                Location::Immediate(n) => n as usize,
                other => panic!("load_arg expects an immediate argument index, got {other:?}"),
            };
            lower::get_arg(e, dest, n);
        }
        Opcode::Load => {
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let addr = lower::x64_arg(func.inst(inst).src()[0], symtab);
            lower::lower_load(e, dest, addr, 0);
        }
        Opcode::Store => {
            let addr = lower::x64_arg(func.inst(inst).src()[0], symtab);
            let src = lower::x64_arg(func.inst(inst).src()[1], symtab);
            lower::lower_store(e, addr, src, 0);
        }
        Opcode::LoadPtr => {
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let ptr = lower::x64_arg(func.inst(inst).src()[0], symtab);
            let offset = immediate_offset(func.inst(inst).src()[1]);
            lower::lower_load(e, dest, ptr, offset);
        }
        Opcode::StorePtr => {
            let ptr = lower::x64_arg(func.inst(inst).src()[0], symtab);
            let offset = immediate_offset(func.inst(inst).src()[1]);
            let src = lower::x64_arg(func.inst(inst).src()[2], symtab);
            lower::lower_store(e, ptr, src, offset);
        }
        Opcode::Address => {
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let src = lower::x64_arg(func.inst(inst).src()[0], symtab);
            lower::lower_lea(e, dest, src);
        }
        Opcode::Not => {
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let src = lower::x64_arg(func.inst(inst).src()[0], symtab);
            lower::lower_not(e, dest, src);
        }
        Opcode::Neg => {
            // Declared but never given real two's-complement semantics (§9 Open Questions);
            // lowering treats it as an identity copy until a caller supplies one.
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let src = lower::x64_arg(func.inst(inst).src()[0], symtab);
            lower::lower_move(e, dest, src);
        }
        Opcode::Assign => {
            let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
            let src = lower::x64_arg(func.inst(inst).src()[0], symtab);
            lower::lower_move(e, dest, src);
        }
        Opcode::Add => binary(e, func, symtab, inst, lower::lower_add),
        Opcode::Sub => binary(e, func, symtab, inst, lower::lower_sub),
        Opcode::Mul => binary(e, func, symtab, inst, lower::lower_mul),
        Opcode::Div => binary(e, func, symtab, inst, lower::lower_div),
        Opcode::Rem => binary(e, func, symtab, inst, lower::lower_rem),
        Opcode::And => binary(e, func, symtab, inst, lower::lower_and),
        Opcode::Or => binary(e, func, symtab, inst, lower::lower_or),
        Opcode::Xor => binary(e, func, symtab, inst, lower::lower_xor),
        Opcode::Eq => compare(e, func, symtab, inst, Condition::Equal),
        Opcode::Ne => compare(e, func, symtab, inst, Condition::NotEqual),
        Opcode::Lt => compare(e, func, symtab, inst, Condition::Less),
        Opcode::Le => compare(e, func, symtab, inst, Condition::LessOrEqual),
        Opcode::Gt => compare(e, func, symtab, inst, Condition::Greater),
        Opcode::Ge => compare(e, func, symtab, inst, Condition::GreaterOrEqual),
        Opcode::Call => lower_call(e, func, symtab, inst),
        Opcode::Goto => {
            debug_assert!(is_last, "goto must be a block terminator");
            let succs = func.block(block).successors().to_vec();
            if let [target] = succs[..] {
                if func.block(target).layout_order() != next_order {
                    let label = target_operand(func, symtab, target);
                    lower::lower_jump(e, label);
                }
            }
        }
        Opcode::IfZero => {
            debug_assert!(is_last, "if_zero must be a block terminator");
            let cond = lower::x64_arg(func.inst(inst).src()[0], symtab);
            let succs = func.block(block).successors().to_vec();
            let (zero_target, nonzero_target) = match succs[..] {
                [z, nz] => (z, nz),
                ref other => panic!("if_zero block has {} successors, expected 2", other.len()),
            };
            if func.block(zero_target).layout_order() == next_order {
                // The zero arm is the fallthrough: jump to the non-zero arm on a non-zero test
                // and let the zero arm fall through for free.
                let label = target_operand(func, symtab, nonzero_target);
                lower::lower_jump_if_nonzero(e, label, cond);
            } else {
                let label = target_operand(func, symtab, zero_target);
                lower::lower_jump_if_zero(e, label, cond);
                if func.block(nonzero_target).layout_order() != next_order {
                    let fall_label = target_operand(func, symtab, nonzero_target);
                    lower::lower_jump(e, fall_label);
                }
            }
        }
        Opcode::Ret => {
            let src = lower::x64_arg(func.inst(inst).src()[0], symtab);
            lower::lower_move(e, emit::r64(Gpr::Rax.encode()), src);
            lower::close_frame(e, frame_size, is_start, flags.emit_linux_exit_syscall());
        }
        Opcode::Phi => panic!("phi {inst} survived past phi-elimination"),
        Opcode::ListPrimitive(_) => panic!("list primitives are not yet implemented"),
    }
}

fn immediate_offset(loc: Location) -> i32 {
    match loc {
        Location::Immediate(i) => i as i32,
        other => panic!("expected an immediate byte offset, got {other:?}"),
    }
}

fn target_operand<T: TypeHandle>(func: &mut Function<T>, symtab: &mut SymbolTables<T>, target: Block) -> Operand {
    let label = func.block_mut(target).label_or_anon(symtab);
    emit::label64(emit::local(symtab.label_name(label).to_string()))
}

fn binary<T: TypeHandle, E: CodeEmitter>(
    e: &mut E,
    func: &Function<T>,
    symtab: &SymbolTables<T>,
    inst: Inst,
    f: impl FnOnce(&mut E, Operand, Operand, Operand),
) {
    let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
    let lhs = lower::x64_arg(func.inst(inst).src()[0], symtab);
    let rhs = lower::x64_arg(func.inst(inst).src()[1], symtab);
    f(e, dest, lhs, rhs);
}

fn compare<T: TypeHandle, E: CodeEmitter>(
    e: &mut E,
    func: &Function<T>,
    symtab: &SymbolTables<T>,
    inst: Inst,
    cond: Condition,
) {
    let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
    let lhs = lower::x64_arg(func.inst(inst).src()[0], symtab);
    let rhs = lower::x64_arg(func.inst(inst).src()[1], symtab);
    lower::lower_compare(e, dest, lhs, rhs, cond);
}

/// Save every local both live-in and live-out at this call (i.e. spanning it) that currently
/// holds a register, place arguments per the calling convention (spilling beyond six to the
/// stack), call, move the result out of RAX, then restore the saved registers in reverse (§4.7).
fn lower_call<T: TypeHandle, E: CodeEmitter>(e: &mut E, func: &Function<T>, symtab: &SymbolTables<T>, inst: Inst) {
    let spanning: Vec<Local> = func
        .inst(inst)
        .live_in()
        .intersection(func.inst(inst).live_out())
        .copied()
        .collect();
    let mut saved: Vec<RegUnit> = spanning
        .iter()
        .filter_map(|&l| {
            let data = symtab.local(l);
            (data.reg >= 0 && data.offset == 0).then_some(data.reg as RegUnit)
        })
        .collect();
    saved.sort_unstable();
    saved.dedup();
    for &r in &saved {
        e.emit_instruction(Mnemonic::Push, &[emit::r64(r)]);
    }

    let src = func.inst(inst).src();
    let func_operand = lower::x64_arg(src[0], symtab);
    let args = &src[1..];
    for (i, &arg) in args.iter().enumerate().take(CallConv::MAX_REGISTER_ARGS) {
        lower::set_arg(e, i, lower::x64_arg(arg, symtab));
    }
    for &arg in args.iter().skip(CallConv::MAX_REGISTER_ARGS).rev() {
        e.emit_instruction(Mnemonic::Push, &[lower::x64_arg(arg, symtab)]);
    }

    let dest = lower::x64_arg(func.inst(inst).dest(), symtab);
    lower::lower_call(e, dest, func_operand);

    let extra_stack_args = args.len().saturating_sub(CallConv::MAX_REGISTER_ARGS);
    if extra_stack_args > 0 {
        e.emit_instruction(
            Mnemonic::Add,
            &[emit::r64(registers::RSP), emit::imm64((extra_stack_args * 8) as i64)],
        );
    }

    for &r in saved.iter().rev() {
        e.emit_instruction(Mnemonic::Pop, &[emit::r64(r)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::location::Location;
    use crate::types::BasicType;

    #[derive(Default)]
    struct Recorder {
        labels: Vec<emit::Symbol>,
        ops: Vec<(Mnemonic, Vec<Operand>)>,
    }

    impl CodeEmitter for Recorder {
        fn emit_label(&mut self, symbol: emit::Symbol) {
            self.labels.push(symbol);
        }
        fn emit_instruction(&mut self, mnemonic: Mnemonic, operands: &[Operand]) {
            self.ops.push((mnemonic, operands.to_vec()));
        }
    }

    #[test]
    fn straight_line_arithmetic_ends_in_a_move_to_rax_and_ret() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let label = symtab.intern_label("add_two");
        let mut f = Function::new(label, BasicType::I64);
        let a = f.ir_arg(&mut symtab, BasicType::I64, 0);
        let b = f.ir_arg(&mut symtab, BasicType::I64, 1);
        let sum = f.ir_add(&mut symtab, BasicType::I64, a, b);
        f.finish(BasicType::Void, sum);

        let flags = Flags::default();
        let mut rec = Recorder::default();
        compile_function(&mut f, &mut symtab, &flags, &mut rec);

        assert_eq!(rec.labels.first(), Some(&emit::global("add_two")));
        let (last_mnemonic, _) = rec.ops.last().expect("at least one instruction emitted");
        assert_eq!(*last_mnemonic, Mnemonic::Ret);
        assert!(
            rec.ops.iter().any(|(m, _)| *m == Mnemonic::Add
                || *m == Mnemonic::Lea
                || *m == Mnemonic::Inc),
            "expected some addition lowering among {:?}",
            rec.ops.iter().map(|(m, _)| *m).collect::<Vec<_>>()
        );
    }

    #[test]
    fn diamond_branch_emits_a_conditional_jump() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let label = symtab.intern_label("choose");
        let mut f = Function::new(label, BasicType::I64);

        let cond = f.ir_arg(&mut symtab, BasicType::I64, 0);
        let then_block = f.new_block();
        let else_block = f.new_block();
        f.ir_if(BasicType::Void, cond, then_block, else_block);

        let x = symtab.intern_label("x");
        let join = f.new_block();

        f.set_active(then_block);
        f.ir_assign(&mut symtab, x, BasicType::I64, Location::Immediate(1));
        f.ir_goto(BasicType::Void, join);

        f.set_active(else_block);
        f.ir_assign(&mut symtab, x, BasicType::I64, Location::Immediate(2));
        f.ir_goto(BasicType::Void, join);

        f.set_active(join);
        let xv = f.ir_var(&mut symtab, x, BasicType::I64);
        f.finish(BasicType::Void, xv);

        let flags = Flags::default();
        let mut rec = Recorder::default();
        compile_function(&mut f, &mut symtab, &flags, &mut rec);

        assert!(
            rec.ops.iter().any(|(m, _)| matches!(m, Mnemonic::Jcc(_))),
            "expected a conditional jump lowering a two-way branch"
        );
        let (last_mnemonic, _) = rec.ops.last().expect("at least one instruction emitted");
        assert_eq!(*last_mnemonic, Mnemonic::Ret);
    }

    #[test]
    fn call_spanning_local_is_saved_and_restored() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let label = symtab.intern_label("spans_call");
        let mut f = Function::new(label, BasicType::I64);

        let a = f.ir_arg(&mut symtab, BasicType::I64, 0);
        let callee = symtab.intern_label("callee");
        let result = f.ir_call(&mut symtab, BasicType::I64, Location::Label(callee), &[]);
        let sum = f.ir_add(&mut symtab, BasicType::I64, a, result);
        f.finish(BasicType::Void, sum);

        let flags = Flags::default();
        let mut rec = Recorder::default();
        compile_function(&mut f, &mut symtab, &flags, &mut rec);

        let call_pos = rec
            .ops
            .iter()
            .position(|(m, _)| *m == Mnemonic::Call)
            .expect("a call was lowered");
        let pushes_before = rec.ops[..call_pos].iter().filter(|(m, _)| *m == Mnemonic::Push).count();
        let pops_after = rec.ops[call_pos..].iter().filter(|(m, _)| *m == Mnemonic::Pop).count();
        assert!(
            pushes_before >= 1 && pushes_before == pops_after,
            "expected a local spanning the call to be pushed before and popped after it; ops: {:?}",
            rec.ops.iter().map(|(m, _)| *m).collect::<Vec<_>>()
        );
    }
}
