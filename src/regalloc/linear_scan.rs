//! A single-pass, greedy linear-scan allocator (§4.6).
//!
//! Requires liveness to already be complete; the pass manager enforces that ordering.

use std::collections::HashMap;

use crate::ir::function::Function;
use crate::isa::RegUnit;
use crate::symbols::{Local, SymbolTables};
use crate::types::TypeHandle;

/// The register the allocator hands to any local whose live range never has a recorded kill -
/// degenerate, but harmless, since nothing downstream reads a dead value for its contents.
const SCRATCH_FALLBACK: RegUnit = 0; // rax

struct Range {
    gen: i64,
    kill: i64,
}

/// Allocate physical registers (from `allocatable`, in priority order) to every local live across
/// `func`, spilling to frame-relative offsets when the free list runs out.
///
/// `allocatable` is consumed as a LIFO stack seeded in priority order: index 0 is preferred, so
/// it is pushed last (popped first).
pub fn allocate<T: TypeHandle>(func: &mut Function<T>, symtab: &mut SymbolTables<T>, allocatable: &[RegUnit]) {
    let insts = func.layout_insts();
    let n = insts.len();

    let mut ranges: HashMap<Local, Range> = HashMap::new();
    for (i, &inst) in insts.iter().enumerate() {
        let out = func.inst(inst).live_out().clone();
        let inn = func.inst(inst).live_in().clone();
        for &l in &out {
            if !inn.contains(&l) {
                ranges.entry(l).or_insert(Range { gen: -1, kill: -1 }).gen = i as i64;
            }
        }
        for &l in &inn {
            if !out.contains(&l) {
                ranges.entry(l).or_insert(Range { gen: -1, kill: -1 }).kill = i as i64;
            }
        }
    }

    let mut gens: Vec<Vec<Local>> = vec![Vec::new(); n];
    let mut kills: Vec<Vec<Local>> = vec![Vec::new(); n];
    for (&local, range) in &ranges {
        if range.gen >= 0 {
            gens[range.gen as usize].push(local);
        }
        if range.kill >= 0 {
            kills[range.kill as usize].push(local);
        }
    }

    let mut free_list: Vec<RegUnit> = allocatable.iter().rev().copied().collect();

    for i in 0..n {
        for &local in &gens[i] {
            let data = symtab.local(local);
            if data.reg >= 0 {
                continue;
            }
            if let Some(reg) = free_list.pop() {
                symtab.local_mut(local).reg = reg as i32;
            } else {
                let offset = func.grow_frame(8);
                symtab.local_mut(local).offset = offset;
            }
        }
        for &local in &kills[i] {
            let data = symtab.local(local);
            if data.reg >= 0 && data.offset == 0 {
                free_list.push(data.reg as RegUnit);
            }
        }
    }

    for local in symtab.local_keys() {
        if symtab.local(local).reg < 0 && symtab.local(local).offset == 0 {
            symtab.local_mut(local).reg = SCRATCH_FALLBACK as i32;
        }
    }

    check_no_overlapping_assignments(symtab, &ranges);
}

/// Invariant 5 (§8), checked unconditionally (not gated by `Flags::enable_verifier`) since it's
/// cheap relative to the allocation work already done: no two locals with a real, non-degenerate
/// live range end up sharing a physical register with overlapping ranges. Locals mapped to the
/// scratch fallback register because they were never live are exempt - that overlap is the
/// designed behavior, not a bug.
fn check_no_overlapping_assignments<T: TypeHandle>(symtab: &SymbolTables<T>, ranges: &HashMap<Local, Range>) {
    let mut by_reg: HashMap<RegUnit, Vec<(Local, i64, i64)>> = HashMap::new();
    for (&local, range) in ranges {
        if range.gen < 0 || range.kill < 0 {
            continue;
        }
        let data = symtab.local(local);
        if data.offset != 0 {
            continue;
        }
        by_reg.entry(data.reg as RegUnit).or_default().push((local, range.gen, range.kill));
    }

    for (reg, mut entries) in by_reg {
        entries.sort_by_key(|&(_, gen, _)| gen);
        for w in entries.windows(2) {
            let (l1, _, kill1) = w[0];
            let (l2, gen2, _) = w[1];
            assert!(
                kill1 <= gen2,
                "register allocation invariant violated: locals {l1} and {l2} both hold register {reg} \
                 with overlapping live ranges"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::liveness;
    use crate::symbols::Label;
    use crate::types::BasicType;

    #[test]
    fn simple_values_get_registers() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let mut f = Function::new(Label::new(0), BasicType::I64);
        let a = symtab.intern_label("a");
        let b = symtab.intern_label("b");
        let va = f.ir_var(&mut symtab, a, BasicType::I64);
        let vb = f.ir_var(&mut symtab, b, BasicType::I64);
        let sum = f.ir_add(&mut symtab, BasicType::I64, va, vb);
        f.ir_return(BasicType::Void, sum);

        liveness::compute(&mut f);
        allocate(&mut f, &mut symtab, crate::isa::x86::registers::ALLOCATABLE_REGISTERS);

        let sum_local = sum.as_local().unwrap();
        assert!(symtab.local(sum_local).reg >= 0);
    }

    #[test]
    fn exhausting_the_free_list_spills() {
        let mut symtab: SymbolTables<BasicType> = SymbolTables::new();
        let mut f = Function::new(Label::new(0), BasicType::I64);
        let tiny: &[RegUnit] = &[0];
        // Two locals simultaneously live with only one allocatable register: the second must
        // spill to a frame offset rather than reuse the first's register.
        let x = f.create_temp(&mut symtab, BasicType::I64);
        let y = f.create_temp(&mut symtab, BasicType::I64);
        use crate::ir::location::Location;
        let vx = Location::Local(x);
        let vy = Location::Local(y);
        let _ = f.ir_add(&mut symtab, BasicType::I64, vx, vy);
        liveness::compute(&mut f);
        allocate(&mut f, &mut symtab, tiny);
        let assigned_regs = symtab.local(x).reg >= 0 || symtab.local(y).reg >= 0;
        let one_spilled = symtab.local(x).offset != 0 || symtab.local(y).offset != 0;
        assert!(assigned_regs && one_spilled);
    }
}
