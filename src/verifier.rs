//! Verifier-style consistency checks (§8), run by the pass manager immediately after the pass
//! that is supposed to establish each invariant, gated by [`crate::flags::Flags::enable_verifier`]
//! (§3.2). Strictly additional: disabling the verifier changes no compiled output, only whether
//! these checks run.
//!
//! Every function here panics with a message naming the violated invariant and the offending
//! entity, matching this crate's "fatal, no recovery" error model (§7) - the verifier exists to
//! catch a compiler bug closer to its source, not to offer a recoverable diagnostic.

use std::collections::{HashMap, HashSet};

use crate::ir::entities::{Block, Inst};
use crate::ir::function::Function;
use crate::ir::opcode::Opcode;
use crate::symbols::Label;
use crate::types::TypeHandle;

/// Invariant 1 & 2 (§8): after SSA enforcement, each block has at most one non-φ writer per
/// source symbol, and every φ's operand count and per-predecessor sourcing match the block's
/// predecessor list.
pub fn check_ssa<T: TypeHandle>(func: &Function<T>) {
    for b in func.blocks().keys() {
        let mut writers: HashMap<Label, u32> = HashMap::new();
        for &inst in func.block(b).insts() {
            if func.inst(inst).opcode() == Opcode::Phi {
                continue;
            }
            if let Some(local) = func.inst(inst).dest().as_local() {
                if let Some(symbol) = func.variable_of_local(local) {
                    *writers.entry(symbol).or_insert(0) += 1;
                }
            }
        }
        for (symbol, count) in writers {
            assert!(
                count <= 1,
                "SSA invariant violated: block {b} has {count} non-phi writers for symbol {symbol}"
            );
        }

        let preds = func.block(b).predecessors();
        for p in &func.block(b).pending_phis {
            let inst = match p.inst {
                Some(i) => i,
                None => continue,
            };
            let operands = func.inst(inst).src();
            assert_eq!(
                operands.len(),
                preds.len(),
                "SSA invariant violated: phi {inst} in block {b} has {} operands but block has {} predecessors",
                operands.len(),
                preds.len(),
            );
            for (slot, &pred) in preds.iter().enumerate() {
                let expected = func
                    .block(pred)
                    .vars_out
                    .get(&p.source_symbol)
                    .copied()
                    .or_else(|| func.block(pred).vars_in.get(&p.source_symbol).copied());
                if let (Some(expected), Some(got)) = (expected, operands[slot].as_local()) {
                    assert_eq!(
                        expected, got,
                        "SSA invariant violated: phi {inst} operand {slot} doesn't match predecessor {pred}'s exit binding for symbol {}",
                        p.source_symbol
                    );
                }
            }
        }
    }
}

/// Invariant 3 (§8): `idom(b)` is the nearest strict dominator of `b` - equivalently,
/// `Dom(idom(b)) == Dom(b) \ {b}`.
pub fn check_dominance<T: TypeHandle>(func: &Function<T>) {
    let entry = func.entry();
    for b in func.blocks().keys() {
        if b == entry {
            continue;
        }
        let doms = func.block(b).dominators();
        let idom = func
            .block(b)
            .idom()
            .unwrap_or_else(|| panic!("dominance invariant violated: block {b} has no immediate dominator"));
        assert_ne!(idom, b, "dominance invariant violated: block {b} dominates itself as idom");
        assert!(
            doms.contains(&idom),
            "dominance invariant violated: idom {idom} of block {b} is not even a dominator"
        );
        let mut expected: HashSet<Block> = doms.clone();
        expected.remove(&b);
        let idom_doms = func.block(idom).dominators().clone();
        assert_eq!(
            idom_doms, expected,
            "dominance invariant violated: Dom(idom({b})) != Dom({b}) \\ {{{b}}}"
        );
    }
}

/// Invariant 4 (§8): for every instruction `i` and every local `l` in `live_in(i)`, `l` is also in
/// `live_out(j)` for every predecessor `j` of `i` in the flattened instruction stream (where a
/// block-head instruction's predecessors are every predecessor block's last instruction).
pub fn check_liveness<T: TypeHandle>(func: &Function<T>) {
    let mut pred_of: HashMap<Inst, Vec<Inst>> = HashMap::new();
    for (_, block) in func.blocks().iter() {
        let insts = block.insts();
        for w in insts.windows(2) {
            pred_of.entry(w[1]).or_default().push(w[0]);
        }
        if let Some(&first) = insts.first() {
            for &p in block.predecessors() {
                if let Some(&last) = func.block(p).insts().last() {
                    pred_of.entry(first).or_default().push(last);
                }
            }
        }
    }

    for inst in func.layout_insts() {
        for &local in func.inst(inst).live_in() {
            for &pred in pred_of.get(&inst).map(|v| v.as_slice()).unwrap_or(&[]) {
                assert!(
                    func.inst(pred).live_out().contains(&local),
                    "liveness invariant violated: local {local} live-in at {inst} is not live-out of predecessor {pred}"
                );
            }
        }
    }
}

/// Invariant 6 (§8): after phi-elimination, no instruction has opcode `PHI`.
pub fn check_no_phi<T: TypeHandle>(func: &Function<T>) {
    for inst in func.layout_insts() {
        assert_ne!(
            func.inst(inst).opcode(),
            Opcode::Phi,
            "phi-elimination invariant violated: {inst} is still a phi"
        );
    }
}

/// Invariant 7 (§8): after `cleanup_nops`, no `goto` targets a block whose layout order is
/// exactly `source.order + 1`.
pub fn check_no_redundant_goto<T: TypeHandle>(func: &Function<T>) {
    for b in func.blocks().keys() {
        let order = match func.block(b).layout_order() {
            Some(o) => o,
            None => continue,
        };
        let Some(last) = func.block(b).last_inst() else { continue };
        if func.inst(last).opcode() != Opcode::Goto {
            continue;
        }
        let succs = func.block(b).successors();
        if let [only] = succs {
            if func.block(*only).layout_order() == Some(order + 1) {
                panic!("cleanup invariant violated: block {b} still has a fallthrough goto to {only}");
            }
        }
    }
}
