//! SSA construction: dominance-frontier-based φ placement and dominator-tree renaming.

use std::collections::HashMap;

use smallvec::smallvec;

use crate::ir::block::PendingPhi;
use crate::ir::entities::{Block, Inst};
use crate::ir::instruction::Instruction;
use crate::ir::location::Location;
use crate::ir::opcode::Opcode;
use crate::symbols::{Label, Local, SymbolTables};
use crate::ir::function::Function;
use crate::types::TypeHandle;

/// Insert φs at dominance-frontier join points and renumber every definition and use of every
/// source-level variable.
///
/// Requires dominance frontiers to already be valid (the pass manager enforces this ordering).
pub fn enforce_ssa<T: TypeHandle>(func: &mut Function<T>, symtab: &mut SymbolTables<T>) {
    place_phis(func);
    rename(func, symtab);
    remove_redundant_phis(func);
}

/// §4.3 step 2: for each source-symbol with defining-blocks D, grow D by adding every block in
/// each d ∈ D's dominance frontier that doesn't already have a pending φ for this symbol, to
/// fixpoint.
fn place_phis<T: TypeHandle>(func: &mut Function<T>) {
    for symbol in func.all_source_symbols() {
        let mut worklist = func.defining_blocks(symbol).to_vec();
        let mut i = 0;
        while i < worklist.len() {
            let d = worklist[i];
            i += 1;
            let frontier: Vec<Block> = func.block(d).dominance_frontier().iter().copied().collect();
            for f in frontier {
                if func.block(f).has_pending_phi(symbol) {
                    continue;
                }
                func.block_mut(f).pending_phis.push(PendingPhi {
                    source_symbol: symbol,
                    inst: None,
                });
                if !worklist.contains(&f) {
                    worklist.push(f);
                }
                let defs = func.defining_blocks_mut(symbol);
                if !defs.contains(&f) {
                    defs.push(f);
                }
            }
        }
    }
}

/// §4.3 steps 3-5: reset numbering, walk the dominator tree materializing φs and rewriting uses
/// and defs to fresh per-version locals, then fill φ operands from each predecessor's exit
/// bindings.
fn rename<T: TypeHandle>(func: &mut Function<T>, symtab: &mut SymbolTables<T>) {
    for b in func.blocks().keys().collect::<Vec<_>>() {
        func.block_mut(b).vars_in.clear();
        func.block_mut(b).vars_out.clear();
    }

    // Materialize every pending φ as a real instruction up front, so φ dests exist before any
    // block in the dominator tree is visited (a φ's own block may be visited before one of its
    // value-supplying predecessors, since dominator-tree order isn't layout order).
    for b in func.blocks().keys().collect::<Vec<_>>() {
        let ty = func.ty();
        let pending: Vec<(usize, Label)> = func
            .block(b)
            .pending_phis
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.source_symbol))
            .collect();
        for (idx, symbol) in pending {
            let local = symtab.create_temp(ty);
            let inst = push_phi_inst(func, b, ty, local);
            func.block_mut(b).pending_phis[idx].inst = Some(inst);
            let _ = symbol;
        }
    }

    let mut children: HashMap<Block, Vec<Block>> = HashMap::new();
    for b in func.blocks().keys().collect::<Vec<_>>() {
        if let Some(idom) = func.block(b).idom() {
            children.entry(idom).or_default().push(b);
        }
    }

    let mut current: HashMap<Label, Local> = HashMap::new();
    let entry = func.entry();
    rename_subtree(func, symtab, &children, entry, &mut current);

    fill_phi_operands(func);
}

fn push_phi_inst<T: TypeHandle>(func: &mut Function<T>, block: Block, ty: T, dest: Local) -> Inst {
    let inst = Instruction::new(Opcode::Phi, ty, Location::Local(dest), smallvec![]);
    func.insert_at_head(block, inst)
}

fn rename_subtree<T: TypeHandle>(
    func: &mut Function<T>,
    symtab: &mut SymbolTables<T>,
    children: &HashMap<Block, Vec<Block>>,
    block: Block,
    current: &mut HashMap<Label, Local>,
) {
    func.block_mut(block).vars_in = current.clone();

    let mut undo: Vec<(Label, Option<Local>)> = Vec::new();

    // φs at this block's head are definitions of their source-symbol, happening before the block
    // body is walked.
    let pending: Vec<(Label, Inst)> = func
        .block(block)
        .pending_phis
        .iter()
        .map(|p| (p.source_symbol, p.inst.expect("phi materialized before renaming")))
        .collect();
    for (symbol, inst) in pending {
        let new_local = func.inst(inst).dest().as_local().expect("phi has a local dest");
        undo.push((symbol, current.insert(symbol, new_local)));
    }

    let insts = func.block(block).insts().to_vec();
    for inst_id in insts {
        if func.inst(inst_id).opcode() == Opcode::Phi {
            // Already handled above; its source operands are filled in a later pass once every
            // predecessor's vars_out is known.
            continue;
        }
        let src: Vec<Location> = func.inst(inst_id).src().to_vec();
        let mut new_src = src.clone();
        for (slot, loc) in src.iter().enumerate() {
            if let Some(local) = loc.as_local() {
                if let Some(symbol) = func.variable_of_local(local) {
                    if let Some(&cur) = current.get(&symbol) {
                        new_src[slot] = Location::Local(cur);
                    }
                }
            }
        }
        *func.inst_mut(inst_id).src_mut() = new_src.into();

        if let Some(dest_local) = func.inst(inst_id).dest().as_local() {
            if let Some(symbol) = func.variable_of_local(dest_local) {
                let new_local = symtab.create_temp(func.inst(inst_id).ty());
                func.inst_mut(inst_id).set_dest(Location::Local(new_local));
                undo.push((symbol, current.insert(symbol, new_local)));
            }
        }
    }

    func.block_mut(block).vars_out = current.clone();

    if let Some(kids) = children.get(&block) {
        for &child in kids {
            rename_subtree(func, symtab, children, child, current);
        }
    }

    for (symbol, prev) in undo.into_iter().rev() {
        match prev {
            Some(local) => {
                current.insert(symbol, local);
            }
            None => {
                current.remove(&symbol);
            }
        }
    }
}

/// §4.3 step 5: fill each φ's operands from its predecessors' `vars_out`, in predecessor order.
fn fill_phi_operands<T: TypeHandle>(func: &mut Function<T>) {
    for b in func.blocks().keys().collect::<Vec<_>>() {
        let preds = func.block(b).predecessors().to_vec();
        let pending: Vec<(Label, Inst)> = func
            .block(b)
            .pending_phis
            .iter()
            .map(|p| (p.source_symbol, p.inst.unwrap()))
            .collect();
        for (symbol, inst) in pending {
            let mut operands = Vec::with_capacity(preds.len());
            for &p in &preds {
                let local = func
                    .block(p)
                    .vars_out
                    .get(&symbol)
                    .copied()
                    .unwrap_or_else(|| {
                        func.block(p)
                            .vars_in
                            .get(&symbol)
                            .copied()
                            .expect("predecessor has some binding for every symbol live into a phi")
                    });
                operands.push(Location::Local(local));
            }
            *func.inst_mut(inst).src_mut() = operands.into();
        }
    }
}

/// §4.3 step 6: a φ with fewer than two distinct incoming values carries no information -
/// collapse it back into a plain value and drop the instruction. Since this crate's φ-elimination
/// (§4.8) consumes φs directly, "removing" one here just means rewriting it to an `assign` of its
/// sole operand so later passes don't need a special case for arity-1 φs.
fn remove_redundant_phis<T: TypeHandle>(func: &mut Function<T>) {
    for b in func.blocks().keys().collect::<Vec<_>>() {
        for p in &func.block(b).pending_phis.clone() {
            let inst = p.inst.unwrap();
            let src = func.inst(inst).src().to_vec();
            if src.len() < 2 {
                let ty = func.inst(inst).ty();
                let dest = func.inst(inst).dest();
                let replacement = src.first().copied().unwrap_or(Location::None);
                *func.inst_mut(inst) = Instruction::new(Opcode::Assign, ty, dest, smallvec![replacement]);
            }
        }
    }
}
