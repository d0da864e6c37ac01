//! Dominance, immediate dominators, and dominance frontiers.

use std::collections::{BTreeSet, VecDeque};

use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::types::TypeHandle;

/// Compute `Dom(b)` for every block by the standard fixpoint: the entry dominates only itself,
/// every other block starts out dominated by everything, and each iteration tightens
/// `Dom(b) = {b} ∪ ⋂ Dom(p)` over `b`'s predecessors until nothing changes.
fn compute_dominators<T: TypeHandle>(func: &Function<T>) -> Vec<(Block, BTreeSet<Block>)> {
    let all_blocks: Vec<Block> = func.blocks().keys().collect();
    let universe: BTreeSet<Block> = all_blocks.iter().copied().collect();
    let entry = func.entry();

    let mut dom: Vec<(Block, BTreeSet<Block>)> = all_blocks
        .iter()
        .map(|&b| {
            let set = if b == entry {
                BTreeSet::from([b])
            } else {
                universe.clone()
            };
            (b, set)
        })
        .collect();

    let index_of = |b: Block| all_blocks.iter().position(|&x| x == b).unwrap();

    loop {
        let mut changed = false;
        for &b in &all_blocks {
            if b == entry {
                continue;
            }
            let preds = func.block(b).predecessors();
            let mut new_set: Option<BTreeSet<Block>> = None;
            for &p in preds {
                let pset = &dom[index_of(p)].1;
                new_set = Some(match new_set {
                    None => pset.clone(),
                    Some(acc) => acc.intersection(pset).copied().collect(),
                });
            }
            let mut new_set = new_set.unwrap_or_default();
            new_set.insert(b);
            if new_set != dom[index_of(b)].1 {
                dom[index_of(b)].1 = new_set;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    dom
}

/// The immediate dominator of `b`: the first dominator of `b` (other than `b` itself) found by a
/// backward BFS from `b`'s predecessors.
fn immediate_dominator<T: TypeHandle>(func: &Function<T>, b: Block, dominators: &BTreeSet<Block>) -> Option<Block> {
    if func.block(b).predecessors().is_empty() {
        return None;
    }
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<Block> = func.block(b).predecessors().iter().copied().collect();
    while let Some(cur) = queue.pop_front() {
        if !seen.insert(cur) {
            continue;
        }
        if cur != b && dominators.contains(&cur) {
            return Some(cur);
        }
        queue.extend(func.block(cur).predecessors().iter().copied());
    }
    None
}

/// Run dominance, immediate-dominator, and dominance-frontier computation over `func`, storing
/// the results on each `BasicBlockData`.
pub fn compute_dominance_frontiers<T: TypeHandle>(func: &mut Function<T>) {
    let dom = compute_dominators(func);

    let mut idoms = Vec::with_capacity(dom.len());
    for &(b, ref doms) in &dom {
        idoms.push((b, immediate_dominator(func, b, doms)));
    }

    for &(b, ref doms) in &dom {
        func.block_mut(b).set_dominators(doms.clone());
    }
    for &(b, idom) in &idoms {
        func.block_mut(b).set_idom(idom);
    }
    for &(b, _) in &dom {
        func.block_mut(b).dominance_frontier_mut().clear();
    }

    // For each join block (>= 2 predecessors), walk each predecessor up its idom chain, marking
    // every block visited (short of b's idom) as having b in its frontier.
    for &(b, _) in &dom {
        let preds = func.block(b).predecessors().to_vec();
        if preds.len() < 2 {
            continue;
        }
        let b_idom = func.block(b).idom();
        for p in preds {
            let mut runner = Some(p);
            while let Some(cur) = runner {
                if Some(cur) == b_idom || cur == b {
                    break;
                }
                func.block_mut(cur).dominance_frontier_mut().insert(b);
                runner = func.block(cur).idom();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityRef;
    use crate::types::BasicType;

    fn diamond() -> Function<BasicType> {
        let mut f = Function::new(crate::symbols::Label::new(0), BasicType::Void);
        let entry = f.entry();
        let left = f.new_block();
        let right = f.new_block();
        let join = f.new_block();

        f.set_active(entry);
        f.ir_if(BasicType::Void, crate::ir::location::Location::Immediate(0), left, right);

        f.set_active(left);
        f.ir_goto(BasicType::Void, join);

        f.set_active(right);
        f.ir_goto(BasicType::Void, join);

        f.set_active(join);
        f
    }

    #[test]
    fn join_block_is_in_each_branchs_frontier() {
        let mut f = diamond();
        compute_dominance_frontiers(&mut f);
        let entry = f.entry();
        let join = f.blocks().keys().nth(3).unwrap();
        for b in f.blocks().keys() {
            if b == entry || b == join {
                continue;
            }
            assert!(f.block(b).dominance_frontier().contains(&join));
        }
    }

    #[test]
    fn entry_dominates_everything() {
        let mut f = diamond();
        compute_dominance_frontiers(&mut f);
        let entry = f.entry();
        for b in f.blocks().keys() {
            assert!(f.block(b).dominators().contains(&entry));
        }
    }
}
