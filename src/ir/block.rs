//! Basic blocks: the nodes of a function's control-flow graph.

use std::collections::BTreeSet;

use super::entities::{Block, Inst};
use crate::symbols::{Label, Local};
use crate::types::TypeHandle;

/// A pending, not-yet-materialized φ for one source-symbol at the head of a block.
///
/// SSA construction accumulates these while walking dominance frontiers; §4.3 step 4 turns each
/// into a real `Instruction` with opcode [`crate::ir::opcode::Opcode::Phi`] once block order is
/// fixed.
#[derive(Clone, Debug)]
pub struct PendingPhi {
    pub source_symbol: Label,
    /// Set once the real φ instruction has been materialized at the block head.
    pub inst: Option<Inst>,
}

/// One node of a function's control-flow graph.
pub struct BasicBlockData<T: TypeHandle> {
    /// Monotonically increasing creation order; stable even after blocks are deleted by cleanup,
    /// unlike `layout_order` which is reassigned by `linearize_cfg`.
    uid: u32,
    label: Option<Label>,
    insts: Vec<Inst>,
    predecessors: Vec<Block>,
    successors: Vec<Block>,

    dominators: BTreeSet<Block>,
    idom: Option<Block>,
    dominance_frontier: BTreeSet<Block>,

    /// `source-symbol -> local` bindings live at block entry.
    pub vars_in: std::collections::HashMap<Label, Local>,
    /// `source-symbol -> local` bindings live at block exit - what φ-operand filling (§4.3 step 5)
    /// reads from each predecessor.
    pub vars_out: std::collections::HashMap<Label, Local>,
    pub pending_phis: Vec<PendingPhi>,

    /// Reverse-postorder index assigned by `linearize_cfg`; `None` before that pass runs.
    layout_order: Option<u32>,

    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: TypeHandle> BasicBlockData<T> {
    pub(super) fn new(uid: u32) -> Self {
        Self {
            uid,
            label: None,
            insts: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            dominators: BTreeSet::new(),
            idom: None,
            dominance_frontier: BTreeSet::new(),
            vars_in: std::collections::HashMap::new(),
            vars_out: std::collections::HashMap::new(),
            pending_phis: Vec::new(),
            layout_order: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// This block's creation-order id, stable across cleanup passes.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// This block's interned label, lazily assigning an anonymous one the first time it's needed
    /// (e.g. when a jump target must be emitted).
    pub fn label_or_anon(&mut self, symtab: &mut crate::symbols::SymbolTables<T>) -> Label {
        if let Some(l) = self.label {
            return l;
        }
        let l = symtab.new_anon_label();
        self.label = Some(l);
        l
    }

    /// This block's label, if one has already been assigned.
    pub fn label(&self) -> Option<Label> {
        self.label
    }

    /// Explicitly assign this block's label (used for the function's entry block, which takes the
    /// function's own name).
    pub fn set_label(&mut self, label: Label) {
        self.label = Some(label);
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub(super) fn push_inst(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    pub(super) fn prepend_inst(&mut self, inst: Inst) {
        self.insts.insert(0, inst);
    }

    pub fn predecessors(&self) -> &[Block] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[Block] {
        &self.successors
    }

    pub(super) fn push_successor(&mut self, b: Block) {
        self.successors.push(b);
    }

    pub(super) fn push_predecessor(&mut self, b: Block) {
        self.predecessors.push(b);
    }

    pub(super) fn remove_successor(&mut self, b: Block) {
        self.successors.retain(|&s| s != b);
    }

    pub(super) fn remove_predecessor(&mut self, b: Block) {
        self.predecessors.retain(|&p| p != b);
    }

    pub(super) fn replace_successor(&mut self, old: Block, new: Block) {
        for s in &mut self.successors {
            if *s == old {
                *s = new;
            }
        }
    }

    pub(super) fn replace_predecessor(&mut self, old: Block, new: Block) {
        for p in &mut self.predecessors {
            if *p == old {
                *p = new;
            }
        }
    }

    pub fn dominators(&self) -> &BTreeSet<Block> {
        &self.dominators
    }

    pub(super) fn set_dominators(&mut self, doms: BTreeSet<Block>) {
        self.dominators = doms;
    }

    pub fn idom(&self) -> Option<Block> {
        self.idom
    }

    pub(super) fn set_idom(&mut self, idom: Option<Block>) {
        self.idom = idom;
    }

    pub fn dominance_frontier(&self) -> &BTreeSet<Block> {
        &self.dominance_frontier
    }

    pub(super) fn dominance_frontier_mut(&mut self) -> &mut BTreeSet<Block> {
        &mut self.dominance_frontier
    }

    pub fn layout_order(&self) -> Option<u32> {
        self.layout_order
    }

    pub(super) fn set_layout_order(&mut self, order: u32) {
        self.layout_order = Some(order);
    }

    /// Does this block already have a pending (or materialized) φ for `symbol`?
    pub fn has_pending_phi(&self, symbol: Label) -> bool {
        self.pending_phis.iter().any(|p| p.source_symbol == symbol)
    }

    /// The last instruction in this block, if any - the terminator once lowering/cleanup have run.
    pub fn last_inst(&self) -> Option<Inst> {
        self.insts.last().copied()
    }

    pub(super) fn clear_insts(&mut self) {
        self.insts.clear();
    }

    pub(super) fn set_insts(&mut self, insts: Vec<Inst>) {
        self.insts = insts;
    }
}

/// Bit-set of locals live at block entry/exit, indexed separately from `vars_in`/`vars_out`
/// (which track *source-variable* bindings, not raw liveness). Liveness is recorded directly on
/// each `Instruction` (§4.5); this alias documents the block-level join rule from §4.5's last
/// sentence: "OR in the block-level predecessor-to-successor connection".
pub type LiveSet = BTreeSet<Local>;
