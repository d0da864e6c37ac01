//! The pass manager: a validity cache over the fixed set of analyses and transforms this crate
//! knows how to run.

use crate::flags::Flags;
use crate::symbols::SymbolTables;
use crate::types::TypeHandle;
use crate::{cleanup, dominance, liveness, ssa, verifier};
use crate::ir::function::Function;

/// One entry in the fixed pass table.
///
/// The five unimplemented optimization passes exist as named variants so the table is complete
/// against the interface this crate documents, even though invoking them panics (§7).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum PassKind {
    EnforceSsa = 0,
    DominanceFrontier = 1,
    Liveness = 2,
    ReachingDefs = 3,
    DeadCodeElim = 4,
    CommonSubexprElim = 5,
    GlobalValueNumbering = 6,
    ConstantFolding = 7,
    OptimizeArithmetic = 8,
    LinearizeCfg = 9,
    PhiElimination = 10,
    CleanupNops = 11,
}

const PASS_COUNT: usize = 12;

/// A bitset of which passes currently hold over a `Function`'s IR.
#[derive(Clone, Debug)]
pub struct PassSet {
    valid: [bool; PASS_COUNT],
}

impl PassSet {
    pub fn new() -> Self {
        Self {
            valid: [false; PASS_COUNT],
        }
    }

    pub fn is_valid(&self, kind: PassKind) -> bool {
        self.valid[kind as usize]
    }

    pub fn set_valid(&mut self, kind: PassKind) {
        self.valid[kind as usize] = true;
    }

    pub fn invalidate(&mut self, kind: PassKind) {
        self.valid[kind as usize] = false;
    }
}

impl Default for PassSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `kind` over `func` if its bit isn't already set, logging at `debug!` only on an actual
/// (re)run - cache hits stay silent so normal compilation doesn't spam the log. When
/// `flags.enable_verifier()` is set, immediately re-checks the invariant each pass is supposed to
/// establish (§8) and panics with a descriptive message if it doesn't hold.
pub fn require<T: TypeHandle>(func: &mut Function<T>, symtab: &mut SymbolTables<T>, flags: &Flags, kind: PassKind) {
    if func.valid_passes().is_valid(kind) {
        return;
    }
    log::debug!("running pass {kind:?} on {}", func.label());
    match kind {
        PassKind::DominanceFrontier => {
            dominance::compute_dominance_frontiers(func);
            if flags.enable_verifier() {
                verifier::check_dominance(func);
            }
        }
        PassKind::EnforceSsa => {
            require(func, symtab, flags, PassKind::DominanceFrontier);
            ssa::enforce_ssa(func, symtab);
            if flags.enable_verifier() {
                verifier::check_ssa(func);
            }
        }
        PassKind::Liveness => {
            liveness::compute(func);
            if flags.enable_verifier() {
                verifier::check_liveness(func);
            }
        }
        PassKind::ReachingDefs => panic!("reaching-definitions analysis is not implemented"),
        PassKind::DeadCodeElim => panic!("dead-code elimination is not implemented"),
        PassKind::CommonSubexprElim => panic!("common-subexpression elimination is not implemented"),
        PassKind::GlobalValueNumbering => panic!("global value numbering is not implemented"),
        PassKind::ConstantFolding => panic!("constant folding is not implemented"),
        PassKind::OptimizeArithmetic => panic!("arithmetic strength reduction is not implemented"),
        PassKind::LinearizeCfg => cleanup::linearize_cfg(func),
        PassKind::PhiElimination => {
            require(func, symtab, flags, PassKind::LinearizeCfg);
            cleanup::phi_elim(func, symtab);
            if flags.enable_verifier() {
                verifier::check_no_phi(func);
            }
        }
        PassKind::CleanupNops => {
            require(func, symtab, flags, PassKind::PhiElimination);
            cleanup::cleanup_nops(func);
            if flags.enable_verifier() {
                verifier::check_no_redundant_goto(func);
            }
        }
    }
    func.valid_passes_mut().set_valid(kind);
}

/// Mark `kind` stale without running anything.
pub fn invalidate<T: TypeHandle>(func: &mut Function<T>, kind: PassKind) {
    func.valid_passes_mut().invalidate(kind);
}
