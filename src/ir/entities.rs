//! Dense entity references scoped to a single `Function`.
//!
//! Unlike [`crate::symbols::Label`]/`Local`/`Constant`, which are interned once per compilation
//! session, `Block` and `Inst` are scoped to the one `Function` that owns their arenas.

use crate::entity::entity_impl;

/// A reference to a basic block within one function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to an instruction within one function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");
