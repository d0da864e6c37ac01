//! The "address" an IR operand evaluates to.

use crate::isa::RegUnit;
use crate::symbols::{Constant, Label, Local};
use std::fmt;

/// A tagged value naming where an IR operand lives.
///
/// `Location` never changes variant once constructed by the IR builder - renaming (SSA
/// construction) and register allocation both update the bookkeeping *pointed to* by a `Local`
/// (its ssa number, register, frame offset), not the `Location::Local` wrapper itself.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Location {
    /// No operand; used for the destination of void-typed instructions.
    None,
    /// A local (temporary or named variable slot).
    Local(Local),
    /// A signed 64-bit immediate.
    Immediate(i64),
    /// An interned constant (string literal or other pooled payload).
    Constant(Constant),
    /// An interned label (function or block symbol).
    Label(Label),
    /// A physical register, assigned only after register allocation.
    Register(RegUnit),
}

impl Location {
    /// Is this the absence of an operand?
    pub fn is_none(&self) -> bool {
        matches!(self, Location::None)
    }

    /// The local this location names, if it is one.
    pub fn as_local(&self) -> Option<Local> {
        match self {
            Location::Local(l) => Some(*l),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Location::None => write!(f, "-"),
            Location::Local(l) => write!(f, "{l}"),
            Location::Immediate(i) => write!(f, "{i}"),
            Location::Constant(c) => write!(f, "{c}"),
            Location::Label(l) => write!(f, "{l}"),
            Location::Register(r) => write!(f, "%r{r}"),
        }
    }
}
