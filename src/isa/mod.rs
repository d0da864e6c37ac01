//! The single supported target: x86-64.
//!
//! Unlike the teacher crate this grew out of, there is exactly one ISA here, so there is no
//! `TargetIsa` trait object and no target-lexicon triple to parse - `isa::x86` is the whole
//! surface.

pub mod x86;

/// A physical register, encoded as its native x86-64 ModRM/REX register number (0-15).
///
/// `0..=15` covers the 16 general-purpose registers; this backend never allocates SSE/XMM
/// registers, so unlike the teacher's register bank this type has no high bits reserved for a
/// second bank.
pub type RegUnit = u8;
