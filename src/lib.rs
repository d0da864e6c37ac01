//! A three-address SSA intermediate representation, the analyses and cleanup passes that prepare
//! a function for codegen, and an x86-64 lowering backend.
//!
//! [`ir::Function`] is the thing a frontend builds (via its `ir_*` methods) and this crate turns
//! into machine instructions: [`pass::require`] runs SSA construction and liveness to a cached
//! fixpoint, [`regalloc::allocate`] assigns physical registers, and
//! [`isa::x86::compile::compile_function`] drives the result through a [`emit::CodeEmitter`].

pub mod cleanup;
pub mod dominance;
pub mod emit;
pub mod entity;
pub mod error;
pub mod flags;
pub mod ir;
pub mod isa;
pub mod liveness;
pub mod pass;
pub mod regalloc;
pub mod ssa;
pub mod symbols;
pub mod types;
pub mod verifier;
pub mod write;

pub use emit::CodeEmitter;
pub use error::{CodegenError, CodegenResult};
pub use flags::{Flags, FlagsBuilder, OptLevel};
pub use ir::Function;
pub use isa::x86::compile::compile_function;
pub use pass::{require as require_pass, PassKind};
pub use symbols::SymbolTables;
pub use types::TypeHandle;
