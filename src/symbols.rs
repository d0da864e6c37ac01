//! Label, local, and constant interning for one compilation session.
//!
//! The design doc's source material keeps these tables as process-wide globals, which is a fine
//! choice for a single-shot compiler process. This crate is more often embedded as a library
//! inside a larger, possibly multi-session host, so - per the alternative the design doc itself
//! names as appropriate for that shape - the tables live in one explicit `SymbolTables` value
//! threaded into every `Function` of a session, rather than behind `static`s. All three tables are
//! append-only and never remove an entry once interned.

use std::collections::HashMap;

use crate::entity::{entity_impl, PrimaryMap};
use crate::types::TypeHandle;

/// A dense reference to an interned label (a function name, block label, or other symbol).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);
entity_impl!(Label, "L");

/// A dense reference to an interned local (an SSA-numbered temporary or named variable slot).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Local(u32);
entity_impl!(Local, "t");

/// A dense reference to an interned constant (a string literal or other pooled byte payload).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant(u32);
entity_impl!(Constant, "CC");

/// Everything recorded about one interned local.
///
/// Before register allocation, `reg` is `-1` and `offset` is `0`. Afterward, exactly one of
/// `reg >= 0` or `offset != 0` holds, unless the local was never live, in which case it is mapped
/// to the allocator's designated scratch register (still `reg >= 0`).
#[derive(Debug, Clone)]
pub struct LocalData<T: TypeHandle> {
    /// Source name, or an anonymous `.t<N>` name for compiler-generated temporaries.
    pub name: String,
    /// SSA version number; `0` until SSA construction has run.
    pub ssa_number: u32,
    /// The local's type.
    pub ty: T,
    /// Physical register assigned by the allocator, or `-1` if unassigned/spilled.
    pub reg: i32,
    /// Frame offset (bytes, negative, relative to the frame pointer) if spilled, else `0`.
    pub offset: i32,
}

impl<T: TypeHandle> LocalData<T> {
    fn new(name: String, ty: T) -> Self {
        Self {
            name,
            ssa_number: 0,
            ty,
            reg: -1,
            offset: 0,
        }
    }
}

/// Everything recorded about one interned constant.
#[derive(Debug, Clone)]
pub struct ConstantData<T: TypeHandle> {
    /// Anonymous `.CC<N>` label for this constant's storage.
    pub name: String,
    /// Byte payload. String constants carry a trailing zero byte appended by the interner.
    pub data: Vec<u8>,
    /// The constant's type.
    pub ty: T,
}

/// The label/local/constant interning tables for one compilation session.
pub struct SymbolTables<T: TypeHandle> {
    labels: PrimaryMap<Label, String>,
    label_by_name: HashMap<String, Label>,
    next_anon_label: u32,

    locals: PrimaryMap<Local, LocalData<T>>,
    next_anon_local: u32,

    constants: PrimaryMap<Constant, ConstantData<T>>,
    next_anon_constant: u32,
}

impl<T: TypeHandle> SymbolTables<T> {
    /// Create a fresh, empty set of tables for one compilation session.
    pub fn new() -> Self {
        Self {
            labels: PrimaryMap::new(),
            label_by_name: HashMap::new(),
            next_anon_label: 0,
            locals: PrimaryMap::new(),
            next_anon_local: 0,
            constants: PrimaryMap::new(),
            next_anon_constant: 0,
        }
    }

    /// Intern a named label, returning the existing reference if this name was already seen.
    pub fn intern_label(&mut self, name: &str) -> Label {
        if let Some(&l) = self.label_by_name.get(name) {
            return l;
        }
        let l = self.labels.push(name.to_string());
        self.label_by_name.insert(name.to_string(), l);
        l
    }

    /// Mint a fresh anonymous label named `.L<N>`.
    pub fn new_anon_label(&mut self) -> Label {
        let name = format!(".L{}", self.next_anon_label);
        self.next_anon_label += 1;
        self.intern_label(&name)
    }

    /// Look up an already-interned label's name.
    pub fn label_name(&self, label: Label) -> &str {
        &self.labels[label]
    }

    /// Register a named local of the given type.
    pub fn create_local(&mut self, name: &str, ty: T) -> Local {
        self.try_create_local(name, ty)
            .expect("function exhausted its local id space")
    }

    /// Checked form of [`Self::create_local`]: returns
    /// [`crate::error::CodegenError::TooManyLocals`] instead of panicking once this session's
    /// dense local id space is exhausted (§7) - not reachable by any realistic input, but a typed
    /// failure mode rather than a silent wraparound.
    pub fn try_create_local(&mut self, name: &str, ty: T) -> crate::error::CodegenResult<Local> {
        self.locals
            .try_push(LocalData::new(name.to_string(), ty))
            .ok_or(crate::error::CodegenError::TooManyLocals)
    }

    /// Register a fresh anonymous local named `.t<N>`.
    pub fn create_temp(&mut self, ty: T) -> Local {
        let name = format!(".t{}", self.next_anon_local);
        self.next_anon_local += 1;
        self.create_local(&name, ty)
    }

    /// Read a local's current bookkeeping.
    pub fn local(&self, local: Local) -> &LocalData<T> {
        &self.locals[local]
    }

    /// Mutably access a local's bookkeeping (used by SSA renaming and register allocation).
    pub fn local_mut(&mut self, local: Local) -> &mut LocalData<T> {
        &mut self.locals[local]
    }

    /// Every interned local, in creation order - used by register allocation's dead-value sweep.
    pub fn local_keys(&self) -> impl Iterator<Item = Local> + '_ {
        self.locals.keys()
    }

    /// Intern a string constant, appending a trailing zero byte to its payload and minting an
    /// anonymous `.CC<N>` label for its storage.
    pub fn intern_string_constant(&mut self, bytes: &[u8], ty: T) -> Constant {
        let name = format!(".CC{}", self.next_anon_constant);
        self.next_anon_constant += 1;
        let mut data = bytes.to_vec();
        data.push(0);
        self.constants.push(ConstantData { name, data, ty })
    }

    /// Read a constant's bookkeeping.
    pub fn constant(&self, constant: Constant) -> &ConstantData<T> {
        &self.constants[constant]
    }
}

impl<T: TypeHandle> Default for SymbolTables<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BasicType;

    #[test]
    fn label_interning_is_idempotent() {
        let mut tables: SymbolTables<BasicType> = SymbolTables::new();
        let a = tables.intern_label("main");
        let b = tables.intern_label("main");
        assert_eq!(a, b);
        assert_eq!(tables.label_name(a), "main");
    }

    #[test]
    fn anonymous_labels_are_monotonic_and_distinct() {
        let mut tables: SymbolTables<BasicType> = SymbolTables::new();
        let a = tables.new_anon_label();
        let b = tables.new_anon_label();
        assert_ne!(a, b);
        assert_eq!(tables.label_name(a), ".L0");
        assert_eq!(tables.label_name(b), ".L1");
    }

    #[test]
    fn string_constants_get_a_trailing_zero() {
        let mut tables: SymbolTables<BasicType> = SymbolTables::new();
        let c = tables.intern_string_constant(b"hi", BasicType::Ptr);
        assert_eq!(tables.constant(c).data, b"hi\0");
    }

    #[test]
    fn locals_start_unassigned() {
        let mut tables: SymbolTables<BasicType> = SymbolTables::new();
        let l = tables.create_temp(BasicType::I64);
        let data = tables.local(l);
        assert_eq!(data.reg, -1);
        assert_eq!(data.offset, 0);
        assert_eq!(data.ssa_number, 0);
    }
}
