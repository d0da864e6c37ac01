//! The type interface this core treats as opaque (§6 of the design doc).
//!
//! Everything upstream of this crate - parsing, name resolution, the actual type system - lives
//! in a frontend we never see. All we need from a type is its machine size and whether two types
//! are the same one; a few distinguished markers (`void`, `bool`) get their own predicates because
//! the IR builder and liveness both special-case them, and compound types need to expose their
//! element types so call lowering can walk an argument list.

use std::fmt;

/// Everything the core needs to know about a source-language type.
///
/// Implemented by the frontend's own type representation; this crate never constructs one itself
/// except in tests, where [`BasicType`] stands in for a frontend.
pub trait TypeHandle: Copy + Eq + fmt::Debug {
    /// Size in bytes of this type's machine representation. Void is conventionally zero.
    fn size_of(&self) -> u32;

    /// Is this the distinguished "no value" type used for effectful instructions?
    fn is_void(&self) -> bool;

    /// Is this the distinguished boolean type produced by comparisons and `not`?
    fn is_bool(&self) -> bool;

    /// Number of elements in a compound (tuple/function-signature) type, or `None` if this type
    /// isn't compound.
    fn arity(&self) -> Option<usize> {
        None
    }

    /// The `i`-th element type of a compound type. Panics if `i >= arity()` or the type isn't
    /// compound; callers are expected to check `arity()` first.
    fn element(&self, i: usize) -> Self {
        panic!("type {:?} has no element {}", self, i)
    }
}

/// A minimal concrete [`TypeHandle`] used by this crate's own tests in lieu of a real frontend.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BasicType {
    /// The empty, zero-sized "no result" type.
    Void,
    /// A 1-bit boolean, represented as a full 8-byte machine word.
    Bool,
    /// A 64-bit signed integer.
    I64,
    /// A 64-bit pointer (no provenance tracking at this layer).
    Ptr,
    /// A fixed-arity tuple of element types, used only to exercise the `arity`/`element` path.
    Tuple(&'static [BasicType]),
}

impl TypeHandle for BasicType {
    fn size_of(&self) -> u32 {
        match self {
            BasicType::Void => 0,
            BasicType::Bool | BasicType::I64 | BasicType::Ptr => 8,
            BasicType::Tuple(elems) => elems.iter().map(TypeHandle::size_of).sum(),
        }
    }

    fn is_void(&self) -> bool {
        matches!(self, BasicType::Void)
    }

    fn is_bool(&self) -> bool {
        matches!(self, BasicType::Bool)
    }

    fn arity(&self) -> Option<usize> {
        match self {
            BasicType::Tuple(elems) => Some(elems.len()),
            _ => None,
        }
    }

    fn element(&self, i: usize) -> Self {
        match self {
            BasicType::Tuple(elems) => elems[i],
            other => panic!("type {:?} has no element {}", other, i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(BasicType::Void.size_of(), 0);
        assert_eq!(BasicType::I64.size_of(), 8);
        assert!(BasicType::Void.is_void());
        assert!(BasicType::Bool.is_bool());
    }

    #[test]
    fn tuple_arity() {
        static ELEMS: &[BasicType] = &[BasicType::I64, BasicType::Ptr];
        let t = BasicType::Tuple(ELEMS);
        assert_eq!(t.arity(), Some(2));
        assert_eq!(t.element(0), BasicType::I64);
        assert_eq!(t.element(1), BasicType::Ptr);
    }
}
