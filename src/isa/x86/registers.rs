//! Register tables for the x86-64 lowering backend.
//!
//! The numbering matches the processor's own ModRM/REX.B register field encoding, not
//! alphabetical order - this lets [`encode`](Gpr::encode) be a bare cast.

use std::fmt;

use crate::isa::RegUnit;

/// One of the 16 general-purpose x86-64 registers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    /// This register's native encoding, suitable for use as a [`RegUnit`].
    pub fn encode(self) -> RegUnit {
        self as u8
    }

    /// Decode a `RegUnit` produced by [`encode`](Gpr::encode) back into a `Gpr`.
    pub fn from_unit(unit: RegUnit) -> Self {
        match unit {
            0 => Gpr::Rax,
            1 => Gpr::Rcx,
            2 => Gpr::Rdx,
            3 => Gpr::Rbx,
            4 => Gpr::Rsp,
            5 => Gpr::Rbp,
            6 => Gpr::Rsi,
            7 => Gpr::Rdi,
            8 => Gpr::R8,
            9 => Gpr::R9,
            10 => Gpr::R10,
            11 => Gpr::R11,
            12 => Gpr::R12,
            13 => Gpr::R13,
            14 => Gpr::R14,
            15 => Gpr::R15,
            other => panic!("not a valid x86-64 GPR encoding: {other}"),
        }
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Gpr::Rax => "rax",
            Gpr::Rcx => "rcx",
            Gpr::Rdx => "rdx",
            Gpr::Rbx => "rbx",
            Gpr::Rsp => "rsp",
            Gpr::Rbp => "rbp",
            Gpr::Rsi => "rsi",
            Gpr::Rdi => "rdi",
            Gpr::R8 => "r8",
            Gpr::R9 => "r9",
            Gpr::R10 => "r10",
            Gpr::R11 => "r11",
            Gpr::R12 => "r12",
            Gpr::R13 => "r13",
            Gpr::R14 => "r14",
            Gpr::R15 => "r15",
        };
        write!(f, "%{s}")
    }
}

/// Format a raw `RegUnit` the way the rest of the backend's textual dumps do (`%rbx`, not a bare
/// index).
pub fn display_unit(unit: RegUnit) -> String {
    Gpr::from_unit(unit).to_string()
}

/// The stack pointer.
pub const RSP: RegUnit = Gpr::Rsp.encode();
/// The frame base pointer.
pub const RBP: RegUnit = Gpr::Rbp.encode();

/// Registers available to the linear-scan allocator, in assignment-priority order.
///
/// `rax`, `rcx`, `rdx` are excluded because the lowering backend reserves them as scratch/clobber
/// registers for legalizing memory-memory operations and two-operand `div`/`mul` forms; `rsp` and
/// `rbp` are excluded because they carry the stack and frame pointers.
pub const ALLOCATABLE_REGISTERS: &[RegUnit] = &[
    Gpr::Rbx.encode(),
    Gpr::R8.encode(),
    Gpr::R9.encode(),
    Gpr::R10.encode(),
    Gpr::R11.encode(),
    Gpr::R12.encode(),
    Gpr::R13.encode(),
    Gpr::R14.encode(),
    Gpr::R15.encode(),
];

/// Registers used to pass the first six integer/pointer arguments, in argument order.
///
/// This is **not** the System V AMD64 ABI order (`rdi, rsi, rdx, rcx, r8, r9`); functions compiled
/// by this backend only ever call or are called by other functions it also compiled, so the
/// convention is free to pick an order that is cheaper to implement, and does.
pub const ARG_REGISTERS: &[RegUnit] = &[
    Gpr::Rdi.encode(),
    Gpr::Rsi.encode(),
    Gpr::Rcx.encode(),
    Gpr::Rdx.encode(),
    Gpr::R8.encode(),
    Gpr::R9.encode(),
];

/// Scratch registers the lowering backend reserves for legalizing instructions whose operands
/// can't both be memory, and for the two-operand forms of `mul`/`div`.
pub const CLOBBER_REGISTERS: &[RegUnit] = &[
    Gpr::Rax.encode(),
    Gpr::Rdx.encode(),
    Gpr::Rcx.encode(),
    Gpr::Rbx.encode(),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_roundtrip() {
        for &unit in ALLOCATABLE_REGISTERS
            .iter()
            .chain(ARG_REGISTERS)
            .chain(CLOBBER_REGISTERS)
        {
            assert_eq!(Gpr::from_unit(unit).encode(), unit);
        }
    }

    #[test]
    fn arg_registers_are_not_system_v_order() {
        assert_eq!(ARG_REGISTERS[2], Gpr::Rcx.encode());
        assert_ne!(ARG_REGISTERS[2], Gpr::Rdx.encode());
    }

    #[test]
    fn display_uses_percent_prefix() {
        assert_eq!(display_unit(Gpr::Rbx.encode()), "%rbx");
    }
}
