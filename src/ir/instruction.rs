//! The atomic unit of the IR.

use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

use super::location::Location;
use super::opcode::Opcode;
use crate::symbols::Local;
use crate::types::TypeHandle;

/// Most instructions have at most a couple of source operands; `phi` and `call` are the
/// exceptions, and `SmallVec` spills to the heap for those without costing an allocation for
/// everything else.
pub type OperandList = SmallVec<[Location; 2]>;

/// One IR instruction.
///
/// `dest` is `Location::None` for effectful opcodes (`store`, `store_ptr`, `goto`, `if_zero`,
/// `ret`, `label`) and otherwise names the local the instruction's result was materialized into.
/// Per the eager-construction choice recorded in the design doc, that local is minted at
/// instruction-construction time - there is no lazy "unset" sentinel to thread through every
/// reader.
#[derive(Clone, Debug)]
pub struct Instruction<T: TypeHandle> {
    opcode: Opcode,
    ty: T,
    dest: Location,
    src: OperandList,
    live_in: BTreeSet<Local>,
    live_out: BTreeSet<Local>,
}

impl<T: TypeHandle> Instruction<T> {
    /// Construct an instruction. `dest` should already be `Location::Local(..)` for opcodes that
    /// produce a result (the function builder is responsible for minting that local), or
    /// `Location::None` for effectful opcodes.
    pub fn new(opcode: Opcode, ty: T, dest: Location, src: OperandList) -> Self {
        debug_assert_eq!(
            dest.is_none(),
            !opcode.has_result(),
            "{opcode} destination presence disagrees with Opcode::has_result"
        );
        Self {
            opcode,
            ty,
            dest,
            src,
            live_in: BTreeSet::new(),
            live_out: BTreeSet::new(),
        }
    }

    /// This instruction's opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// This instruction's result type.
    pub fn ty(&self) -> T {
        self.ty
    }

    /// This instruction's destination, or `Location::None` if it has no result.
    pub fn dest(&self) -> Location {
        self.dest
    }

    /// Overwrite the destination. Used by SSA renaming to rewrite a pre-renumbering placeholder
    /// into the freshly-numbered local, and by phi-elimination to retarget an `assign` onto a
    /// phi's old destination.
    pub fn set_dest(&mut self, dest: Location) {
        self.dest = dest;
    }

    /// This instruction's source operands, in order.
    pub fn src(&self) -> &[Location] {
        &self.src
    }

    /// Mutable access to the source operand list, used by SSA renaming.
    pub fn src_mut(&mut self) -> &mut OperandList {
        &mut self.src
    }

    /// The set of locals live into this instruction.
    pub fn live_in(&self) -> &BTreeSet<Local> {
        &self.live_in
    }

    /// The set of locals live out of this instruction.
    pub fn live_out(&self) -> &BTreeSet<Local> {
        &self.live_out
    }

    /// Mutable access to the live-in set, used by the liveness dataflow.
    pub fn live_in_mut(&mut self) -> &mut BTreeSet<Local> {
        &mut self.live_in
    }

    /// Mutable access to the live-out set, used by the liveness dataflow.
    pub fn live_out_mut(&mut self) -> &mut BTreeSet<Local> {
        &mut self.live_out
    }

    /// Apply this instruction's per-opcode liveness rule: fold `live_out` forward into `live_in`
    /// by adding the locals this instruction reads and removing the one it (over)writes.
    ///
    /// Returns `true` if `live_in` changed, matching the dataflow fixpoint's "did anything
    /// change" bookkeeping.
    pub fn apply_liveout(&mut self) -> bool {
        let before = std::mem::take(&mut self.live_in);
        let mut next = self.live_out.clone();

        match self.opcode {
            Opcode::Ret => {
                // `ret` kills everything previously live: nothing past the return point matters.
                next.clear();
            }
            Opcode::Store | Opcode::StorePtr => {
                // Destination-less: the address and the stored value are both uses, nothing is
                // killed.
            }
            _ => {
                if let Some(d) = self.dest.as_local() {
                    next.remove(&d);
                }
            }
        }
        for loc in &self.src {
            if let Some(l) = loc.as_local() {
                next.insert(l);
            }
        }

        let changed = next != before;
        self.live_in = next;
        changed
    }
}

impl<T: TypeHandle> fmt::Display for Instruction<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.dest.is_none() {
            write!(f, "{} = ", self.dest)?;
        }
        write!(f, "{}", self.opcode)?;
        for s in &self.src {
            write!(f, " {s}")?;
        }
        Ok(())
    }
}
