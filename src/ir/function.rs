//! Functions: the arena owning a CFG's blocks and instructions, plus the IR builder surface.

use std::collections::HashMap;

use smallvec::smallvec;

use super::block::BasicBlockData;
use super::entities::{Block, Inst};
use super::instruction::Instruction;
use super::location::Location;
use super::opcode::{ListOp, Opcode};
use super::variable::Variable;
use crate::emit::Condition;
use crate::entity::{PrimaryMap, SecondaryMap};
use crate::pass::PassSet;
use crate::symbols::{Label, Local, SymbolTables};
use crate::types::TypeHandle;

/// One compiled function: its label, type, block/instruction arenas, and the builder-facing
/// bookkeeping SSA construction and register allocation need.
pub struct Function<T: TypeHandle> {
    label: Label,
    ty: T,

    blocks: PrimaryMap<Block, BasicBlockData<T>>,
    insts: PrimaryMap<Inst, Instruction<T>>,
    next_uid: u32,

    entry: Block,
    exit: Option<Block>,
    active: Block,

    /// `Variable -> Local` bindings, populated as source variables are first referenced.
    variable_table: HashMap<Variable, Local>,
    /// The inverse of `variable_table`, restricted to the *initial* (pre-renumbering) binding:
    /// which source-symbol (if any) a given local was minted for. SSA renaming only ever rewrites
    /// locals that trace back to a named source variable; anonymous temps (e.g. `load`/`store`
    /// addresses) are left alone.
    variable_of_local: SecondaryMap<Local, Option<Label>>,
    /// Per source-symbol, the blocks containing a definition - populated by SSA construction
    /// step 1 and grown during φ placement (§4.3 step 2).
    defining_blocks: HashMap<Label, Vec<Block>>,
    /// Per source-symbol, the next SSA version to hand out.
    ssa_counter: HashMap<Label, u32>,

    inner_functions: Vec<Function<T>>,
    frame_size: u32,

    valid_passes: PassSet,
}

impl<T: TypeHandle> Function<T> {
    /// Create a function with an implicit, empty entry block.
    pub fn new(label: Label, ty: T) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlockData::new(0));
        Self {
            label,
            ty,
            blocks,
            insts: PrimaryMap::new(),
            next_uid: 1,
            entry,
            exit: None,
            active: entry,
            variable_table: HashMap::new(),
            variable_of_local: SecondaryMap::new(),
            defining_blocks: HashMap::new(),
            ssa_counter: HashMap::new(),
            inner_functions: Vec::new(),
            frame_size: 0,
            valid_passes: PassSet::new(),
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn ty(&self) -> T {
        self.ty
    }

    pub fn entry(&self) -> Block {
        self.entry
    }

    pub fn exit(&self) -> Option<Block> {
        self.exit
    }

    pub fn active(&self) -> Block {
        self.active
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn grow_frame(&mut self, bytes: u32) -> i32 {
        self.frame_size += bytes;
        -(self.frame_size as i32)
    }

    pub fn valid_passes(&self) -> &PassSet {
        &self.valid_passes
    }

    pub fn valid_passes_mut(&mut self) -> &mut PassSet {
        &mut self.valid_passes
    }

    pub fn inner_functions(&self) -> &[Function<T>] {
        &self.inner_functions
    }

    pub fn add_inner_function(&mut self, f: Function<T>) {
        self.inner_functions.push(f);
    }

    pub fn block(&self, b: Block) -> &BasicBlockData<T> {
        &self.blocks[b]
    }

    pub fn block_mut(&mut self, b: Block) -> &mut BasicBlockData<T> {
        &mut self.blocks[b]
    }

    pub fn blocks(&self) -> &PrimaryMap<Block, BasicBlockData<T>> {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut PrimaryMap<Block, BasicBlockData<T>> {
        &mut self.blocks
    }

    pub fn inst(&self, i: Inst) -> &Instruction<T> {
        &self.insts[i]
    }

    pub fn inst_mut(&mut self, i: Inst) -> &mut Instruction<T> {
        &mut self.insts[i]
    }

    pub fn insts(&self) -> &PrimaryMap<Inst, Instruction<T>> {
        &self.insts
    }

    /// Every instruction id across every block, in block-then-in-block order.
    pub fn layout_insts(&self) -> Vec<Inst> {
        self.blocks.iter().flat_map(|(_, b)| b.insts().to_vec()).collect()
    }

    pub fn defining_blocks(&self, symbol: Label) -> &[Block] {
        self.defining_blocks.get(&symbol).map_or(&[], |v| v.as_slice())
    }

    pub fn defining_blocks_mut(&mut self, symbol: Label) -> &mut Vec<Block> {
        self.defining_blocks.entry(symbol).or_default()
    }

    pub fn all_source_symbols(&self) -> Vec<Label> {
        self.defining_blocks.keys().copied().collect()
    }

    pub fn variable_of_local(&self, local: Local) -> Option<Label> {
        *self.variable_of_local.get(local)
    }

    /// `new_block`: append a disconnected block.
    pub fn new_block(&mut self) -> Block {
        self.try_new_block().expect("function exhausted its block id space")
    }

    /// Checked form of [`Self::new_block`]: returns
    /// [`crate::error::CodegenError::TooManyBlocks`] instead of panicking once this function's
    /// dense block id space is exhausted (§7) - not reachable by any realistic input, but a typed
    /// failure mode rather than a silent wraparound.
    pub fn try_new_block(&mut self) -> crate::error::CodegenResult<Block> {
        let uid = self.next_uid;
        self.blocks
            .try_push(BasicBlockData::new(uid))
            .map(|b| {
                self.next_uid += 1;
                b
            })
            .ok_or(crate::error::CodegenError::TooManyBlocks)
    }

    /// `add_block`: wire a successor edge from the active block to `b`.
    pub fn add_block(&mut self, b: Block) {
        let active = self.active;
        self.blocks[active].push_successor(b);
        self.blocks[b].push_predecessor(active);
    }

    /// `set_active`: switch the insertion point.
    pub fn set_active(&mut self, b: Block) {
        self.active = b;
    }

    /// `create_local`: register a named local of the given type directly (bypassing the
    /// source-variable table - used for address-taken locals that `load`/`store` address, which
    /// SSA renaming must not touch).
    pub fn create_local(&mut self, symtab: &mut SymbolTables<T>, name: &str, ty: T) -> Local {
        let local = symtab.create_local(name, ty);
        self.variable_of_local.set(local, None);
        local
    }

    pub fn create_temp(&mut self, symtab: &mut SymbolTables<T>, ty: T) -> Local {
        let local = symtab.create_temp(ty);
        self.variable_of_local.set(local, None);
        local
    }

    /// The local currently bound to the initial (pre-SSA) version of a named source variable,
    /// creating it on first reference.
    fn variable_local(&mut self, symtab: &mut SymbolTables<T>, symbol: Label, ty: T) -> Local {
        let var = Variable::initial(symbol);
        if let Some(&l) = self.variable_table.get(&var) {
            return l;
        }
        let name = symtab.label_name(symbol).to_string();
        let local = symtab.create_local(&name, ty);
        self.variable_table.insert(var, local);
        self.variable_of_local.set(local, Some(symbol));
        local
    }

    /// `ir_var`: read the current value of a named source variable.
    pub fn ir_var(&mut self, symtab: &mut SymbolTables<T>, symbol: Label, ty: T) -> Location {
        Location::Local(self.variable_local(symtab, symbol, ty))
    }

    /// `ir_temp`: mint a fresh anonymous local and return a reference to it, without appending
    /// any instruction.
    pub fn ir_temp(&mut self, symtab: &mut SymbolTables<T>, ty: T) -> Location {
        Location::Local(self.create_temp(symtab, ty))
    }

    /// `add_insn`: append `i` to the active block, minting a destination local first if `i` is
    /// value-producing (eager per the design note recorded at the `Instruction` data model).
    fn add_insn(&mut self, i: Instruction<T>) -> Inst {
        let inst = self.insts.push(i);
        let active = self.active;
        self.blocks[active].push_inst(inst);
        inst
    }

    /// Insert `i` at the head of `block`'s instruction list (used to materialize φs, which must
    /// precede everything else in the block).
    pub fn insert_at_head(&mut self, block: Block, i: Instruction<T>) -> Inst {
        let inst = self.insts.push(i);
        self.blocks[block].prepend_inst(inst);
        inst
    }

    /// Allocate `i` into the instruction arena without attaching it to any block's instruction
    /// list. Used by passes (phi-elimination) that need to pick the exact insertion index
    /// themselves rather than append/prepend.
    pub fn alloc_inst(&mut self, i: Instruction<T>) -> Inst {
        self.insts.push(i)
    }

    fn push_result(
        &mut self,
        symtab: &mut SymbolTables<T>,
        opcode: Opcode,
        ty: T,
        src: super::instruction::OperandList,
    ) -> Location {
        let dest = if opcode.has_result() {
            let local = self.create_temp(symtab, ty);
            Location::Local(local)
        } else {
            Location::None
        };
        self.add_insn(Instruction::new(opcode, ty, dest, src));
        dest
    }

    fn push_void(&mut self, opcode: Opcode, ty: T, src: super::instruction::OperandList) -> Inst {
        self.add_insn(Instruction::new(opcode, ty, Location::None, src))
    }

    /// `ir_assign`: write `src` into the named source variable `symbol`. Before SSA construction
    /// this targets the variable's one pre-renumbering local; SSA renaming (§4.3 step 4) is what
    /// gives later reads of `symbol` the right version.
    pub fn ir_assign(
        &mut self,
        symtab: &mut SymbolTables<T>,
        symbol: Label,
        ty: T,
        src: Location,
    ) -> Location {
        let local = self.variable_local(symtab, symbol, ty);
        let dest = Location::Local(local);
        self.add_insn(Instruction::new(Opcode::Assign, ty, dest, smallvec![src]));
        let active = self.active;
        let defs = self.defining_blocks_mut(symbol);
        if !defs.contains(&active) {
            defs.push(active);
        }
        dest
    }

    fn binary(&mut self, symtab: &mut SymbolTables<T>, op: Opcode, ty: T, lhs: Location, rhs: Location) -> Location {
        self.push_result(symtab, op, ty, smallvec![lhs, rhs])
    }

    pub fn ir_add(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Add, ty, l, r)
    }
    pub fn ir_sub(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Sub, ty, l, r)
    }
    pub fn ir_mul(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Mul, ty, l, r)
    }
    pub fn ir_div(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Div, ty, l, r)
    }
    pub fn ir_rem(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Rem, ty, l, r)
    }
    pub fn ir_and(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::And, ty, l, r)
    }
    pub fn ir_or(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Or, ty, l, r)
    }
    pub fn ir_xor(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.binary(s, Opcode::Xor, ty, l, r)
    }

    fn compare(&mut self, s: &mut SymbolTables<T>, cond: Condition, ty: T, l: Location, r: Location) -> Location {
        let op = match cond {
            Condition::Equal => Opcode::Eq,
            Condition::NotEqual => Opcode::Ne,
            Condition::Less => Opcode::Lt,
            Condition::LessOrEqual => Opcode::Le,
            Condition::Greater => Opcode::Gt,
            Condition::GreaterOrEqual => Opcode::Ge,
        };
        self.binary(s, op, ty, l, r)
    }

    pub fn ir_eq(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.compare(s, Condition::Equal, ty, l, r)
    }
    pub fn ir_ne(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.compare(s, Condition::NotEqual, ty, l, r)
    }
    pub fn ir_lt(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.compare(s, Condition::Less, ty, l, r)
    }
    pub fn ir_le(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.compare(s, Condition::LessOrEqual, ty, l, r)
    }
    pub fn ir_gt(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.compare(s, Condition::Greater, ty, l, r)
    }
    pub fn ir_ge(&mut self, s: &mut SymbolTables<T>, ty: T, l: Location, r: Location) -> Location {
        self.compare(s, Condition::GreaterOrEqual, ty, l, r)
    }

    pub fn ir_not(&mut self, s: &mut SymbolTables<T>, ty: T, src: Location) -> Location {
        self.push_result(s, Opcode::Not, ty, smallvec![src])
    }

    /// `ir_neg`: arithmetic negation. Declared for interface completeness; lowering currently
    /// treats this opcode as a no-op copy (see the x86 lowering docs and §9's resolution).
    pub fn ir_neg(&mut self, s: &mut SymbolTables<T>, ty: T, src: Location) -> Location {
        self.push_result(s, Opcode::Neg, ty, smallvec![src])
    }

    pub fn ir_load(&mut self, s: &mut SymbolTables<T>, ty: T, src: Location) -> Location {
        self.push_result(s, Opcode::Load, ty, smallvec![src])
    }

    pub fn ir_store(&mut self, dest: Location, src: Location, ty: T) -> Inst {
        self.push_void(Opcode::Store, ty, smallvec![dest, src])
    }

    /// `ir_arg`/`LOAD_ARG`: materialize the `n`-th incoming argument.
    pub fn ir_arg(&mut self, s: &mut SymbolTables<T>, ty: T, n: u32) -> Location {
        self.push_result(s, Opcode::LoadArg, ty, smallvec![Location::Immediate(n as i64)])
    }

    pub fn ir_address(&mut self, s: &mut SymbolTables<T>, ty: T, of: Location) -> Location {
        self.push_result(s, Opcode::Address, ty, smallvec![of])
    }

    pub fn ir_load_ptr(&mut self, s: &mut SymbolTables<T>, ty: T, ptr: Location, offset: i32) -> Location {
        self.push_result(s, Opcode::LoadPtr, ty, smallvec![ptr, Location::Immediate(offset as i64)])
    }

    pub fn ir_store_ptr(&mut self, ptr: Location, offset: i32, src: Location, ty: T) -> Inst {
        self.push_void(Opcode::StorePtr, ty, smallvec![ptr, Location::Immediate(offset as i64), src])
    }

    /// `ir_goto`: terminate the active block with an unconditional jump. The CFG edge itself is
    /// recorded by `add_block`, not here (§4.1's edge discipline); this just emits the marker
    /// instruction lowering recognizes as the block's terminator.
    pub fn ir_goto(&mut self, void_ty: T, target: Block) -> Inst {
        self.add_block(target);
        self.push_void(Opcode::Goto, void_ty, smallvec![])
    }

    /// `ir_if`: terminate the active block with a conditional branch. `if_true` is wired as the
    /// first successor, `if_false` as the second, matching the `jump_if_zero`-to-first-successor
    /// lowering in §4.7.
    pub fn ir_if(&mut self, void_ty: T, cond: Location, if_zero: Block, if_nonzero: Block) -> Inst {
        self.add_block(if_zero);
        self.add_block(if_nonzero);
        self.push_void(Opcode::IfZero, void_ty, smallvec![cond])
    }

    pub fn ir_call(&mut self, s: &mut SymbolTables<T>, ty: T, func: Location, args: &[Location]) -> Location {
        self.try_ir_call(s, ty, func, args)
            .expect("call arity within the supported range")
    }

    /// Checked form of [`Self::ir_call`]: returns [`crate::error::CodegenError::UnsupportedArity`]
    /// instead of panicking when `args` is too large for the calling convention's
    /// register-plus-stack scheme to address (more stack slots than fit in an `i32` count, §7).
    /// Ordinary frontends never hit this - it exists so the one arity-dependent arithmetic in this
    /// crate has a typed failure mode rather than silently wrapping.
    pub fn try_ir_call(
        &mut self,
        s: &mut SymbolTables<T>,
        ty: T,
        func: Location,
        args: &[Location],
    ) -> crate::error::CodegenResult<Location> {
        if args.len() > i32::MAX as usize {
            return Err(crate::error::CodegenError::UnsupportedArity(args.len()));
        }
        let mut src = smallvec![func];
        src.extend_from_slice(args);
        Ok(self.push_result(s, Opcode::Call, ty, src))
    }

    pub fn ir_return(&mut self, void_ty: T, value: Location) -> Inst {
        self.push_void(Opcode::Ret, void_ty, smallvec![value])
    }

    /// `ir_phi`: build a φ directly, for a caller that constructs already-SSA-form IR itself
    /// instead of relying on `enforce_ssa` to insert one. Ordinary frontends never call this -
    /// `enforce_ssa` materializes φs at the head of join blocks on its own (§4.3) - but the
    /// builder surface is complete against §3's opcode set regardless.
    pub fn ir_phi(&mut self, s: &mut SymbolTables<T>, ty: T, incoming: &[Location]) -> Location {
        self.push_result(s, Opcode::Phi, ty, incoming.iter().copied().collect())
    }

    /// `ir_head`/`ir_tail`/`ir_cons`: declared list primitives (§9 Open Questions). Constructible
    /// so a frontend's builder surface is complete, but their semantics are deferred - lowering
    /// panics if one of these is ever actually reached, so a frontend that never calls them never
    /// pays for or notices this.
    pub fn ir_head(&mut self, s: &mut SymbolTables<T>, ty: T, list: Location) -> Location {
        self.push_result(s, Opcode::ListPrimitive(ListOp::Head), ty, smallvec![list])
    }

    pub fn ir_tail(&mut self, s: &mut SymbolTables<T>, ty: T, list: Location) -> Location {
        self.push_result(s, Opcode::ListPrimitive(ListOp::Tail), ty, smallvec![list])
    }

    pub fn ir_cons(&mut self, s: &mut SymbolTables<T>, ty: T, head: Location, tail: Location) -> Location {
        self.push_result(s, Opcode::ListPrimitive(ListOp::Cons), ty, smallvec![head, tail])
    }

    /// `finish`: close the function by creating an exit block reachable from the active block,
    /// switching to it, and appending a `ret`.
    pub fn finish(&mut self, void_ty: T, result: Location) {
        let exit = self.new_block();
        self.ir_goto(void_ty, exit);
        self.set_active(exit);
        self.exit = Some(exit);
        self.ir_return(void_ty, result);
    }
}
