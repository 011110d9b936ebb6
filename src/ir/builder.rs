//! SSA construction.
//!
//! The builder tracks an insertion position (block + point within it) and
//! the context stacks a recursive-descent front-end needs: enclosing loop
//! headers/exits for `continue`/`break`, and true/false targets for
//! short-circuit evaluation. Factory methods allocate an instruction,
//! splice it in at the current position, and advance past it.
//!
//! Two rules, chosen and documented here:
//! - with no current block set, factories return a detached (orphan)
//!   instruction that is not inserted anywhere
//! - terminator factories **refuse** when the current block already has a
//!   terminator: they return `None` and leave the block untouched

use super::inst::InstExtra;
use super::module::Module;
use super::types::{DimVec, TypeId, TypeKind};
use super::value::{ConstData, ValueId, ValueKind};
use smallvec::SmallVec;

/// Context stacks stay inline for the nesting depths real code has.
type BlockStack = SmallVec<[ValueId; 4]>;

/// Where the next instruction lands within the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    /// Immediately before the given placed instruction.
    Before(ValueId),
    /// At the end of the block.
    End,
}

// =============================================================================
// Builder
// =============================================================================

/// IR construction interface over a module.
pub struct Builder<'m> {
    module: &'m mut Module,
    block: ValueId,
    at: InsertAt,

    headers: BlockStack,
    exits: BlockStack,
    true_targets: BlockStack,
    false_targets: BlockStack,

    if_cnt: u32,
    while_cnt: u32,
    rhs_cnt: u32,
    func_cnt: u32,
    var_cnt: u32,
    block_cnt: u32,
}

impl<'m> Builder<'m> {
    /// Create a builder with no insertion position.
    pub fn new(module: &'m mut Module) -> Self {
        Builder {
            module,
            block: ValueId::INVALID,
            at: InsertAt::End,
            headers: SmallVec::new(),
            exits: SmallVec::new(),
            true_targets: SmallVec::new(),
            false_targets: SmallVec::new(),
            if_cnt: 0,
            while_cnt: 0,
            rhs_cnt: 0,
            func_cnt: 0,
            var_cnt: 0,
            block_cnt: 0,
        }
    }

    /// The module being built.
    #[inline]
    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    // =========================================================================
    // Position
    // =========================================================================

    /// The current insertion block, if set.
    pub fn cur_block(&self) -> Option<ValueId> {
        self.block.is_valid().then_some(self.block)
    }

    /// The current insertion point.
    #[inline]
    pub fn position(&self) -> InsertAt {
        self.at
    }

    /// Set the insertion position explicitly.
    pub fn set_pos(&mut self, block: ValueId, at: InsertAt) {
        self.block = block;
        self.at = at;
    }

    /// Position at the beginning of `block`.
    pub fn set_pos_begin(&mut self, block: ValueId) {
        self.block = block;
        self.at = match self.module.first_inst(block) {
            Some(first) => InsertAt::Before(first),
            None => InsertAt::End,
        };
    }

    /// Position at the end of `block`.
    pub fn set_pos_end(&mut self, block: ValueId) {
        self.block = block;
        self.at = InsertAt::End;
    }

    /// Clear the insertion position; subsequent factories yield orphans.
    pub fn clear_pos(&mut self) {
        self.block = ValueId::INVALID;
        self.at = InsertAt::End;
    }

    // =========================================================================
    // Context stacks
    // =========================================================================

    /// Enter a loop: push its header and exit blocks.
    pub fn push_loop(&mut self, header: ValueId, exit: ValueId) {
        self.headers.push(header);
        self.exits.push(exit);
    }

    /// Leave the innermost loop.
    pub fn pop_loop(&mut self) {
        self.headers.pop();
        self.exits.pop();
    }

    /// Innermost loop header (the `continue` target), if inside a loop.
    pub fn header(&self) -> Option<ValueId> {
        self.headers.last().copied()
    }

    /// Innermost loop exit (the `break` target), if inside a loop.
    pub fn exit(&self) -> Option<ValueId> {
        self.exits.last().copied()
    }

    /// Push short-circuit branch targets.
    pub fn push_tf(&mut self, true_target: ValueId, false_target: ValueId) {
        self.true_targets.push(true_target);
        self.false_targets.push(false_target);
    }

    /// Pop short-circuit branch targets.
    pub fn pop_tf(&mut self) {
        self.true_targets.pop();
        self.false_targets.pop();
    }

    /// Current true target, if any.
    pub fn true_target(&self) -> Option<ValueId> {
        self.true_targets.last().copied()
    }

    /// Current false target, if any.
    pub fn false_target(&self) -> Option<ValueId> {
        self.false_targets.last().copied()
    }

    // =========================================================================
    // Naming counters
    // =========================================================================

    /// Post-increment the `if` counter.
    pub fn if_inc(&mut self) -> u32 {
        let n = self.if_cnt;
        self.if_cnt += 1;
        n
    }

    /// Post-increment the `while` counter.
    pub fn while_inc(&mut self) -> u32 {
        let n = self.while_cnt;
        self.while_cnt += 1;
        n
    }

    /// Post-increment the right-hand-side counter.
    pub fn rhs_inc(&mut self) -> u32 {
        let n = self.rhs_cnt;
        self.rhs_cnt += 1;
        n
    }

    /// Post-increment the function counter.
    pub fn func_inc(&mut self) -> u32 {
        let n = self.func_cnt;
        self.func_cnt += 1;
        n
    }

    /// Post-increment the local-variable counter.
    pub fn var_inc(&mut self) -> u32 {
        let n = self.var_cnt;
        self.var_cnt += 1;
        n
    }

    /// Post-increment the block counter.
    pub fn block_inc(&mut self) -> u32 {
        let n = self.block_cnt;
        self.block_cnt += 1;
        n
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    fn insert(&mut self, inst: ValueId) -> ValueId {
        if self.block.is_valid() {
            match self.at {
                InsertAt::Before(anchor) => self.module.insert_inst_before(anchor, inst),
                InsertAt::End => self.module.append_inst(self.block, inst),
            }
        }
        inst
    }

    fn block_is_terminated(&self) -> bool {
        self.block.is_valid() && self.module.terminator(self.block).is_some()
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Binary arithmetic. The result type follows the operands.
    pub fn make_binary(&mut self, kind: ValueKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        debug_assert!(kind.is_binary());
        let ty = self.module.ty(lhs);
        let inst = self.module.new_orphan_inst(kind, ty);
        self.module.add_operand(inst, lhs);
        self.module.add_operand(inst, rhs);
        self.insert(inst)
    }

    /// Integer or float comparison, producing i1.
    pub fn make_cmp(&mut self, kind: ValueKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        debug_assert!(kind.is_cmp());
        let ty = self.module.types.bool();
        let inst = self.module.new_orphan_inst(kind, ty);
        self.module.add_operand(inst, lhs);
        self.module.add_operand(inst, rhs);
        self.insert(inst)
    }

    /// Unary operation or cast with an explicit result type.
    pub fn make_unary(&mut self, kind: ValueKind, value: ValueId, ty: TypeId) -> ValueId {
        debug_assert!(kind.is_unary());
        let inst = self.module.new_orphan_inst(kind, ty);
        self.module.add_operand(inst, value);
        self.insert(inst)
    }

    /// Float negation.
    pub fn make_fneg(&mut self, value: ValueId) -> ValueId {
        let ty = self.module.ty(value);
        self.make_unary(ValueKind::FNeg, value, ty)
    }

    /// Type cast with an explicit target type.
    pub fn make_cast(&mut self, kind: ValueKind, value: ValueId, target: TypeId) -> ValueId {
        debug_assert!(kind.is_cast());
        self.make_unary(kind, value, target)
    }

    /// Stack allocation; yields a pointer to `pointee`.
    pub fn make_alloca(&mut self, pointee: TypeId, is_const: bool) -> ValueId {
        let ty = self.module.types.pointer_to(pointee);
        let inst = self.module.new_inst_with_extra(
            ValueKind::Alloca,
            ty,
            InstExtra::Alloca { pointee, is_const },
        );
        self.insert(inst)
    }

    /// Load through a pointer; the result is the pointee type.
    pub fn make_load(&mut self, ptr: ValueId) -> ValueId {
        let ptr_ty = self.module.ty(ptr);
        let ty = self
            .module
            .types
            .pointee(ptr_ty)
            .unwrap_or_else(|| self.module.types.undef());
        let inst = self.module.new_orphan_inst(ValueKind::Load, ty);
        self.module.add_operand(inst, ptr);
        self.insert(inst)
    }

    /// Store `value` through `ptr`.
    pub fn make_store(&mut self, value: ValueId, ptr: ValueId) -> ValueId {
        let ty = self.module.types.void();
        let inst = self.module.new_orphan_inst(ValueKind::Store, ty);
        self.module.add_operand(inst, value);
        self.module.add_operand(inst, ptr);
        self.insert(inst)
    }

    /// Element address computation; yields a pointer to `base_ty`.
    pub fn make_gep(
        &mut self,
        base_ty: TypeId,
        ptr: ValueId,
        index: ValueId,
        static_dims: DimVec,
        cur_dims: DimVec,
    ) -> ValueId {
        let ty = self.module.types.pointer_to(base_ty);
        let inst = self.module.new_inst_with_extra(
            ValueKind::GetElementPtr,
            ty,
            InstExtra::Gep {
                base_ty,
                static_dims,
                cur_dims,
            },
        );
        self.module.add_operand(inst, ptr);
        self.module.add_operand(inst, index);
        self.insert(inst)
    }

    /// Fill `len` bytes at `ptr` with `byte`.
    pub fn make_memset(&mut self, ptr: ValueId, byte: ValueId, len: ValueId) -> ValueId {
        let ty = self.module.types.void();
        let inst = self.module.new_orphan_inst(ValueKind::Memset, ty);
        self.module.add_operand(inst, ptr);
        self.module.add_operand(inst, byte);
        self.module.add_operand(inst, len);
        self.insert(inst)
    }

    /// Call a function value with arguments.
    pub fn make_call(&mut self, callee: ValueId, args: &[ValueId]) -> ValueId {
        let callee_ty = self.module.ty(callee);
        let ty = self
            .module
            .types
            .return_type(callee_ty)
            .unwrap_or_else(|| self.module.types.undef());
        let inst = self.module.new_orphan_inst(ValueKind::Call, ty);
        self.module.add_operand(inst, callee);
        for &arg in args {
            self.module.add_operand(inst, arg);
        }
        self.insert(inst)
    }

    /// Phi with incoming `(value, predecessor)` pairs.
    pub fn make_phi(&mut self, ty: TypeId, incoming: &[(ValueId, ValueId)]) -> ValueId {
        let inst = self.module.new_orphan_inst(ValueKind::Phi, ty);
        for &(value, block) in incoming {
            self.module.phi_add_incoming(inst, value, block);
        }
        self.insert(inst)
    }

    // =========================================================================
    // Terminators
    // =========================================================================

    /// Unconditional branch. Refuses (returns `None`, block untouched) if
    /// the current block already has a terminator.
    pub fn make_br(&mut self, target: ValueId) -> Option<ValueId> {
        if self.block_is_terminated() {
            return None;
        }
        let ty = self.module.types.void();
        let inst = self.module.new_orphan_inst(ValueKind::Br, ty);
        self.module.add_operand(inst, target);
        Some(self.insert(inst))
    }

    /// Conditional branch on an i1. Refuses like [`Builder::make_br`].
    pub fn make_cond_br(
        &mut self,
        cond: ValueId,
        then_block: ValueId,
        else_block: ValueId,
    ) -> Option<ValueId> {
        if self.block_is_terminated() {
            return None;
        }
        let ty = self.module.types.void();
        let inst = self.module.new_orphan_inst(ValueKind::CondBr, ty);
        self.module.add_operand(inst, cond);
        self.module.add_operand(inst, then_block);
        self.module.add_operand(inst, else_block);
        Some(self.insert(inst))
    }

    /// Return, with or without a value. Refuses like [`Builder::make_br`].
    pub fn make_return(&mut self, value: Option<ValueId>) -> Option<ValueId> {
        if self.block_is_terminated() {
            return None;
        }
        let ty = self.module.types.void();
        let inst = self.module.new_orphan_inst(ValueKind::Ret, ty);
        if let Some(value) = value {
            self.module.add_operand(inst, value);
        }
        Some(self.insert(inst))
    }

    // =========================================================================
    // Type promotion
    // =========================================================================

    /// Coerce `value` to i1 by comparing against zero. Bool values pass
    /// through unchanged.
    pub fn cast_to_bool(&mut self, value: ValueId) -> ValueId {
        let ty = self.module.ty(value);
        if self.module.types.is_bool(ty) {
            return value;
        }
        if self.module.types.is_float(ty) {
            let zero = self.module.const_float(ty, 0.0);
            return self.make_cmp(ValueKind::FcmpOne, value, zero);
        }
        let zero = self.module.const_int(ty, 0);
        self.make_cmp(ValueKind::IcmpNe, value, zero)
    }

    /// Promote `value` to `target` with the minimal cast among
    /// {`Zext`, `Sext`, `Trunc`, `FpTrunc`, `SiToFp`, `FpToSi`}.
    ///
    /// Constants are converted in the constant domain without emitting an
    /// instruction. Promotions outside the table (e.g. float widening,
    /// pointer casts) return the value unchanged.
    pub fn promote_type(&mut self, value: ValueId, target: TypeId) -> ValueId {
        let src = self.module.ty(value);
        if src == target {
            return value;
        }

        if let Some(data) = self.module.const_data(value) {
            if let Some(folded) = self.promote_constant(data, target) {
                return folded;
            }
        }

        let src_kind = self.module.types.kind(src).clone();
        let dst_kind = self.module.types.kind(target).clone();
        let src_size = self.module.types.size_of(src);
        let dst_size = self.module.types.size_of(target);

        match (src_kind.is_int(), dst_kind.is_int()) {
            (true, true) => {
                if matches!(src_kind, TypeKind::Bool) {
                    self.make_unary(ValueKind::Zext, value, target)
                } else if src_size < dst_size {
                    self.make_unary(ValueKind::Sext, value, target)
                } else {
                    self.make_unary(ValueKind::Trunc, value, target)
                }
            }
            (true, false) if dst_kind.is_float() => {
                self.make_unary(ValueKind::SiToFp, value, target)
            }
            (false, true) if src_kind.is_float() => {
                self.make_unary(ValueKind::FpToSi, value, target)
            }
            (false, false) if src_kind.is_float() && dst_kind.is_float() => {
                if src_size > dst_size {
                    self.make_unary(ValueKind::FpTrunc, value, target)
                } else {
                    value
                }
            }
            _ => value,
        }
    }

    fn promote_constant(&mut self, data: ConstData, target: TypeId) -> Option<ValueId> {
        let dst = self.module.types.kind(target).clone();
        let int_val = match data {
            ConstData::Bool(b) => Some(b as i64),
            ConstData::Int(v) => Some(v),
            ConstData::Float(bits) => Some(f64::from_bits(bits) as i64),
            ConstData::Undef => None,
        };
        let float_val = match data {
            ConstData::Bool(b) => Some(b as i64 as f64),
            ConstData::Int(v) => Some(v as f64),
            ConstData::Float(bits) => Some(f64::from_bits(bits)),
            ConstData::Undef => None,
        };
        match dst {
            TypeKind::Bool => int_val.map(|v| self.module.const_bool(v != 0)),
            // Integer payloads wrap to the target width.
            TypeKind::Int8 => int_val.map(|v| self.module.const_int(target, v as i8 as i64)),
            TypeKind::Int32 => int_val.map(|v| self.module.const_int(target, v as i32 as i64)),
            TypeKind::Int64 => int_val.map(|v| self.module.const_int(target, v)),
            TypeKind::Float32 => float_val.map(|v| self.module.const_float(target, v as f32 as f64)),
            TypeKind::Float64 => float_val.map(|v| self.module.const_float(target, v)),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Module, ValueId, ValueId) {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        (m, f, entry)
    }

    #[test]
    fn test_factory_inserts_in_order() {
        let (mut m, _, entry) = setup();
        let i32_ty = m.types.int32();
        let one = m.const_int(i32_ty, 1);
        let two = m.const_int(i32_ty, 2);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let add = b.make_binary(ValueKind::Add, one, two);
        let mul = b.make_binary(ValueKind::Mul, add, two);
        b.make_return(Some(mul)).unwrap();

        let insts: Vec<ValueId> = m.insts(entry).collect();
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[0], add);
        assert_eq!(insts[1], mul);
        assert_eq!(m.kind(insts[2]), ValueKind::Ret);
    }

    #[test]
    fn test_orphan_without_position() {
        let (mut m, _, _) = setup();
        let i32_ty = m.types.int32();
        let one = m.const_int(i32_ty, 1);

        let mut b = Builder::new(&mut m);
        let add = b.make_binary(ValueKind::Add, one, one);
        assert!(m.inst_block(add).is_none());
    }

    #[test]
    fn test_terminator_refusal() {
        let (mut m, _, entry) = setup();
        let i32_ty = m.types.int32();
        let zero = m.const_int(i32_ty, 0);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        assert!(b.make_return(Some(zero)).is_some());
        // Second terminator is refused; the block keeps exactly one.
        assert!(b.make_return(Some(zero)).is_none());
        assert_eq!(m.insts(entry).count(), 1);
    }

    #[test]
    fn test_insert_before_advances() {
        let (mut m, _, entry) = setup();
        let i32_ty = m.types.int32();
        let one = m.const_int(i32_ty, 1);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let last = b.make_binary(ValueKind::Add, one, one);

        // Insert two instructions before `last`; they stay in emission order.
        b.set_pos(entry, InsertAt::Before(last));
        let first = b.make_binary(ValueKind::Sub, one, one);
        let second = b.make_binary(ValueKind::Mul, one, one);

        let insts: Vec<ValueId> = m.insts(entry).collect();
        assert_eq!(insts, vec![first, second, last]);
    }

    #[test]
    fn test_loop_and_tf_stacks() {
        let (mut m, f, _) = setup();
        let header = m.new_block(f);
        let exit = m.new_block(f);

        let mut b = Builder::new(&mut m);
        assert!(b.header().is_none());
        b.push_loop(header, exit);
        assert_eq!(b.header(), Some(header));
        assert_eq!(b.exit(), Some(exit));
        b.pop_loop();
        assert!(b.exit().is_none());

        b.push_tf(header, exit);
        assert_eq!(b.true_target(), Some(header));
        assert_eq!(b.false_target(), Some(exit));
        b.pop_tf();
        assert!(b.true_target().is_none());
    }

    #[test]
    fn test_cast_to_bool() {
        let (mut m, _, entry) = setup();
        let i32_ty = m.types.int32();
        let f32_ty = m.types.float32();
        let n = m.new_orphan_inst(ValueKind::Load, i32_ty);
        let x = m.new_orphan_inst(ValueKind::Load, f32_ty);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);

        let nb = b.cast_to_bool(n);
        assert_eq!(b.module().kind(nb), ValueKind::IcmpNe);
        let xb = b.cast_to_bool(x);
        assert_eq!(b.module().kind(xb), ValueKind::FcmpOne);

        let t = m.const_bool(true);
        let mut b = Builder::new(&mut m);
        assert_eq!(b.cast_to_bool(t), t);
    }

    #[test]
    fn test_promote_constant_folds() {
        let (mut m, _, entry) = setup();
        let i32_ty = m.types.int32();
        let f32_ty = m.types.float32();
        let three = m.const_int(i32_ty, 3);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let promoted = b.promote_type(three, f32_ty);

        // Folded in the constant domain: no instruction emitted.
        assert_eq!(m.const_data(promoted).unwrap().as_float(), Some(3.0));
        assert_eq!(m.insts(entry).count(), 0);
    }

    #[test]
    fn test_promote_inserts_cast() {
        let (mut m, _, entry) = setup();
        let i32_ty = m.types.int32();
        let i64_ty = m.types.int64();
        let f32_ty = m.types.float32();
        let v = m.new_orphan_inst(ValueKind::Load, i32_ty);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);

        let widened = b.promote_type(v, i64_ty);
        assert_eq!(b.module().kind(widened), ValueKind::Sext);

        let floated = b.promote_type(v, f32_ty);
        assert_eq!(b.module().kind(floated), ValueKind::SiToFp);

        let narrowed = b.promote_type(widened, i32_ty);
        assert_eq!(m.kind(narrowed), ValueKind::Trunc);
    }
}
