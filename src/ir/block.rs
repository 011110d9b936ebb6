//! Basic blocks: instruction sequencing and CFG edges.
//!
//! A block threads its instructions through an intrusive doubly linked
//! list (`InstData::prev`/`next`), giving O(1) insertion and removal at
//! any position. Successors are derived from the block's terminator;
//! predecessors are derived from the block value's use-list, so neither
//! edge set is stored redundantly.

use super::module::Module;
use super::value::{ValueId, ValueKind};
use smallvec::SmallVec;

// =============================================================================
// Block payload
// =============================================================================

/// Per-block data. Blocks belong to exactly one function.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub func: ValueId,
    pub first: ValueId,
    pub last: ValueId,
}

impl BlockData {
    pub(crate) fn new(func: ValueId) -> Self {
        BlockData {
            func,
            first: ValueId::INVALID,
            last: ValueId::INVALID,
        }
    }
}

// =============================================================================
// Instruction list
// =============================================================================

/// Forward iterator over a block's instructions.
pub struct InstIter<'a> {
    module: &'a Module,
    cur: ValueId,
}

impl Iterator for InstIter<'_> {
    type Item = ValueId;

    fn next(&mut self) -> Option<ValueId> {
        if !self.cur.is_valid() {
            return None;
        }
        let id = self.cur;
        self.cur = self.module.inst(id).next;
        Some(id)
    }
}

impl Module {
    /// The per-block data. Panics if `v` is not a block.
    #[inline]
    pub fn block(&self, v: ValueId) -> &BlockData {
        match &self.values[v].data {
            super::value::ValueData::Block(data) => data,
            _ => panic!("{:?} is not a block", v),
        }
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, v: ValueId) -> &mut BlockData {
        match &mut self.values[v].data {
            super::value::ValueData::Block(data) => data,
            _ => panic!("{:?} is not a block", v),
        }
    }

    /// Whether `v` is a block value.
    #[inline]
    pub fn is_block(&self, v: ValueId) -> bool {
        self.values[v].kind == ValueKind::Block
    }

    /// First instruction, if any.
    pub fn first_inst(&self, block: ValueId) -> Option<ValueId> {
        let f = self.block(block).first;
        f.is_valid().then_some(f)
    }

    /// Last instruction, if any.
    pub fn last_inst(&self, block: ValueId) -> Option<ValueId> {
        let l = self.block(block).last;
        l.is_valid().then_some(l)
    }

    /// Iterate the block's instructions in order.
    pub fn insts(&self, block: ValueId) -> InstIter<'_> {
        InstIter {
            module: self,
            cur: self.block(block).first,
        }
    }

    /// Append `inst` at the end of `block`.
    pub fn append_inst(&mut self, block: ValueId, inst: ValueId) {
        debug_assert!(!self.inst(inst).block.is_valid(), "instruction already placed");
        let last = self.block(block).last;
        {
            let data = self.inst_mut(inst);
            data.block = block;
            data.prev = last;
            data.next = ValueId::INVALID;
        }
        if last.is_valid() {
            self.inst_mut(last).next = inst;
        } else {
            self.block_mut(block).first = inst;
        }
        self.block_mut(block).last = inst;
    }

    /// Insert `inst` immediately before `before`, which must be placed.
    pub fn insert_inst_before(&mut self, before: ValueId, inst: ValueId) {
        debug_assert!(!self.inst(inst).block.is_valid(), "instruction already placed");
        let block = self.inst(before).block;
        debug_assert!(block.is_valid(), "anchor instruction is an orphan");
        let prev = self.inst(before).prev;
        {
            let data = self.inst_mut(inst);
            data.block = block;
            data.prev = prev;
            data.next = before;
        }
        self.inst_mut(before).prev = inst;
        if prev.is_valid() {
            self.inst_mut(prev).next = inst;
        } else {
            self.block_mut(block).first = inst;
        }
    }

    /// Unlink `inst` from its block. The instruction becomes an orphan;
    /// its operands and uses are untouched and the arena still owns it.
    pub fn detach_inst(&mut self, inst: ValueId) {
        let (block, prev, next) = {
            let data = self.inst(inst);
            (data.block, data.prev, data.next)
        };
        if !block.is_valid() {
            return;
        }
        if prev.is_valid() {
            self.inst_mut(prev).next = next;
        } else {
            self.block_mut(block).first = next;
        }
        if next.is_valid() {
            self.inst_mut(next).prev = prev;
        } else {
            self.block_mut(block).last = prev;
        }
        let data = self.inst_mut(inst);
        data.block = ValueId::INVALID;
        data.prev = ValueId::INVALID;
        data.next = ValueId::INVALID;
    }

    // =========================================================================
    // CFG edges
    // =========================================================================

    /// The block's terminator, if its last instruction is one.
    pub fn terminator(&self, block: ValueId) -> Option<ValueId> {
        let last = self.last_inst(block)?;
        self.values[last].kind.is_terminator().then_some(last)
    }

    /// Successor blocks, from the terminator's targets.
    pub fn successors(&self, block: ValueId) -> SmallVec<[ValueId; 2]> {
        let mut out = SmallVec::new();
        if let Some(term) = self.terminator(block) {
            for target in self.branch_targets(term) {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        out
    }

    /// Predecessor blocks, from branch uses of this block value. Phi
    /// references do not create edges.
    pub fn predecessors(&self, block: ValueId) -> Vec<ValueId> {
        let mut out = Vec::new();
        for u in &self.values[block].uses {
            let kind = self.values[u.user].kind;
            if !(kind == ValueKind::Br || kind == ValueKind::CondBr) {
                continue;
            }
            // Br operand 0 is a target; CondBr targets are operands 1 and 2.
            if kind == ValueKind::CondBr && u.index == 0 {
                continue;
            }
            if let Some(pred) = self.inst_block(u.user) {
                if !out.contains(&pred) {
                    out.push(pred);
                }
            }
        }
        out
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn one_block() -> (Module, ValueId, ValueId) {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let b = m.new_block(f);
        (m, f, b)
    }

    #[test]
    fn test_append_and_iterate() {
        let (mut m, _, b) = one_block();
        let i32_ty = m.types.int32();
        let i1 = m.new_orphan_inst(ValueKind::Add, i32_ty);
        let i2 = m.new_orphan_inst(ValueKind::Mul, i32_ty);
        m.append_inst(b, i1);
        m.append_inst(b, i2);

        assert_eq!(m.insts(b).collect::<Vec<_>>(), vec![i1, i2]);
        assert_eq!(m.first_inst(b), Some(i1));
        assert_eq!(m.last_inst(b), Some(i2));
        assert_eq!(m.inst_block(i1), Some(b));
    }

    #[test]
    fn test_insert_before() {
        let (mut m, _, b) = one_block();
        let i32_ty = m.types.int32();
        let i1 = m.new_orphan_inst(ValueKind::Add, i32_ty);
        let i2 = m.new_orphan_inst(ValueKind::Mul, i32_ty);
        let i3 = m.new_orphan_inst(ValueKind::Sub, i32_ty);
        m.append_inst(b, i1);
        m.append_inst(b, i2);
        m.insert_inst_before(i2, i3);

        assert_eq!(m.insts(b).collect::<Vec<_>>(), vec![i1, i3, i2]);

        let i4 = m.new_orphan_inst(ValueKind::SDiv, i32_ty);
        m.insert_inst_before(i1, i4);
        assert_eq!(m.first_inst(b), Some(i4));
    }

    #[test]
    fn test_detach() {
        let (mut m, _, b) = one_block();
        let i32_ty = m.types.int32();
        let i1 = m.new_orphan_inst(ValueKind::Add, i32_ty);
        let i2 = m.new_orphan_inst(ValueKind::Mul, i32_ty);
        m.append_inst(b, i1);
        m.append_inst(b, i2);

        m.detach_inst(i1);
        assert_eq!(m.insts(b).collect::<Vec<_>>(), vec![i2]);
        assert!(m.inst_block(i1).is_none());

        m.detach_inst(i2);
        assert!(m.first_inst(b).is_none());
        assert!(m.last_inst(b).is_none());
    }

    #[test]
    fn test_cfg_edges() {
        let (mut m, f, b0) = one_block();
        let b1 = m.new_block(f);
        let b2 = m.new_block(f);
        let void_ty = m.types.void();

        let cond = m.const_bool(true);
        let br = m.new_orphan_inst(ValueKind::CondBr, void_ty);
        m.add_operand(br, cond);
        m.add_operand(br, b1);
        m.add_operand(br, b2);
        m.append_inst(b0, br);

        assert_eq!(m.terminator(b0), Some(br));
        assert_eq!(m.successors(b0).as_slice(), &[b1, b2]);
        assert_eq!(m.predecessors(b1), vec![b0]);
        assert_eq!(m.predecessors(b2), vec![b0]);
        assert!(m.predecessors(b0).is_empty());
    }
}
