//! Instruction payloads and operand conventions.
//!
//! The kind tag (`ValueKind`) carries the opcode; this module adds the
//! per-instruction payload (list threading plus any opcode-specific data)
//! and the module-level constructors that wire operands.
//!
//! Operand conventions:
//!
//! | opcode          | operands                     |
//! |-----------------|------------------------------|
//! | `Ret`           | `[]` or `[value]`            |
//! | `Br`            | `[target]`                   |
//! | `CondBr`        | `[cond, then, else]`         |
//! | `Load`          | `[ptr]`                      |
//! | `Store`         | `[value, ptr]`               |
//! | `GetElementPtr` | `[ptr, index]`               |
//! | `Memset`        | `[ptr, byte, len]`           |
//! | `Call`          | `[callee, args…]`            |
//! | `Phi`           | `[v0, b0, v1, b1, …]`        |
//! | binary / cmp    | `[lhs, rhs]`                 |
//! | unary / cast    | `[operand]`                  |

use super::module::Module;
use super::types::{DimVec, TypeId};
use super::value::{Value, ValueData, ValueId, ValueKind};

// =============================================================================
// Payload
// =============================================================================

/// Opcode-specific payload.
#[derive(Debug, Clone)]
pub enum InstExtra {
    None,
    Alloca {
        pointee: TypeId,
        is_const: bool,
    },
    Gep {
        base_ty: TypeId,
        static_dims: DimVec,
        cur_dims: DimVec,
    },
}

/// Per-instruction data: intrusive list threading plus payload.
///
/// `block` is `INVALID` while the instruction is detached (an orphan).
#[derive(Debug, Clone)]
pub struct InstData {
    pub block: ValueId,
    pub prev: ValueId,
    pub next: ValueId,
    pub extra: InstExtra,
}

impl InstData {
    pub(crate) fn detached(extra: InstExtra) -> Self {
        InstData {
            block: ValueId::INVALID,
            prev: ValueId::INVALID,
            next: ValueId::INVALID,
            extra,
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

impl Module {
    /// Allocate a detached instruction with no operands. The builder (or a
    /// pass) wires operands and splices it into a block.
    pub fn new_orphan_inst(&mut self, kind: ValueKind, ty: TypeId) -> ValueId {
        debug_assert!(kind.is_inst());
        self.values.alloc(Value::new(
            ty,
            kind,
            ValueData::Inst(InstData::detached(InstExtra::None)),
        ))
    }

    pub(crate) fn new_inst_with_extra(
        &mut self,
        kind: ValueKind,
        ty: TypeId,
        extra: InstExtra,
    ) -> ValueId {
        debug_assert!(kind.is_inst());
        self.values.alloc(Value::new(
            ty,
            kind,
            ValueData::Inst(InstData::detached(extra)),
        ))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The per-instruction data. Panics if `v` is not an instruction.
    #[inline]
    pub fn inst(&self, v: ValueId) -> &InstData {
        match &self.values[v].data {
            ValueData::Inst(data) => data,
            _ => panic!("{:?} is not an instruction", v),
        }
    }

    #[inline]
    pub(crate) fn inst_mut(&mut self, v: ValueId) -> &mut InstData {
        match &mut self.values[v].data {
            ValueData::Inst(data) => data,
            _ => panic!("{:?} is not an instruction", v),
        }
    }

    /// The block holding `inst`, or `None` for orphans.
    pub fn inst_block(&self, inst: ValueId) -> Option<ValueId> {
        let b = self.inst(inst).block;
        b.is_valid().then_some(b)
    }

    /// Whether `v` is an instruction value.
    #[inline]
    pub fn is_inst(&self, v: ValueId) -> bool {
        self.values[v].kind.is_inst()
    }

    /// Condition of a `CondBr`.
    pub fn cond_of(&self, br: ValueId) -> ValueId {
        debug_assert_eq!(self.values[br].kind, ValueKind::CondBr);
        self.operand(br, 0)
    }

    /// Branch targets of a terminator (0, 1, or 2 blocks).
    pub fn branch_targets(&self, term: ValueId) -> Vec<ValueId> {
        match self.values[term].kind {
            ValueKind::Br => vec![self.operand(term, 0)],
            ValueKind::CondBr => vec![self.operand(term, 1), self.operand(term, 2)],
            _ => Vec::new(),
        }
    }

    /// Callee of a `Call`.
    pub fn callee_of(&self, call: ValueId) -> ValueId {
        debug_assert_eq!(self.values[call].kind, ValueKind::Call);
        self.operand(call, 0)
    }

    /// Argument operands of a `Call`.
    pub fn call_args(&self, call: ValueId) -> &[ValueId] {
        debug_assert_eq!(self.values[call].kind, ValueKind::Call);
        &self.values[call].operands[1..]
    }

    /// Incoming `(value, block)` pairs of a `Phi`.
    pub fn phi_incoming(&self, phi: ValueId) -> Vec<(ValueId, ValueId)> {
        debug_assert_eq!(self.values[phi].kind, ValueKind::Phi);
        self.values[phi]
            .operands
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// Append an incoming `(value, block)` pair to a `Phi`.
    pub fn phi_add_incoming(&mut self, phi: ValueId, value: ValueId, block: ValueId) {
        debug_assert_eq!(self.values[phi].kind, ValueKind::Phi);
        self.add_operand(phi, value);
        self.add_operand(phi, block);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orphan_inst() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let add = m.new_orphan_inst(ValueKind::Add, i32_ty);

        assert!(m.is_inst(add));
        assert!(m.inst_block(add).is_none());
    }

    #[test]
    fn test_phi_incoming() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let b0 = m.new_block(f);
        let b1 = m.new_block(f);

        let c0 = m.const_int(i32_ty, 0);
        let c1 = m.const_int(i32_ty, 1);
        let phi = m.new_orphan_inst(ValueKind::Phi, i32_ty);
        m.phi_add_incoming(phi, c0, b0);
        m.phi_add_incoming(phi, c1, b1);

        assert_eq!(m.phi_incoming(phi), vec![(c0, b0), (c1, b1)]);
    }
}
