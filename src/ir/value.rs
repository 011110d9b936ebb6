//! Values, kind tags, and the def–use graph.
//!
//! Every SSA object — constants, arguments, globals, blocks, functions,
//! and instructions — is a `Value` in the module arena. A value records
//! its type, a dense kind tag, an optional symbolic name and comment, its
//! operand slots, and the list of `Use`s pointing back at it.
//!
//! The def–use invariants maintained here:
//! 1. for every `Use { user, index }` in `v.uses`,
//!    `module.operand(user, index) == v`
//! 2. for every operand slot `(user, i)` holding `v`, a matching `Use`
//!    appears in `v.uses`
//!
//! Operand slots may hold `ValueId::INVALID` only transiently during
//! construction; the verifier rejects any that survive.

use super::arena::Id;
use super::block::BlockData;
use super::function::FuncData;
use super::global::GlobalData;
use super::inst::InstData;
use super::module::Module;
use super::types::TypeId;

/// Handle to a value in the module arena.
pub type ValueId = Id<Value>;

// =============================================================================
// Kind Tag
// =============================================================================

/// Dense runtime tag for every value kind.
///
/// Discriminants are grouped into numeric families with gaps between them,
/// so family membership ("is a terminator", "is an integer comparison") is
/// a single range compare on the raw tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ValueKind {
    // Non-instruction values.
    Constant = 0,
    Argument = 1,
    Global = 2,
    Block = 3,
    Function = 4,

    // Memory instructions: 16..=20.
    Alloca = 16,
    Load = 17,
    Store = 18,
    GetElementPtr = 19,
    Memset = 20,

    // Terminators: 32..=34.
    Ret = 32,
    Br = 33,
    CondBr = 34,

    // Control-transfer values: 48..=49.
    Call = 48,
    Phi = 49,

    // Integer comparisons (signed): 64..=69.
    IcmpEq = 64,
    IcmpNe = 65,
    IcmpSgt = 66,
    IcmpSge = 67,
    IcmpSlt = 68,
    IcmpSle = 69,

    // Float comparisons (ordered): 80..=85.
    FcmpOeq = 80,
    FcmpOne = 81,
    FcmpOgt = 82,
    FcmpOge = 83,
    FcmpOlt = 84,
    FcmpOle = 85,

    // Unary operations and casts: 96..=105.
    FNeg = 96,
    Trunc = 97,
    Zext = 98,
    Sext = 99,
    FpTrunc = 100,
    FpToSi = 101,
    SiToFp = 102,
    BitCast = 103,
    PtrToInt = 104,
    IntToPtr = 105,

    // Binary arithmetic: 112..=123.
    Add = 112,
    FAdd = 113,
    Sub = 114,
    FSub = 115,
    Mul = 116,
    FMul = 117,
    UDiv = 118,
    SDiv = 119,
    FDiv = 120,
    URem = 121,
    SRem = 122,
    FRem = 123,
}

impl ValueKind {
    /// Whether this tag names an instruction.
    #[inline]
    pub const fn is_inst(self) -> bool {
        self as u16 >= 16
    }

    /// Whether this instruction ends a block.
    #[inline]
    pub const fn is_terminator(self) -> bool {
        let t = self as u16;
        t >= 32 && t <= 34
    }

    /// Whether this is a memory instruction.
    #[inline]
    pub const fn is_memory(self) -> bool {
        let t = self as u16;
        t >= 16 && t <= 20
    }

    /// Whether this is an integer comparison.
    #[inline]
    pub const fn is_icmp(self) -> bool {
        let t = self as u16;
        t >= 64 && t <= 69
    }

    /// Whether this is a float comparison.
    #[inline]
    pub const fn is_fcmp(self) -> bool {
        let t = self as u16;
        t >= 80 && t <= 85
    }

    /// Whether this is any comparison.
    #[inline]
    pub const fn is_cmp(self) -> bool {
        self.is_icmp() || self.is_fcmp()
    }

    /// Whether this is a unary operation or cast.
    #[inline]
    pub const fn is_unary(self) -> bool {
        let t = self as u16;
        t >= 96 && t <= 105
    }

    /// Whether this is a type cast (unary family minus `FNeg`).
    #[inline]
    pub const fn is_cast(self) -> bool {
        let t = self as u16;
        t >= 97 && t <= 105
    }

    /// Whether this is a binary arithmetic operation.
    #[inline]
    pub const fn is_binary(self) -> bool {
        let t = self as u16;
        t >= 112 && t <= 123
    }

    /// Whether this binary/compare operates on floats.
    #[inline]
    pub const fn is_float_op(self) -> bool {
        matches!(
            self,
            ValueKind::FAdd
                | ValueKind::FSub
                | ValueKind::FMul
                | ValueKind::FDiv
                | ValueKind::FRem
                | ValueKind::FNeg
        ) || self.is_fcmp()
    }

    /// Mnemonic used by the textual dump.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            ValueKind::Constant => "const",
            ValueKind::Argument => "arg",
            ValueKind::Global => "global",
            ValueKind::Block => "block",
            ValueKind::Function => "function",
            ValueKind::Alloca => "alloca",
            ValueKind::Load => "load",
            ValueKind::Store => "store",
            ValueKind::GetElementPtr => "getelementptr",
            ValueKind::Memset => "memset",
            ValueKind::Ret => "ret",
            ValueKind::Br => "br",
            ValueKind::CondBr => "br",
            ValueKind::Call => "call",
            ValueKind::Phi => "phi",
            ValueKind::IcmpEq => "icmp eq",
            ValueKind::IcmpNe => "icmp ne",
            ValueKind::IcmpSgt => "icmp sgt",
            ValueKind::IcmpSge => "icmp sge",
            ValueKind::IcmpSlt => "icmp slt",
            ValueKind::IcmpSle => "icmp sle",
            ValueKind::FcmpOeq => "fcmp oeq",
            ValueKind::FcmpOne => "fcmp one",
            ValueKind::FcmpOgt => "fcmp ogt",
            ValueKind::FcmpOge => "fcmp oge",
            ValueKind::FcmpOlt => "fcmp olt",
            ValueKind::FcmpOle => "fcmp ole",
            ValueKind::FNeg => "fneg",
            ValueKind::Trunc => "trunc",
            ValueKind::Zext => "zext",
            ValueKind::Sext => "sext",
            ValueKind::FpTrunc => "fptrunc",
            ValueKind::FpToSi => "fptosi",
            ValueKind::SiToFp => "sitofp",
            ValueKind::BitCast => "bitcast",
            ValueKind::PtrToInt => "ptrtoint",
            ValueKind::IntToPtr => "inttoptr",
            ValueKind::Add => "add",
            ValueKind::FAdd => "fadd",
            ValueKind::Sub => "sub",
            ValueKind::FSub => "fsub",
            ValueKind::Mul => "mul",
            ValueKind::FMul => "fmul",
            ValueKind::UDiv => "udiv",
            ValueKind::SDiv => "sdiv",
            ValueKind::FDiv => "fdiv",
            ValueKind::URem => "urem",
            ValueKind::SRem => "srem",
            ValueKind::FRem => "frem",
        }
    }
}

// =============================================================================
// Use
// =============================================================================

/// One def→use edge: operand slot `index` of `user` holds the value whose
/// use-list this record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    /// The consuming value.
    pub user: ValueId,
    /// The operand slot within the user.
    pub index: u32,
}

// =============================================================================
// Constant payload
// =============================================================================

/// Payload of a `Constant` value. Floats are stored as raw bits so the
/// per-module constant pool can key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstData {
    Bool(bool),
    Int(i64),
    /// `f32`/`f64` bits; the value's type disambiguates.
    Float(u64),
    Undef,
}

impl ConstData {
    /// Integer payload, if this is an integer or bool constant.
    #[inline]
    pub fn as_int(self) -> Option<i64> {
        match self {
            ConstData::Int(v) => Some(v),
            ConstData::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    /// Float payload, if this is a float constant.
    #[inline]
    pub fn as_float(self) -> Option<f64> {
        match self {
            ConstData::Float(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// Kind-specific payload.
#[derive(Debug, Clone)]
pub enum ValueData {
    Constant(ConstData),
    Argument { index: u32, func: ValueId },
    Global(GlobalData),
    Block(BlockData),
    Function(FuncData),
    Inst(InstData),
}

/// An SSA object in the module arena.
///
/// Immutable except for its name, comment, operand slots, and use-list.
#[derive(Debug, Clone)]
pub struct Value {
    /// The value's type.
    pub ty: TypeId,
    /// Dense kind tag.
    pub kind: ValueKind,
    /// Optional symbolic name.
    pub name: Option<String>,
    /// Optional comment carried into the dump.
    pub comment: Option<String>,
    /// Incoming def→use edges.
    pub uses: Vec<Use>,
    /// Ordered operand slots.
    pub operands: Vec<ValueId>,
    /// Kind-specific payload.
    pub data: ValueData,
}

impl Value {
    pub(crate) fn new(ty: TypeId, kind: ValueKind, data: ValueData) -> Self {
        Value {
            ty,
            kind,
            name: None,
            comment: None,
            uses: Vec::new(),
            operands: Vec::new(),
            data,
        }
    }

    /// Number of operand slots.
    #[inline]
    pub fn num_operands(&self) -> usize {
        self.operands.len()
    }
}

// =============================================================================
// Def–use operations
// =============================================================================

impl Module {
    /// Operand `i` of `user`. Panics if `i` is out of range.
    #[inline]
    pub fn operand(&self, user: ValueId, i: usize) -> ValueId {
        self.values[user].operands[i]
    }

    /// All operand slots of `user`.
    #[inline]
    pub fn operands(&self, user: ValueId) -> &[ValueId] {
        &self.values[user].operands
    }

    /// Snapshot of a value's use-list. The copy tolerates the underlying
    /// list being rewritten mid-iteration (e.g. by
    /// `replace_all_uses_with`).
    pub fn uses_of(&self, value: ValueId) -> Vec<Use> {
        self.values[value].uses.clone()
    }

    /// Number of recorded uses.
    #[inline]
    pub fn num_uses(&self, value: ValueId) -> usize {
        self.values[value].uses.len()
    }

    /// Append an operand slot to `user` and record the matching use.
    pub fn add_operand(&mut self, user: ValueId, value: ValueId) {
        let index = self.values[user].operands.len() as u32;
        self.values[user].operands.push(value);
        if value.is_valid() {
            self.values[value].uses.push(Use { user, index });
        }
    }

    /// Rewire operand slot `i` of `user` to `value`, updating both
    /// use-lists. Panics if `i` is out of range.
    pub fn set_operand(&mut self, user: ValueId, i: usize, value: ValueId) {
        let old = self.values[user].operands[i];
        if old == value {
            return;
        }
        if old.is_valid() {
            self.unregister_use(old, user, i as u32);
        }
        self.values[user].operands[i] = value;
        if value.is_valid() {
            self.values[value].uses.push(Use {
                user,
                index: i as u32,
            });
        }
    }

    /// Delete operand slot `i` of `user`, renumbering the slots behind it
    /// and their recorded uses.
    pub fn remove_operand(&mut self, user: ValueId, i: usize) {
        let old = self.values[user].operands.remove(i);
        if old.is_valid() {
            self.unregister_use(old, user, i as u32);
        }
        // Renumber trailing slots and refresh their use records.
        let tail: Vec<(usize, ValueId)> = self.values[user]
            .operands
            .iter()
            .copied()
            .enumerate()
            .skip(i)
            .collect();
        for (new_index, value) in tail {
            if !value.is_valid() {
                continue;
            }
            for u in self.values[value].uses.iter_mut() {
                if u.user == user && u.index == new_index as u32 + 1 {
                    u.index = new_index as u32;
                    break;
                }
            }
        }
    }

    /// Detach every use recorded for `user`'s operands without touching
    /// the operand vector. Call before discarding a user.
    pub fn unuse_all(&mut self, user: ValueId) {
        let slots: Vec<(u32, ValueId)> = self.values[user]
            .operands
            .iter()
            .copied()
            .enumerate()
            .map(|(i, v)| (i as u32, v))
            .collect();
        for (index, value) in slots {
            if value.is_valid() {
                self.unregister_use(value, user, index);
            }
        }
        for slot in self.values[user].operands.iter_mut() {
            *slot = ValueId::INVALID;
        }
    }

    /// Rewrite every use of `old` to refer to `new` in one pass. On
    /// return, `old.uses` is empty and `new.uses` has grown by the prior
    /// size of `old.uses`.
    ///
    /// Calling with `old == new` is a no-op; `new` must be a valid handle.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        assert!(new.is_valid(), "replacement value must be valid");
        if old == new {
            return;
        }
        let snapshot = std::mem::take(&mut self.values[old].uses);
        for u in snapshot {
            self.values[u.user].operands[u.index as usize] = new;
            self.values[new].uses.push(u);
        }
    }

    fn unregister_use(&mut self, value: ValueId, user: ValueId, index: u32) {
        let uses = &mut self.values[value].uses;
        if let Some(pos) = uses.iter().position(|u| u.user == user && u.index == index) {
            uses.swap_remove(pos);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
