//! Functions: block containers, arguments, attributes.

use super::block::BlockData;
use super::module::Module;
use super::types::TypeId;
use super::value::{Value, ValueData, ValueId, ValueKind};
use bitflags::bitflags;

bitflags! {
    /// Function attribute bitset.
    ///
    /// `ALIGNED_PARALLEL_BODY` and `INLINE_WRAPPED` are opaque metadata:
    /// the core carries and prints them but never interprets them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FuncAttrs: u32 {
        const NO_MEMORY_READ        = 1 << 0;
        const NO_MEMORY_WRITE       = 1 << 1;
        const NO_SIDE_EFFECT        = 1 << 2;
        const STATELESS             = 1 << 3;
        const NO_ALIAS              = 1 << 4;
        const NO_RETURN             = 1 << 5;
        const NO_RECURSE            = 1 << 6;
        const ENTRY                 = 1 << 7;
        const BUILTIN               = 1 << 8;
        const LOOP_BODY             = 1 << 9;
        const PARALLEL_BODY         = 1 << 10;
        const ALIGNED_PARALLEL_BODY = 1 << 11;
        const INLINE_WRAPPED        = 1 << 12;
    }
}

// =============================================================================
// Function payload
// =============================================================================

/// Per-function data. A function with no blocks is a declaration.
#[derive(Debug, Clone)]
pub struct FuncData {
    /// Blocks in insertion order.
    pub blocks: Vec<ValueId>,
    /// Arguments, one per parameter type.
    pub args: Vec<ValueId>,
    /// Distinguished entry block.
    pub entry: ValueId,
    /// Optional distinguished exit block collecting returns.
    pub exit: ValueId,
    /// Storage slot for early-return lowering, if the front-end uses one.
    pub ret_value_addr: ValueId,
    /// Attribute bitset.
    pub attrs: FuncAttrs,
    /// Cosmetic counter for local value renaming.
    pub var_cnt: u32,
    /// Cosmetic counter for block renaming.
    pub block_cnt: u32,
}

impl FuncData {
    fn new() -> Self {
        FuncData {
            blocks: Vec::new(),
            args: Vec::new(),
            entry: ValueId::INVALID,
            exit: ValueId::INVALID,
            ret_value_addr: ValueId::INVALID,
            attrs: FuncAttrs::empty(),
            var_cnt: 0,
            block_cnt: 0,
        }
    }
}

impl Module {
    /// Create a function with the given function type and register it in
    /// the module's name table.
    pub fn new_function(&mut self, fn_ty: TypeId, name: &str) -> ValueId {
        debug_assert!(self.types.kind(fn_ty).is_function());
        let mut value = Value::new(fn_ty, ValueKind::Function, ValueData::Function(FuncData::new()));
        value.name = Some(name.to_string());
        let id = self.values.alloc(value);
        self.funcs.push(id);
        self.func_table.insert(name.to_string(), id);
        id
    }

    /// The per-function data. Panics if `v` is not a function.
    #[inline]
    pub fn func(&self, v: ValueId) -> &FuncData {
        match &self.values[v].data {
            ValueData::Function(data) => data,
            _ => panic!("{:?} is not a function", v),
        }
    }

    #[inline]
    pub(crate) fn func_mut(&mut self, v: ValueId) -> &mut FuncData {
        match &mut self.values[v].data {
            ValueData::Function(data) => data,
            _ => panic!("{:?} is not a function", v),
        }
    }

    /// Whether `v` is a function value.
    #[inline]
    pub fn is_function(&self, v: ValueId) -> bool {
        self.values[v].kind == ValueKind::Function
    }

    /// Whether a function has no body.
    pub fn is_declaration(&self, func: ValueId) -> bool {
        self.func(func).blocks.is_empty()
    }

    /// Return type of a function value.
    pub fn func_return_type(&self, func: ValueId) -> TypeId {
        self.types
            .return_type(self.values[func].ty)
            .expect("function value with non-function type")
    }

    /// Append a fresh block to a function.
    pub fn new_block(&mut self, func: ValueId) -> ValueId {
        let label = self.types.label();
        let block = self
            .values
            .alloc(Value::new(label, ValueKind::Block, ValueData::Block(BlockData::new(func))));
        self.func_mut(func).blocks.push(block);
        block
    }

    /// Create a block and mark it as the function's entry.
    pub fn new_entry_block(&mut self, func: ValueId) -> ValueId {
        let block = self.new_block(func);
        self.func_mut(func).entry = block;
        block
    }

    /// Create a block and mark it as the function's exit.
    pub fn new_exit_block(&mut self, func: ValueId) -> ValueId {
        let block = self.new_block(func);
        self.func_mut(func).exit = block;
        block
    }

    /// The function's entry block, if set.
    pub fn entry_block(&self, func: ValueId) -> Option<ValueId> {
        let e = self.func(func).entry;
        e.is_valid().then_some(e)
    }

    /// The function's exit block, if set.
    pub fn exit_block(&self, func: ValueId) -> Option<ValueId> {
        let e = self.func(func).exit;
        e.is_valid().then_some(e)
    }

    /// Remove a block from its function's list. The block and its
    /// instructions stay in the arena.
    pub fn remove_block(&mut self, func: ValueId, block: ValueId) {
        let data = self.func_mut(func);
        data.blocks.retain(|&b| b != block);
        if data.entry == block {
            data.entry = ValueId::INVALID;
        }
        if data.exit == block {
            data.exit = ValueId::INVALID;
        }
    }

    /// Append an argument matching the next parameter slot.
    pub fn add_arg(&mut self, func: ValueId, ty: TypeId, name: Option<&str>) -> ValueId {
        let index = self.func(func).args.len() as u32;
        let mut value = Value::new(ty, ValueKind::Argument, ValueData::Argument { index, func });
        value.name = name.map(str::to_string);
        let id = self.values.alloc(value);
        self.func_mut(func).args.push(id);
        id
    }

    /// Recompute the function's type from its current argument list.
    /// Useful after a pass rewrites the signature.
    pub fn update_type_from_args(&mut self, func: ValueId) {
        let ret = self.func_return_type(func);
        let params: Vec<TypeId> = self
            .func(func)
            .args
            .iter()
            .map(|&a| self.values[a].ty)
            .collect();
        let new_ty = self.types.function(ret, params);
        self.values[func].ty = new_ty;
    }

    /// Set the early-return storage slot. May only be set once.
    pub fn set_ret_value_addr(&mut self, func: ValueId, addr: ValueId) {
        let data = self.func_mut(func);
        debug_assert!(!data.ret_value_addr.is_valid(), "return slot already set");
        data.ret_value_addr = addr;
    }
}

// =============================================================================
// Tests
// =============================================================================
