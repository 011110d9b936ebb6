//! The compilation unit.
//!
//! A `Module` owns the arena holding every IR object, the type context,
//! the ordered function and global lists, and the name lookup tables.
//! Removing an object from a container detaches it; nothing is freed
//! until the module itself is dropped.

use super::arena::Arena;
use super::types::{TypeCtx, TypeId};
use super::value::{ConstData, Value, ValueData, ValueId, ValueKind};
use rustc_hash::FxHashMap;

// =============================================================================
// Module
// =============================================================================

/// Top-level container for all IR constructs.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Interned types.
    pub types: TypeCtx,
    /// Arena of every value in the module.
    pub(crate) values: Arena<Value>,
    /// Functions in insertion order.
    pub(crate) funcs: Vec<ValueId>,
    /// Globals in insertion order.
    pub(crate) globals: Vec<ValueId>,
    /// Name → function lookup.
    pub(crate) func_table: FxHashMap<String, ValueId>,
    /// Name → global lookup.
    pub(crate) global_table: FxHashMap<String, ValueId>,
    /// Constant pool keyed by (type, payload).
    const_pool: FxHashMap<(TypeId, ConstData), ValueId>,
}

impl Module {
    /// Create an empty module.
    pub fn new() -> Self {
        Module {
            types: TypeCtx::new(),
            values: Arena::with_capacity(256),
            funcs: Vec::new(),
            globals: Vec::new(),
            func_table: FxHashMap::default(),
            global_table: FxHashMap::default(),
            const_pool: FxHashMap::default(),
        }
    }

    // =========================================================================
    // Value access
    // =========================================================================

    /// Read a value.
    #[inline]
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id]
    }

    /// The value's kind tag.
    #[inline]
    pub fn kind(&self, id: ValueId) -> ValueKind {
        self.values[id].kind
    }

    /// The value's type.
    #[inline]
    pub fn ty(&self, id: ValueId) -> TypeId {
        self.values[id].ty
    }

    /// Set a value's symbolic name.
    pub fn set_name(&mut self, id: ValueId, name: &str) {
        self.values[id].name = Some(name.to_string());
    }

    /// Set a value's comment.
    pub fn set_comment(&mut self, id: ValueId, comment: &str) {
        self.values[id].comment = Some(comment.to_string());
    }

    /// Append to a value's comment.
    pub fn add_comment(&mut self, id: ValueId, comment: &str) {
        match &mut self.values[id].comment {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(comment);
            }
            None => self.values[id].comment = Some(comment.to_string()),
        }
    }

    // =========================================================================
    // Containers
    // =========================================================================

    /// Functions in module order.
    #[inline]
    pub fn functions(&self) -> &[ValueId] {
        &self.funcs
    }

    /// Globals in module order.
    #[inline]
    pub fn global_vars(&self) -> &[ValueId] {
        &self.globals
    }

    /// Look up a function by name.
    pub fn find_function(&self, name: &str) -> Option<ValueId> {
        self.func_table.get(name).copied()
    }

    /// Look up a global by name.
    pub fn find_global(&self, name: &str) -> Option<ValueId> {
        self.global_table.get(name).copied()
    }

    /// The `main` function, if present.
    pub fn main_function(&self) -> Option<ValueId> {
        self.find_function("main")
    }

    /// Detach a function from the module. Arena storage is retained.
    pub fn remove_function(&mut self, func: ValueId) {
        self.funcs.retain(|&f| f != func);
        if let Some(name) = &self.values[func].name {
            if self.func_table.get(name) == Some(&func) {
                let name = name.clone();
                self.func_table.remove(&name);
            }
        }
    }

    /// Detach a global from the module. Arena storage is retained.
    pub fn remove_global(&mut self, global: ValueId) {
        self.globals.retain(|&g| g != global);
        if let Some(name) = &self.values[global].name {
            if self.global_table.get(name) == Some(&global) {
                let name = name.clone();
                self.global_table.remove(&name);
            }
        }
    }

    // =========================================================================
    // Constants
    // =========================================================================

    fn intern_const(&mut self, ty: TypeId, data: ConstData) -> ValueId {
        if let Some(&id) = self.const_pool.get(&(ty, data)) {
            return id;
        }
        let id = self
            .values
            .alloc(Value::new(ty, ValueKind::Constant, ValueData::Constant(data)));
        self.const_pool.insert((ty, data), id);
        id
    }

    /// Integer constant of the given integer type.
    pub fn const_int(&mut self, ty: TypeId, v: i64) -> ValueId {
        debug_assert!(self.types.is_int(ty));
        self.intern_const(ty, ConstData::Int(v))
    }

    /// Float constant of the given float type.
    pub fn const_float(&mut self, ty: TypeId, v: f64) -> ValueId {
        debug_assert!(self.types.is_float(ty));
        self.intern_const(ty, ConstData::Float(v.to_bits()))
    }

    /// Boolean constant.
    pub fn const_bool(&mut self, v: bool) -> ValueId {
        let ty = self.types.bool();
        self.intern_const(ty, ConstData::Bool(v))
    }

    /// Undef constant of the given type.
    pub fn const_undef(&mut self, ty: TypeId) -> ValueId {
        self.intern_const(ty, ConstData::Undef)
    }

    /// Constant payload, if `v` is a constant.
    pub fn const_data(&self, v: ValueId) -> Option<ConstData> {
        match self.values[v].data {
            ValueData::Constant(data) => Some(data),
            _ => None,
        }
    }

    // =========================================================================
    // Cosmetic renaming
    // =========================================================================

    /// Assign systematic names to every block, argument, and
    /// value-producing instruction, for readable dumps.
    pub fn rename(&mut self) {
        for f in self.funcs.clone() {
            self.rename_function(f);
        }
    }

    /// Rename one function's locals: arguments `a0…`, blocks `bb0…`,
    /// instruction results `t0…`.
    pub fn rename_function(&mut self, func: ValueId) {
        let args = self.func(func).args.clone();
        for (i, arg) in args.iter().enumerate() {
            self.values[*arg].name = Some(format!("a{}", i));
        }

        let blocks = self.func(func).blocks.clone();
        let mut block_n = 0u32;
        let mut var_n = 0u32;
        for block in blocks {
            self.values[block].name = Some(format!("bb{}", block_n));
            block_n += 1;
            let insts: Vec<ValueId> = self.insts(block).collect();
            for inst in insts {
                if !self.types.is_void(self.values[inst].ty) {
                    self.values[inst].name = Some(format!("t{}", var_n));
                    var_n += 1;
                }
            }
        }

        let data = self.func_mut(func);
        data.block_cnt = block_n;
        data.var_cnt = var_n;
    }
}

// =============================================================================
// Tests
// =============================================================================
