//! Global variables.

use super::module::Module;
use super::types::TypeId;
use super::value::{Value, ValueData, ValueId, ValueKind};

/// Per-global data. The value's type is a pointer to `base`; scalar
/// globals carry one initializer element, arrays a flattened list.
#[derive(Debug, Clone)]
pub struct GlobalData {
    pub base: TypeId,
    pub init: Vec<ValueId>,
    pub is_const: bool,
}

impl Module {
    /// Create a global of `base` type with constant initializers and
    /// register it in the module's name table.
    pub fn new_global(
        &mut self,
        base: TypeId,
        name: &str,
        init: Vec<ValueId>,
        is_const: bool,
    ) -> ValueId {
        let ptr_ty = self.types.pointer_to(base);
        let mut value = Value::new(
            ptr_ty,
            ValueKind::Global,
            ValueData::Global(GlobalData {
                base,
                init,
                is_const,
            }),
        );
        value.name = Some(name.to_string());
        let id = self.values.alloc(value);
        self.globals.push(id);
        self.global_table.insert(name.to_string(), id);
        id
    }

    /// The per-global data. Panics if `v` is not a global.
    #[inline]
    pub fn global(&self, v: ValueId) -> &GlobalData {
        match &self.values[v].data {
            ValueData::Global(data) => data,
            _ => panic!("{:?} is not a global", v),
        }
    }
}
