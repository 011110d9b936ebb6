//! Interned type system for the Sable IR.
//!
//! Types are immutable and fully deduplicated: structurally equal types
//! always receive the same `TypeId`, so handle equality *is* structural
//! equality. Composite types (pointers, arrays, functions) are built
//! through the `TypeCtx` factories, which consult the intern table before
//! allocating.
//!
//! Layout rules:
//! - pointers are 8 bytes
//! - integers and floats occupy their bit width in bytes
//! - `Bool` is 1 bit as a predicate but stores as 1 byte

use super::arena::{Arena, Id};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Handle to an interned type.
pub type TypeId = Id<TypeKind>;

/// Array dimensions. Source arrays rarely exceed four dimensions, so the
/// common case stays inline.
pub type DimVec = SmallVec<[u64; 4]>;

// =============================================================================
// Type Kind
// =============================================================================

/// The shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// No value.
    Void,
    /// 1-bit predicate.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 32-bit signed integer (the default source int).
    Int32,
    /// 64-bit signed integer (address width).
    Int64,
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
    /// Basic block label.
    Label,
    /// Undefined/unknown type.
    Undef,
    /// Pointer to a base type.
    Pointer { base: TypeId },
    /// Multi-dimensional array with a flattened byte size.
    Array {
        elem: TypeId,
        dims: DimVec,
        size: u64,
    },
    /// Function signature.
    Function { ret: TypeId, params: Vec<TypeId> },
}

impl TypeKind {
    /// Whether this is any integer type (bool included).
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(
            self,
            TypeKind::Bool | TypeKind::Int8 | TypeKind::Int32 | TypeKind::Int64
        )
    }

    /// Whether this is a floating-point type.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, TypeKind::Float32 | TypeKind::Float64)
    }

    /// Whether this is a pointer type.
    #[inline]
    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeKind::Pointer { .. })
    }

    /// Whether this is an array type.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, TypeKind::Array { .. })
    }

    /// Whether this is a function type.
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self, TypeKind::Function { .. })
    }
}

// =============================================================================
// Type Context
// =============================================================================

/// Owner and interner of all types in a module.
///
/// Primitive types are allocated up front; composite types are deduplicated
/// on construction.
#[derive(Debug, Clone)]
pub struct TypeCtx {
    types: Arena<TypeKind>,
    interned: FxHashMap<TypeKind, TypeId>,

    void_ty: TypeId,
    bool_ty: TypeId,
    int8_ty: TypeId,
    int32_ty: TypeId,
    int64_ty: TypeId,
    float32_ty: TypeId,
    float64_ty: TypeId,
    label_ty: TypeId,
    undef_ty: TypeId,
}

impl TypeCtx {
    /// Create a context with the primitive types pre-interned.
    pub fn new() -> Self {
        let mut types = Arena::with_capacity(16);
        let mut interned = FxHashMap::default();

        let mut prim = |kind: TypeKind| {
            let id = types.alloc(kind.clone());
            interned.insert(kind, id);
            id
        };

        let void_ty = prim(TypeKind::Void);
        let bool_ty = prim(TypeKind::Bool);
        let int8_ty = prim(TypeKind::Int8);
        let int32_ty = prim(TypeKind::Int32);
        let int64_ty = prim(TypeKind::Int64);
        let float32_ty = prim(TypeKind::Float32);
        let float64_ty = prim(TypeKind::Float64);
        let label_ty = prim(TypeKind::Label);
        let undef_ty = prim(TypeKind::Undef);

        TypeCtx {
            types,
            interned,
            void_ty,
            bool_ty,
            int8_ty,
            int32_ty,
            int64_ty,
            float32_ty,
            float64_ty,
            label_ty,
            undef_ty,
        }
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    #[inline]
    pub fn void(&self) -> TypeId {
        self.void_ty
    }

    #[inline]
    pub fn bool(&self) -> TypeId {
        self.bool_ty
    }

    #[inline]
    pub fn int8(&self) -> TypeId {
        self.int8_ty
    }

    #[inline]
    pub fn int32(&self) -> TypeId {
        self.int32_ty
    }

    #[inline]
    pub fn int64(&self) -> TypeId {
        self.int64_ty
    }

    #[inline]
    pub fn float32(&self) -> TypeId {
        self.float32_ty
    }

    #[inline]
    pub fn float64(&self) -> TypeId {
        self.float64_ty
    }

    #[inline]
    pub fn label(&self) -> TypeId {
        self.label_ty
    }

    #[inline]
    pub fn undef(&self) -> TypeId {
        self.undef_ty
    }

    // =========================================================================
    // Composites
    // =========================================================================

    /// Pointer to `base`.
    pub fn pointer_to(&mut self, base: TypeId) -> TypeId {
        self.intern(TypeKind::Pointer { base })
    }

    /// Array of `elem` with the given dimensions. The flattened byte size
    /// is the element size times the product of the dimensions.
    pub fn array_of(&mut self, elem: TypeId, dims: DimVec) -> TypeId {
        let count: u64 = dims.iter().product();
        let size = self.size_of(elem) * count;
        self.intern(TypeKind::Array { elem, dims, size })
    }

    /// Function signature.
    pub fn function(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(TypeKind::Function { ret, params })
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.interned.get(&kind) {
            return id;
        }
        let id = self.types.alloc(kind.clone());
        self.interned.insert(kind, id);
        id
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The shape of a type.
    #[inline]
    pub fn kind(&self, ty: TypeId) -> &TypeKind {
        &self.types[ty]
    }

    /// Structural equality. Interning makes this equivalent to handle
    /// equality; both spellings are accepted.
    #[inline]
    pub fn is_same(&self, a: TypeId, b: TypeId) -> bool {
        a == b
    }

    /// Storage size in bytes.
    pub fn size_of(&self, ty: TypeId) -> u64 {
        match &self.types[ty] {
            TypeKind::Void | TypeKind::Label | TypeKind::Undef => 0,
            TypeKind::Bool | TypeKind::Int8 => 1,
            TypeKind::Int32 | TypeKind::Float32 => 4,
            TypeKind::Int64 | TypeKind::Float64 => 8,
            TypeKind::Pointer { .. } | TypeKind::Function { .. } => 8,
            TypeKind::Array { size, .. } => *size,
        }
    }

    /// Pointee of a pointer type, if `ty` is a pointer.
    pub fn pointee(&self, ty: TypeId) -> Option<TypeId> {
        match self.types[ty] {
            TypeKind::Pointer { base } => Some(base),
            _ => None,
        }
    }

    /// Return type of a function type, if `ty` is a function.
    pub fn return_type(&self, ty: TypeId) -> Option<TypeId> {
        match &self.types[ty] {
            TypeKind::Function { ret, .. } => Some(*ret),
            _ => None,
        }
    }

    /// Parameter types of a function type, if `ty` is a function.
    pub fn param_types(&self, ty: TypeId) -> Option<&[TypeId]> {
        match &self.types[ty] {
            TypeKind::Function { params, .. } => Some(params),
            _ => None,
        }
    }

    #[inline]
    pub fn is_void(&self, ty: TypeId) -> bool {
        ty == self.void_ty
    }

    #[inline]
    pub fn is_bool(&self, ty: TypeId) -> bool {
        ty == self.bool_ty
    }

    #[inline]
    pub fn is_int(&self, ty: TypeId) -> bool {
        self.types[ty].is_int()
    }

    #[inline]
    pub fn is_float(&self, ty: TypeId) -> bool {
        self.types[ty].is_float()
    }

    #[inline]
    pub fn is_pointer(&self, ty: TypeId) -> bool {
        self.types[ty].is_pointer()
    }

    /// Render a type the way the module dump does (`i32`, `[2 x i32]`,
    /// `i32*`, ...).
    pub fn display(&self, ty: TypeId) -> String {
        match &self.types[ty] {
            TypeKind::Void => "void".into(),
            TypeKind::Bool => "i1".into(),
            TypeKind::Int8 => "i8".into(),
            TypeKind::Int32 => "i32".into(),
            TypeKind::Int64 => "i64".into(),
            TypeKind::Float32 => "float".into(),
            TypeKind::Float64 => "double".into(),
            TypeKind::Label => "label".into(),
            TypeKind::Undef => "undef".into(),
            TypeKind::Pointer { base } => format!("{}*", self.display(*base)),
            TypeKind::Array { elem, dims, .. } => {
                let mut out = String::new();
                for d in dims.iter() {
                    out.push_str(&format!("[{} x ", d));
                }
                out.push_str(&self.display(*elem));
                for _ in dims.iter() {
                    out.push(']');
                }
                out
            }
            TypeKind::Function { ret, params } => {
                let args: Vec<String> = params.iter().map(|&p| self.display(p)).collect();
                format!("{} ({})", self.display(*ret), args.join(", "))
            }
        }
    }
}

impl Default for TypeCtx {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_primitive_identity() {
        let ctx = TypeCtx::new();
        assert_eq!(ctx.int32(), ctx.int32());
        assert_ne!(ctx.int32(), ctx.int64());
        assert!(ctx.is_same(ctx.bool(), ctx.bool()));
    }

    #[test]
    fn test_composite_interning() {
        let mut ctx = TypeCtx::new();
        let i32_ty = ctx.int32();

        let p1 = ctx.pointer_to(i32_ty);
        let p2 = ctx.pointer_to(i32_ty);
        assert_eq!(p1, p2);

        let a1 = ctx.array_of(i32_ty, smallvec![2, 3]);
        let a2 = ctx.array_of(i32_ty, smallvec![2, 3]);
        let a3 = ctx.array_of(i32_ty, smallvec![3, 2]);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);

        let f1 = ctx.function(i32_ty, vec![i32_ty, p1]);
        let f2 = ctx.function(i32_ty, vec![i32_ty, p2]);
        assert_eq!(f1, f2);
    }

    #[test]
    fn test_layout() {
        let mut ctx = TypeCtx::new();
        assert_eq!(ctx.size_of(ctx.bool()), 1);
        assert_eq!(ctx.size_of(ctx.int32()), 4);
        assert_eq!(ctx.size_of(ctx.float64()), 8);

        let i32_ty = ctx.int32();
        let ptr = ctx.pointer_to(i32_ty);
        assert_eq!(ctx.size_of(ptr), 8);

        let arr = ctx.array_of(i32_ty, smallvec![2, 3]);
        assert_eq!(ctx.size_of(arr), 24);
    }

    #[test]
    fn test_display() {
        let mut ctx = TypeCtx::new();
        let i32_ty = ctx.int32();
        let arr = ctx.array_of(i32_ty, smallvec![2, 3]);
        let ptr = ctx.pointer_to(arr);

        assert_eq!(ctx.display(i32_ty), "i32");
        assert_eq!(ctx.display(arr), "[2 x [3 x i32]]");
        assert_eq!(ctx.display(ptr), "[2 x [3 x i32]]*");
    }

    #[test]
    fn test_pointee() {
        let mut ctx = TypeCtx::new();
        let i32_ty = ctx.int32();
        let ptr = ctx.pointer_to(i32_ty);
        assert_eq!(ctx.pointee(ptr), Some(i32_ty));
        assert_eq!(ctx.pointee(i32_ty), None);
    }
}
