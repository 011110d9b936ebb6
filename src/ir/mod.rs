//! The IR data model.
//!
//! - **arena**: typed-id object storage
//! - **types**: interned type system
//! - **value**: values, kind tags, def–use machinery
//! - **inst**: instruction payloads and operand conventions
//! - **block** / **function** / **global** / **module**: containers
//! - **builder**: SSA construction
//! - **print**: textual dump
//! - **verify**: invariant checking

pub mod arena;
pub mod block;
pub mod builder;
pub mod function;
pub mod global;
pub mod inst;
pub mod module;
pub mod print;
pub mod types;
pub mod value;
pub mod verify;

pub use arena::{Arena, DenseBitSet, Id};
pub use block::BlockData;
pub use builder::{Builder, InsertAt};
pub use function::{FuncAttrs, FuncData};
pub use global::GlobalData;
pub use inst::{InstData, InstExtra};
pub use module::Module;
pub use types::{DimVec, TypeCtx, TypeId, TypeKind};
pub use value::{ConstData, Use, Value, ValueData, ValueId, ValueKind};
pub use verify::{verify_module, Severity, VerifyReport};
