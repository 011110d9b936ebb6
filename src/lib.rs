//! SSA middle-end for the Sable compiler.
//!
//! This crate is the bridge between the front-end (which lowers a C-like
//! source language into typed SSA) and the machine-level backend. It owns:
//!
//! - **IR data model** (`ir`): types, values, instructions, blocks,
//!   functions, and modules, all arena-allocated with typed handles
//! - **Def–use machinery** (`ir::value`): intrusive use-lists with O(1)
//!   `replace_all_uses_with`
//! - **Builder** (`ir::builder`): ergonomic SSA construction with context
//!   stacks for loops and short-circuit evaluation
//! - **Verifier** (`ir::verify`): structural, type, and SSA invariants
//! - **Analyses** (`analysis`): dominance, post-dominance, natural loops,
//!   induction variables, call graph — behind an invalidation-aware cache
//! - **Pass framework** (`pass`): typed module/function/block passes with
//!   a name registry
//!
//! # Design Principles
//!
//! - **Arena allocation**: every IR object lives in the module's arena and
//!   is referenced by a stable `ValueId`; no reference-count cycles
//! - **Dense kind tags**: instruction dispatch and family checks are range
//!   compares on a `u16` tag
//! - **Explicit invalidation**: passes that mutate the CFG or call
//!   structure tell the analysis cache; analyses recompute lazily

pub mod analysis;
pub mod ir;
pub mod pass;

pub use analysis::{AnalysisManager, DomTree, LoopInfo, PostDomTree};
pub use ir::builder::Builder;
pub use ir::module::Module;
pub use ir::types::{TypeCtx, TypeId, TypeKind};
pub use ir::value::{Use, Value, ValueId, ValueKind};
pub use ir::verify::{verify_module, Severity, VerifyReport};
pub use pass::{AnyPass, BlockPass, FunctionPass, ModulePass, PassError, PassManager};
