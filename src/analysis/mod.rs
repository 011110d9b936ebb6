//! Analyses over the IR.
//!
//! - **dom**: dominator and post-dominator trees (Cooper–Harvey–Kennedy)
//! - **loops**: natural-loop detection, nesting, simplified-form queries
//! - **indvar**: induction variables, dependence summary, parallel marks
//! - **callgraph**: call edges and side-effect propagation
//! - **cache**: per-(function, kind) slots with explicit invalidation

pub mod cache;
pub mod callgraph;
pub mod dom;
pub mod indvar;
pub mod loops;

pub use cache::AnalysisManager;
pub use callgraph::{CallGraph, SideEffectInfo};
pub use dom::{AnalysisError, AnalysisResult, DomTree, PostDomTree};
pub use indvar::{BasicIndVar, DependenceInfo, IndVarInfo, ParallelInfo};
pub use loops::{Loop, LoopError, LoopInfo};
