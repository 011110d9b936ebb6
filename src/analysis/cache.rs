//! Analysis cache with explicit, coarse-grained invalidation.
//!
//! One slot per (function, analysis kind), plus module-level slots for
//! the call graph and side-effect summary. Each slot holds a lazily
//! computed result and a valid flag; `get_*` recomputes only when the
//! flag is clear, `get_*_no_refresh` hands back whatever is cached
//! (used inside analysis construction to avoid recursion).
//!
//! Invalidation is the caller's duty: a pass that mutates a function's
//! CFG must call `cfg_changed`, one that changes call structure
//! `call_changed`, one that rewrites induction variables
//! `indvar_changed`. A forgotten notification yields stale answers, not
//! errors — the contract places the burden on passes.

use super::callgraph::{CallGraph, SideEffectInfo};
use super::dom::{DomTree, PostDomTree};
use super::indvar::{DependenceInfo, IndVarInfo, ParallelInfo};
use super::loops::LoopInfo;
use crate::ir::module::Module;
use crate::ir::value::ValueId;
use rustc_hash::FxHashMap;

// =============================================================================
// Slots
// =============================================================================

#[derive(Debug, Clone)]
struct Slot<T> {
    value: Option<T>,
    valid: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            value: None,
            valid: false,
        }
    }
}

impl<T> Slot<T> {
    fn invalidate(&mut self) {
        self.valid = false;
    }

    fn cached(&self) -> Option<&T> {
        self.value.as_ref()
    }

    fn fill(&mut self, value: T) {
        self.value = Some(value);
        self.valid = true;
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Per-module analysis cache.
#[derive(Debug, Clone, Default)]
pub struct AnalysisManager {
    dom: FxHashMap<ValueId, Slot<DomTree>>,
    pdom: FxHashMap<ValueId, Slot<PostDomTree>>,
    loops: FxHashMap<ValueId, Slot<LoopInfo>>,
    indvar: FxHashMap<ValueId, Slot<IndVarInfo>>,
    dependence: FxHashMap<ValueId, Slot<DependenceInfo>>,
    parallel: FxHashMap<ValueId, ParallelInfo>,

    call_graph: Slot<CallGraph>,
    side_effects: Slot<SideEffectInfo>,
}

impl AnalysisManager {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Function-level accessors
    // =========================================================================

    /// Dominator tree of `func`, refreshed. `None` for declarations.
    pub fn get_dom_tree(&mut self, m: &Module, func: ValueId) -> Option<&DomTree> {
        if m.is_declaration(func) {
            return None;
        }
        let slot = self.dom.entry(func).or_default();
        if !slot.valid {
            slot.fill(DomTree::compute(m, func));
        }
        slot.cached()
    }

    /// Whatever dominator tree is cached, valid or not.
    pub fn get_dom_tree_no_refresh(&self, func: ValueId) -> Option<&DomTree> {
        self.dom.get(&func).and_then(|s| s.cached())
    }

    /// Post-dominator tree of `func`, refreshed. `None` for declarations.
    pub fn get_post_dom_tree(&mut self, m: &Module, func: ValueId) -> Option<&PostDomTree> {
        if m.is_declaration(func) {
            return None;
        }
        let slot = self.pdom.entry(func).or_default();
        if !slot.valid {
            slot.fill(PostDomTree::compute(m, func));
        }
        slot.cached()
    }

    /// Whatever post-dominator tree is cached, valid or not.
    pub fn get_post_dom_tree_no_refresh(&self, func: ValueId) -> Option<&PostDomTree> {
        self.pdom.get(&func).and_then(|s| s.cached())
    }

    /// Loop info of `func`, refreshed. `None` for declarations.
    pub fn get_loop_info(&mut self, m: &Module, func: ValueId) -> Option<&LoopInfo> {
        if m.is_declaration(func) {
            return None;
        }
        // Refresh the dominator tree first; loop discovery reads it.
        {
            let dom_slot = self.dom.entry(func).or_default();
            if !dom_slot.valid {
                dom_slot.fill(DomTree::compute(m, func));
            }
        }
        let dom = self.dom[&func].cached().expect("dom slot just filled");
        let slot = self.loops.entry(func).or_default();
        if !slot.valid {
            slot.fill(LoopInfo::compute(m, dom));
        }
        slot.cached()
    }

    /// Whatever loop info is cached, valid or not.
    pub fn get_loop_info_no_refresh(&self, func: ValueId) -> Option<&LoopInfo> {
        self.loops.get(&func).and_then(|s| s.cached())
    }

    /// Induction variables of `func`, refreshed. `None` for declarations.
    pub fn get_ind_var_info(&mut self, m: &Module, func: ValueId) -> Option<&IndVarInfo> {
        if m.is_declaration(func) {
            return None;
        }
        if self.get_loop_info(m, func).is_none() {
            return None;
        }
        let loops = self.loops[&func].cached().expect("loop slot just filled");
        let slot = self.indvar.entry(func).or_default();
        if !slot.valid {
            slot.fill(IndVarInfo::compute(m, loops));
        }
        slot.cached()
    }

    /// Whatever induction-variable info is cached, valid or not.
    pub fn get_ind_var_info_no_refresh(&self, func: ValueId) -> Option<&IndVarInfo> {
        self.indvar.get(&func).and_then(|s| s.cached())
    }

    /// Dependence summary of `func`, refreshed. `None` for declarations.
    pub fn get_dependence_info(&mut self, m: &Module, func: ValueId) -> Option<&DependenceInfo> {
        if m.is_declaration(func) {
            return None;
        }
        if self.get_loop_info(m, func).is_none() {
            return None;
        }
        let loops = self.loops[&func].cached().expect("loop slot just filled");
        let slot = self.dependence.entry(func).or_default();
        if !slot.valid {
            slot.fill(DependenceInfo::compute(m, loops));
        }
        slot.cached()
    }

    /// Carried parallel metadata of `func` (never computed, only stored).
    pub fn parallel_info_mut(&mut self, func: ValueId) -> &mut ParallelInfo {
        self.parallel.entry(func).or_default()
    }

    /// Read-only view of the carried parallel metadata.
    pub fn get_parallel_info(&self, func: ValueId) -> Option<&ParallelInfo> {
        self.parallel.get(&func)
    }

    // =========================================================================
    // Module-level accessors
    // =========================================================================

    /// Call graph, refreshed.
    pub fn get_call_graph(&mut self, m: &Module) -> &CallGraph {
        if !self.call_graph.valid {
            self.call_graph.fill(CallGraph::compute(m));
        }
        self.call_graph.cached().expect("slot just filled")
    }

    /// Whatever call graph is cached, valid or not.
    pub fn get_call_graph_no_refresh(&self) -> Option<&CallGraph> {
        self.call_graph.cached()
    }

    /// Side-effect summary, refreshed (refreshes the call graph too).
    pub fn get_side_effect_info(&mut self, m: &Module) -> &SideEffectInfo {
        if !self.call_graph.valid {
            self.call_graph.fill(CallGraph::compute(m));
        }
        if !self.side_effects.valid {
            let cg = self.call_graph.cached().expect("slot just filled");
            self.side_effects.fill(SideEffectInfo::compute(m, cg));
        }
        self.side_effects.cached().expect("slot just filled")
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// The CFG of `func` changed: dominance, post-dominance, loops, and
    /// induction variables are stale.
    pub fn cfg_changed(&mut self, func: ValueId) {
        if let Some(s) = self.dom.get_mut(&func) {
            s.invalidate();
        }
        if let Some(s) = self.pdom.get_mut(&func) {
            s.invalidate();
        }
        if let Some(s) = self.loops.get_mut(&func) {
            s.invalidate();
        }
        if let Some(s) = self.indvar.get_mut(&func) {
            s.invalidate();
        }
        if let Some(s) = self.dependence.get_mut(&func) {
            s.invalidate();
        }
    }

    /// Call structure changed: the call graph and the side-effect summary
    /// built on it are stale.
    pub fn call_changed(&mut self) {
        self.call_graph.invalidate();
        self.side_effects.invalidate();
    }

    /// Induction variables of `func` changed.
    pub fn indvar_changed(&mut self, func: ValueId) {
        if let Some(s) = self.indvar.get_mut(&func) {
            s.invalidate();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;

    fn straight_line() -> (Module, ValueId) {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let zero = m.const_int(i32_ty, 0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_return(Some(zero));
        (m, f)
    }

    #[test]
    fn test_declaration_returns_none() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let decl = m.new_function(fn_ty, "getint");

        let mut am = AnalysisManager::new();
        assert!(am.get_dom_tree(&m, decl).is_none());
        assert!(am.get_loop_info(&m, decl).is_none());
        assert!(am.get_ind_var_info(&m, decl).is_none());
    }

    #[test]
    fn test_lazy_compute_and_cache() {
        let (m, f) = straight_line();
        let mut am = AnalysisManager::new();

        assert!(am.get_dom_tree_no_refresh(f).is_none());
        let rpo_len = am.get_dom_tree(&m, f).unwrap().rpo().len();
        assert_eq!(rpo_len, 1);
        // Now cached.
        assert!(am.get_dom_tree_no_refresh(f).is_some());
    }

    #[test]
    fn test_stale_without_notification() {
        // A mutation without cfg_changed leaves the old tree in place;
        // the contract puts the burden on the pass.
        let (mut m, f) = straight_line();
        let mut am = AnalysisManager::new();
        let before = am.get_dom_tree(&m, f).unwrap().rpo().len();
        assert_eq!(before, 1);

        // Split control flow: entry now branches to a fresh block that
        // holds the return.
        let entry = m.entry_block(f).unwrap();
        let tail = m.new_block(f);
        let ret = m.terminator(entry).unwrap();
        m.detach_inst(ret);
        m.append_inst(tail, ret);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_br(tail);

        // No notification: still the stale one-block tree.
        assert_eq!(am.get_dom_tree(&m, f).unwrap().rpo().len(), 1);

        // After the notification the tree reflects both blocks.
        am.cfg_changed(f);
        assert_eq!(am.get_dom_tree(&m, f).unwrap().rpo().len(), 2);
    }

    #[test]
    fn test_call_invalidation() {
        let (m, f) = straight_line();
        let mut am = AnalysisManager::new();
        let _ = am.get_call_graph(&m);
        assert!(am.get_call_graph_no_refresh().is_some());

        am.call_changed();
        // Still cached (no_refresh hands back stale data), but the next
        // refreshed access recomputes.
        assert!(am.get_call_graph_no_refresh().is_some());
        let cg = am.get_call_graph(&m);
        assert!(!cg.is_recursive(f));
    }

    #[test]
    fn test_parallel_metadata_survives() {
        let (m, f) = straight_line();
        let entry = m.entry_block(f).unwrap();
        let mut am = AnalysisManager::new();
        am.parallel_info_mut(f).set_parallel(entry, true);
        assert!(am.get_parallel_info(f).unwrap().is_parallel(entry));
    }
}
