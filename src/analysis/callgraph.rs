//! Module-level analyses: call graph and side-effect summary.

use crate::ir::function::FuncAttrs;
use crate::ir::module::Module;
use crate::ir::value::{ValueId, ValueKind};
use rustc_hash::{FxHashMap, FxHashSet};

// =============================================================================
// Call Graph
// =============================================================================

/// Direct-call edges between functions.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    callees: FxHashMap<ValueId, FxHashSet<ValueId>>,
    callers: FxHashMap<ValueId, FxHashSet<ValueId>>,
    recursive: FxHashSet<ValueId>,
}

impl CallGraph {
    /// Build the graph from every call instruction in the module.
    pub fn compute(m: &Module) -> CallGraph {
        let mut cg = CallGraph::default();
        for &f in m.functions() {
            cg.callees.entry(f).or_default();
            cg.callers.entry(f).or_default();
        }

        for &f in m.functions() {
            for &block in &m.func(f).blocks {
                for inst in m.insts(block) {
                    if m.kind(inst) != ValueKind::Call {
                        continue;
                    }
                    let callee = m.callee_of(inst);
                    cg.callees.entry(f).or_default().insert(callee);
                    cg.callers.entry(callee).or_default().insert(f);
                }
            }
        }

        // Self-recursion plus cycles found by a depth-first walk.
        for &f in m.functions() {
            if cg.reaches(f, f) {
                cg.recursive.insert(f);
            }
        }
        cg
    }

    fn reaches(&self, from: ValueId, target: ValueId) -> bool {
        let mut seen: FxHashSet<ValueId> = FxHashSet::default();
        let mut work: Vec<ValueId> = self
            .callees
            .get(&from)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        while let Some(f) = work.pop() {
            if f == target {
                return true;
            }
            if seen.insert(f) {
                if let Some(next) = self.callees.get(&f) {
                    work.extend(next.iter().copied());
                }
            }
        }
        false
    }

    /// Functions called directly by `f`.
    pub fn callees(&self, f: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        self.callees.get(&f).into_iter().flatten().copied()
    }

    /// Functions that directly call `f`.
    pub fn callers(&self, f: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        self.callers.get(&f).into_iter().flatten().copied()
    }

    /// Whether `f` can reach itself through calls.
    pub fn is_recursive(&self, f: ValueId) -> bool {
        self.recursive.contains(&f)
    }
}

// =============================================================================
// Side Effects
// =============================================================================

/// Which functions may read or write memory, or otherwise have observable
/// effects. Seeded from instruction bodies and attributes, then
/// propagated callee → caller to a fixed point. Declarations without
/// effect-excluding attributes are assumed to do anything.
#[derive(Debug, Clone, Default)]
pub struct SideEffectInfo {
    reads: FxHashSet<ValueId>,
    writes: FxHashSet<ValueId>,
}

impl SideEffectInfo {
    /// Build the summary for a module.
    pub fn compute(m: &Module, cg: &CallGraph) -> SideEffectInfo {
        let mut info = SideEffectInfo::default();

        // Seed from bodies and attributes.
        for &f in m.functions() {
            let attrs = m.func(f).attrs;
            if m.is_declaration(f) {
                if !attrs.contains(FuncAttrs::NO_MEMORY_READ) {
                    info.reads.insert(f);
                }
                if !attrs.contains(FuncAttrs::NO_MEMORY_WRITE) {
                    info.writes.insert(f);
                }
                continue;
            }
            for &block in &m.func(f).blocks {
                for inst in m.insts(block) {
                    match m.kind(inst) {
                        ValueKind::Load => {
                            info.reads.insert(f);
                        }
                        ValueKind::Store | ValueKind::Memset => {
                            info.writes.insert(f);
                        }
                        _ => {}
                    }
                }
            }
        }

        // Propagate over the call graph until nothing changes.
        let mut changed = true;
        while changed {
            changed = false;
            for &f in m.functions() {
                for callee in cg.callees(f) {
                    if info.reads.contains(&callee) && info.reads.insert(f) {
                        changed = true;
                    }
                    if info.writes.contains(&callee) && info.writes.insert(f) {
                        changed = true;
                    }
                }
            }
        }
        info
    }

    /// Whether `f` may read memory.
    pub fn may_read(&self, f: ValueId) -> bool {
        self.reads.contains(&f)
    }

    /// Whether `f` may write memory.
    pub fn may_write(&self, f: ValueId) -> bool {
        self.writes.contains(&f)
    }

    /// Whether `f` is free of observable memory effects.
    pub fn is_pure(&self, f: ValueId) -> bool {
        !self.may_read(f) && !self.may_write(f)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;

    /// main calls helper; helper stores; getint is an opaque declaration.
    fn sample() -> (Module, ValueId, ValueId, ValueId) {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let void_ty = m.types.void();
        let fn_i32 = m.types.function(i32_ty, vec![]);
        let fn_void = m.types.function(void_ty, vec![]);

        let getint = m.new_function(fn_i32, "getint");

        let helper = m.new_function(fn_void, "helper");
        let hb = m.new_entry_block(helper);
        let g_init = m.const_int(i32_ty, 0);
        let g = m.new_global(i32_ty, "g", vec![g_init], false);
        let one = m.const_int(i32_ty, 1);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(hb);
        b.make_store(one, g);
        b.make_return(None);

        let main = m.new_function(fn_i32, "main");
        let mb = m.new_entry_block(main);
        let zero = m.const_int(i32_ty, 0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(mb);
        b.make_call(helper, &[]);
        b.make_return(Some(zero));

        (m, main, helper, getint)
    }

    #[test]
    fn test_call_edges() {
        let (m, main, helper, getint) = sample();
        let cg = CallGraph::compute(&m);

        assert_eq!(cg.callees(main).collect::<Vec<_>>(), vec![helper]);
        assert_eq!(cg.callers(helper).collect::<Vec<_>>(), vec![main]);
        assert_eq!(cg.callees(getint).count(), 0);
        assert!(!cg.is_recursive(main));
    }

    #[test]
    fn test_recursion_detection() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        let r = b.make_call(f, &[]);
        b.make_return(Some(r));

        let cg = CallGraph::compute(&m);
        assert!(cg.is_recursive(f));
    }

    #[test]
    fn test_side_effects_propagate() {
        let (m, main, helper, getint) = sample();
        let cg = CallGraph::compute(&m);
        let se = SideEffectInfo::compute(&m, &cg);

        assert!(se.may_write(helper));
        // The write is visible through the call edge.
        assert!(se.may_write(main));
        assert!(!se.may_read(helper));
        // Unattributed declarations are assumed to do anything.
        assert!(se.may_read(getint) && se.may_write(getint));
    }

    #[test]
    fn test_attributed_declaration_is_pure() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![i32_ty]);
        let f = m.new_function(fn_ty, "abs");
        m.func_mut(f).attrs |= FuncAttrs::NO_MEMORY_READ | FuncAttrs::NO_MEMORY_WRITE;

        let cg = CallGraph::compute(&m);
        let se = SideEffectInfo::compute(&m, &cg);
        assert!(se.is_pure(f));
    }
}
