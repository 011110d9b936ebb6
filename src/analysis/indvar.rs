//! Per-loop value analyses: induction variables, a conservative
//! dependence summary, and carried parallel metadata.
//!
//! `IndVarInfo` finds the basic shape loop transforms need: a header phi
//! whose value enters from the preheader and steps by a constant through
//! an add on the latch edge. Loops that are not in simplified form are
//! skipped — the phi/edge correspondence is only unambiguous with a
//! preheader and a unique latch.

use super::loops::LoopInfo;
use crate::ir::module::Module;
use crate::ir::value::{ValueId, ValueKind};
use rustc_hash::{FxHashMap, FxHashSet};

// =============================================================================
// Induction Variables
// =============================================================================

/// A basic induction variable `i = phi [init, preheader], [i + step, latch]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicIndVar {
    /// The header phi.
    pub phi: ValueId,
    /// Loop-invariant initial value, from the preheader edge.
    pub init: ValueId,
    /// The add on the latch edge.
    pub update: ValueId,
    /// Constant step amount.
    pub step: i64,
}

/// Basic induction variables per loop header.
#[derive(Debug, Clone, Default)]
pub struct IndVarInfo {
    by_header: FxHashMap<ValueId, BasicIndVar>,
}

impl IndVarInfo {
    /// Scan every simplified loop for a basic induction variable.
    pub fn compute(m: &Module, loops: &LoopInfo) -> IndVarInfo {
        let mut info = IndVarInfo::default();
        for l in loops.loops() {
            if !l.is_simplified(m) {
                continue;
            }
            let preheader = l.preheader(m).expect("simplified loop has a preheader");
            let latch = l.latch().expect("simplified loop has a unique latch");

            for inst in m.insts(l.header) {
                if m.kind(inst) != ValueKind::Phi {
                    continue;
                }
                if let Some(iv) = Self::match_indvar(m, inst, preheader, latch) {
                    info.by_header.insert(l.header, iv);
                    break;
                }
            }
        }
        info
    }

    fn match_indvar(
        m: &Module,
        phi: ValueId,
        preheader: ValueId,
        latch: ValueId,
    ) -> Option<BasicIndVar> {
        let incoming = m.phi_incoming(phi);
        if incoming.len() != 2 {
            return None;
        }
        let init = incoming.iter().find(|&&(_, b)| b == preheader)?.0;
        let update = incoming.iter().find(|&&(_, b)| b == latch)?.0;

        if m.kind(update) != ValueKind::Add {
            return None;
        }
        let (lhs, rhs) = (m.operand(update, 0), m.operand(update, 1));
        let step_const = if lhs == phi {
            rhs
        } else if rhs == phi {
            lhs
        } else {
            return None;
        };
        let step = m.const_data(step_const)?.as_int()?;

        Some(BasicIndVar {
            phi,
            init,
            update,
            step,
        })
    }

    /// The induction variable of the loop headed by `header`, if found.
    pub fn for_header(&self, header: ValueId) -> Option<&BasicIndVar> {
        self.by_header.get(&header)
    }

    /// Number of loops with a recognized induction variable.
    pub fn len(&self) -> usize {
        self.by_header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_header.is_empty()
    }
}

// =============================================================================
// Dependence summary
// =============================================================================

/// Conservative may-conflict summary of memory traffic per loop.
///
/// Two accesses conflict when their pointers may share a base object and
/// at least one of them writes. The base object is the root of the
/// pointer's gep chain: an alloca, a global, or an argument; distinct
/// allocas and globals never alias, everything else may.
#[derive(Debug, Clone, Default)]
pub struct DependenceInfo {
    conflicting_headers: FxHashSet<ValueId>,
}

impl DependenceInfo {
    /// Summarize every loop in the function.
    pub fn compute(m: &Module, loops: &LoopInfo) -> DependenceInfo {
        let mut info = DependenceInfo::default();
        for l in loops.loops() {
            let mut reads: Vec<ValueId> = Vec::new();
            let mut writes: Vec<ValueId> = Vec::new();
            let mut opaque_call = false;

            for &block in l.blocks.iter() {
                for inst in m.insts(block) {
                    match m.kind(inst) {
                        ValueKind::Load => reads.push(Self::base_object(m, m.operand(inst, 0))),
                        ValueKind::Store => writes.push(Self::base_object(m, m.operand(inst, 1))),
                        ValueKind::Memset => writes.push(Self::base_object(m, m.operand(inst, 0))),
                        ValueKind::Call => opaque_call = true,
                        _ => {}
                    }
                }
            }

            // A write conflicts with every may-aliasing access, itself
            // across iterations included.
            let conflict = opaque_call
                || writes.iter().any(|&w| {
                    reads.iter().any(|&r| Self::may_alias(m, w, r))
                        || writes.iter().any(|&w2| Self::may_alias(m, w, w2))
                });
            if conflict {
                info.conflicting_headers.insert(l.header);
            }
        }
        info
    }

    fn base_object(m: &Module, mut ptr: ValueId) -> ValueId {
        while m.is_inst(ptr) && m.kind(ptr) == ValueKind::GetElementPtr {
            ptr = m.operand(ptr, 0);
        }
        ptr
    }

    fn may_alias(m: &Module, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }
        let rooted = |v: ValueId| {
            matches!(m.kind(v), ValueKind::Global | ValueKind::Alloca)
        };
        // Distinct named objects cannot overlap; anything involving an
        // unknown pointer (argument, load result) may.
        !(rooted(a) && rooted(b))
    }

    /// Whether the loop headed by `header` may carry a memory conflict.
    pub fn may_conflict(&self, header: ValueId) -> bool {
        self.conflicting_headers.contains(&header)
    }
}

// =============================================================================
// Parallel metadata
// =============================================================================

/// Carried per-loop parallelizability flags. The core never computes
/// these; passes outside it mark loops and read the marks back.
#[derive(Debug, Clone, Default)]
pub struct ParallelInfo {
    parallel_headers: FxHashSet<ValueId>,
}

impl ParallelInfo {
    /// Mark the loop headed by `header` parallelizable.
    pub fn set_parallel(&mut self, header: ValueId, parallel: bool) {
        if parallel {
            self.parallel_headers.insert(header);
        } else {
            self.parallel_headers.remove(&header);
        }
    }

    /// Whether the loop headed by `header` is marked parallelizable.
    pub fn is_parallel(&self, header: ValueId) -> bool {
        self.parallel_headers.contains(&header)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dom::DomTree;
    use crate::ir::builder::Builder;

    /// for (i = 0; i < 10; i += 2) { g = i; }
    fn counted_loop() -> (Module, ValueId, ValueId) {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let header = m.new_block(f);
        let body = m.new_block(f);
        let latch = m.new_block(f);
        let exit = m.new_block(f);

        let zero = m.const_int(i32_ty, 0);
        let two = m.const_int(i32_ty, 2);
        let ten = m.const_int(i32_ty, 10);
        let g_init = m.const_int(i32_ty, 0);
        let g = m.new_global(i32_ty, "g", vec![g_init], false);

        // Wire the phi and its update across the blocks by hand so the
        // update can flow back into the phi.
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_br(header);

        b.set_pos_end(header);
        let phi = b.make_phi(i32_ty, &[(zero, entry)]);
        let cmp = b.make_cmp(ValueKind::IcmpSlt, phi, ten);
        b.make_cond_br(cmp, body, exit);

        b.set_pos_end(body);
        b.make_store(phi, g);
        b.make_br(latch);

        b.set_pos_end(latch);
        let next = b.make_binary(ValueKind::Add, phi, two);
        b.make_br(header);

        b.set_pos_end(exit);
        b.make_return(Some(phi));

        m.phi_add_incoming(phi, next, latch);
        (m, f, header)
    }

    #[test]
    fn test_basic_indvar_found() {
        let (m, f, header) = counted_loop();
        let dom = DomTree::compute(&m, f);
        let loops = LoopInfo::compute(&m, &dom);
        let iv = IndVarInfo::compute(&m, &loops);

        let found = iv.for_header(header).expect("induction variable");
        assert_eq!(found.step, 2);
        assert_eq!(m.const_data(found.init).unwrap().as_int(), Some(0));
        assert_eq!(m.kind(found.update), ValueKind::Add);
    }

    #[test]
    fn test_dependence_store_conflicts() {
        let (m, f, header) = counted_loop();
        let dom = DomTree::compute(&m, f);
        let loops = LoopInfo::compute(&m, &dom);
        let dep = DependenceInfo::compute(&m, &loops);

        // Repeated stores to the same global conflict with themselves.
        assert!(dep.may_conflict(header));
    }

    #[test]
    fn test_parallel_marks_round_trip() {
        let (_, _, header) = counted_loop();
        let mut par = ParallelInfo::default();
        assert!(!par.is_parallel(header));
        par.set_parallel(header, true);
        assert!(par.is_parallel(header));
        par.set_parallel(header, false);
        assert!(!par.is_parallel(header));
    }
}
