//! Natural-loop detection and nesting.
//!
//! A back edge is a CFG edge `u → h` where `h` dominates `u`. Each back
//! edge seeds a loop: start from `{u, h}` and walk predecessors
//! transitively, stopping at `h`. Back edges sharing a header share a
//! loop (their block sets are unioned). Nesting comes from finding the
//! smallest other loop containing each header.
//!
//! Unreachable blocks never appear: discovery only walks the dominator
//! tree's RPO, and a dominance query gates every candidate edge.
//!
//! Block sets iterate in hash order; consumers that need determinism sort
//! by block id.

use super::dom::DomTree;
use crate::ir::module::Module;
use crate::ir::value::ValueId;
use rustc_hash::{FxHashMap, FxHashSet};

// =============================================================================
// Errors
// =============================================================================

/// Loop-shape precondition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopError {
    /// The query needs a simplified loop (preheader + unique latch +
    /// dedicated exits) and this loop is not in that form.
    NotSimplified,
}

impl std::fmt::Display for LoopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopError::NotSimplified => write!(f, "loop is not in simplified form"),
        }
    }
}

impl std::error::Error for LoopError {}

// =============================================================================
// Loop
// =============================================================================

/// One natural loop.
#[derive(Debug, Clone)]
pub struct Loop {
    /// The header block; dominates every block in the loop.
    pub header: ValueId,
    /// All blocks in the loop, header included.
    pub blocks: FxHashSet<ValueId>,
    /// Blocks with at least one successor outside the loop.
    pub exits: FxHashSet<ValueId>,
    /// Blocks with a back edge to the header.
    pub latches: FxHashSet<ValueId>,
    /// Enclosing loop, if nested.
    pub parent: Option<usize>,
    /// Directly nested loops.
    pub sub_loops: Vec<usize>,
    /// Nesting depth; 1 for top-level loops.
    pub depth: u32,
}

impl Loop {
    /// Whether the loop contains a block.
    #[inline]
    pub fn contains(&self, block: ValueId) -> bool {
        self.blocks.contains(&block)
    }

    /// The unique latch, or `None` when there are several.
    pub fn latch(&self) -> Option<ValueId> {
        if self.latches.len() == 1 {
            self.latches.iter().next().copied()
        } else {
            None
        }
    }

    /// The unique outside predecessor of the header, or `None` when there
    /// is none or more than one.
    pub fn predecessor_outside(&self, m: &Module) -> Option<ValueId> {
        let mut found = None;
        for p in m.predecessors(self.header) {
            if self.contains(p) {
                continue;
            }
            if found.is_some() {
                return None;
            }
            found = Some(p);
        }
        found
    }

    /// The preheader: the unique outside predecessor whose only successor
    /// is the header. `None` otherwise.
    pub fn preheader(&self, m: &Module) -> Option<ValueId> {
        let pred = self.predecessor_outside(m)?;
        let succs = m.successors(pred);
        (succs.len() == 1 && succs[0] == self.header).then_some(pred)
    }

    /// Outside blocks reached by an edge leaving the loop.
    pub fn exit_targets(&self, m: &Module) -> FxHashSet<ValueId> {
        let mut targets: FxHashSet<ValueId> = FxHashSet::default();
        for &e in &self.exits {
            for s in m.successors(e) {
                if !self.contains(s) {
                    targets.insert(s);
                }
            }
        }
        targets
    }

    /// Whether every exit target's predecessors are all inside the loop.
    pub fn has_dedicated_exits(&self, m: &Module) -> bool {
        self.exit_targets(m)
            .iter()
            .all(|&t| m.predecessors(t).iter().all(|&p| self.contains(p)))
    }

    /// Preheader present, unique latch, dedicated exits.
    pub fn is_simplified(&self, m: &Module) -> bool {
        self.preheader(m).is_some() && self.latch().is_some() && self.has_dedicated_exits(m)
    }

    /// Fail with [`LoopError::NotSimplified`] unless simplified.
    pub fn require_simplified(&self, m: &Module) -> Result<(), LoopError> {
        if self.is_simplified(m) {
            Ok(())
        } else {
            Err(LoopError::NotSimplified)
        }
    }
}

// =============================================================================
// LoopInfo
// =============================================================================

/// All natural loops of one function.
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    header_map: FxHashMap<ValueId, usize>,
    /// Innermost loop per block.
    block_map: FxHashMap<ValueId, usize>,
}

impl LoopInfo {
    /// Detect loops from the dominator tree.
    pub fn compute(m: &Module, dom: &DomTree) -> LoopInfo {
        let mut info = LoopInfo::default();

        // Back edges, in RPO for determinism of loop indices.
        for &u in dom.rpo() {
            for h in m.successors(u) {
                if dom.is_reachable(h) && dom.dominates(h, u).unwrap_or(false) {
                    info.add_back_edge(m, h, u);
                }
            }
        }

        info.compute_nesting();
        info.compute_exits(m);
        info
    }

    fn add_back_edge(&mut self, m: &Module, header: ValueId, latch: ValueId) {
        let idx = match self.header_map.get(&header) {
            Some(&idx) => idx,
            None => {
                let idx = self.loops.len();
                let mut blocks = FxHashSet::default();
                blocks.insert(header);
                self.loops.push(Loop {
                    header,
                    blocks,
                    exits: FxHashSet::default(),
                    latches: FxHashSet::default(),
                    parent: None,
                    sub_loops: Vec::new(),
                    depth: 1,
                });
                self.header_map.insert(header, idx);
                idx
            }
        };
        self.loops[idx].latches.insert(latch);

        // Walk predecessors from the latch, stopping at the header.
        let mut work = vec![latch];
        while let Some(b) = work.pop() {
            if !self.loops[idx].blocks.insert(b) {
                continue;
            }
            for p in m.predecessors(b) {
                if !self.loops[idx].blocks.contains(&p) {
                    work.push(p);
                }
            }
        }
    }

    fn compute_nesting(&mut self) {
        let n = self.loops.len();

        // Smallest other loop containing the header is the parent.
        for i in 0..n {
            let header = self.loops[i].header;
            let mut parent: Option<usize> = None;
            let mut parent_size = usize::MAX;
            for j in 0..n {
                if i == j || !self.loops[j].blocks.contains(&header) {
                    continue;
                }
                if self.loops[j].blocks.len() < parent_size {
                    parent_size = self.loops[j].blocks.len();
                    parent = Some(j);
                }
            }
            if let Some(p) = parent {
                self.loops[i].parent = Some(p);
                self.loops[p].sub_loops.push(i);
            }
        }

        for i in 0..n {
            let mut depth = 1;
            let mut cur = self.loops[i].parent;
            while let Some(p) = cur {
                depth += 1;
                cur = self.loops[p].parent;
            }
            self.loops[i].depth = depth;
        }

        // Innermost loop per block: prefer the deepest container.
        for i in 0..n {
            for &b in self.loops[i].blocks.iter() {
                match self.block_map.get(&b) {
                    Some(&j) if self.loops[j].depth >= self.loops[i].depth => {}
                    _ => {
                        self.block_map.insert(b, i);
                    }
                }
            }
        }
    }

    fn compute_exits(&mut self, m: &Module) {
        for l in self.loops.iter_mut() {
            let exits: FxHashSet<ValueId> = l
                .blocks
                .iter()
                .filter(|&&b| m.successors(b).iter().any(|s| !l.blocks.contains(s)))
                .copied()
                .collect();
            l.exits = exits;
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All loops, discovery order.
    #[inline]
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Loops with no parent.
    pub fn top_level(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter().filter(|l| l.parent.is_none())
    }

    /// The loop headed by `block`, if any.
    pub fn loop_for_header(&self, block: ValueId) -> Option<&Loop> {
        self.header_map.get(&block).map(|&i| &self.loops[i])
    }

    /// The innermost loop containing `block`, if any.
    pub fn innermost_for(&self, block: ValueId) -> Option<&Loop> {
        self.block_map.get(&block).map(|&i| &self.loops[i])
    }

    /// Nesting depth of a block; 0 outside any loop.
    pub fn depth_of(&self, block: ValueId) -> u32 {
        self.innermost_for(block).map(|l| l.depth).unwrap_or(0)
    }
}

// =============================================================================
// Tests
// =============================================================================
