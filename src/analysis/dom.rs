//! Dominance and post-dominance.
//!
//! Both trees come from the iterative Cooper–Harvey–Kennedy algorithm:
//! number the reachable blocks in reverse postorder, seed the entry with
//! itself, then intersect predecessor idom chains until a fixed point.
//! Dominance frontiers use the two-predecessor runner walk from the same
//! paper.
//!
//! `dominates` is O(1): a depth-first walk over the finished tree assigns
//! Euler-tour intervals, and containment of intervals is containment in
//! the tree.
//!
//! Unreachable blocks are not in either tree; queries about them fail
//! with [`AnalysisError::UnreachableBlock`].

use crate::ir::module::Module;
use crate::ir::value::ValueId;
use rustc_hash::FxHashMap;

// =============================================================================
// Errors
// =============================================================================

/// Analysis precondition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    /// Query about a block outside the computed tree.
    UnreachableBlock,
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::UnreachableBlock => write!(f, "query about an unreachable block"),
        }
    }
}

impl std::error::Error for AnalysisError {}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

// =============================================================================
// Index-graph worker
// =============================================================================

const UNDEF: usize = usize::MAX;

/// Cooper–Harvey–Kennedy on an index graph. Nodes are RPO positions
/// (0 = root); `preds[i]` holds RPO positions of i's predecessors.
/// Returns `idom` with `idom[0] == 0`.
fn chk_idoms(n: usize, preds: &[Vec<usize>]) -> Vec<usize> {
    let mut idom = vec![UNDEF; n];
    if n == 0 {
        return idom;
    }
    idom[0] = 0;

    let intersect = |idom: &[usize], mut a: usize, mut b: usize| -> usize {
        while a != b {
            // Larger RPO position means deeper; walk it up.
            while a > b {
                a = idom[a];
            }
            while b > a {
                b = idom[b];
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for b in 1..n {
            let mut new_idom = UNDEF;
            for &p in &preds[b] {
                if idom[p] == UNDEF {
                    continue;
                }
                new_idom = if new_idom == UNDEF {
                    p
                } else {
                    intersect(&idom, p, new_idom)
                };
            }
            if new_idom != UNDEF && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }
    idom
}

/// Dominance frontier on the index graph.
fn frontiers(n: usize, preds: &[Vec<usize>], idom: &[usize]) -> Vec<Vec<usize>> {
    let mut df: Vec<Vec<usize>> = vec![Vec::new(); n];
    for b in 0..n {
        if preds[b].len() < 2 {
            continue;
        }
        for &p in &preds[b] {
            let mut runner = p;
            while runner != idom[b] {
                if !df[runner].contains(&b) {
                    df[runner].push(b);
                }
                runner = idom[runner];
            }
        }
    }
    df
}

/// Euler-tour intervals over the finished tree.
fn euler_intervals(n: usize, idom: &[usize]) -> (Vec<u32>, Vec<u32>) {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    for b in 1..n {
        if idom[b] != UNDEF {
            children[idom[b]].push(b);
        }
    }
    let mut dfn_in = vec![0u32; n];
    let mut dfn_out = vec![0u32; n];
    let mut clock = 0u32;

    // Iterative DFS; the second visit of a frame closes its interval.
    let mut stack: Vec<(usize, bool)> = vec![(0, false)];
    while let Some((node, closed)) = stack.pop() {
        if closed {
            dfn_out[node] = clock;
            clock += 1;
            continue;
        }
        dfn_in[node] = clock;
        clock += 1;
        stack.push((node, true));
        for &c in children[node].iter().rev() {
            stack.push((c, false));
        }
    }
    (dfn_in, dfn_out)
}

/// Postorder over an adjacency list, iteratively.
fn postorder(n_hint: usize, root: usize, succs: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(n_hint);
    let mut visited = vec![false; succs.len()];
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    visited[root] = true;
    while let Some((node, next)) = stack.pop() {
        if next < succs[node].len() {
            stack.push((node, next + 1));
            let s = succs[node][next];
            if !visited[s] {
                visited[s] = true;
                stack.push((s, 0));
            }
        } else {
            order.push(node);
        }
    }
    order
}

// =============================================================================
// DomTree
// =============================================================================

/// Dominator tree of a function's CFG.
#[derive(Debug, Clone)]
pub struct DomTree {
    entry: ValueId,
    rpo: Vec<ValueId>,
    pos: FxHashMap<ValueId, usize>,
    idom: Vec<usize>,
    children: FxHashMap<ValueId, Vec<ValueId>>,
    frontier: Vec<Vec<usize>>,
    dfn_in: Vec<u32>,
    dfn_out: Vec<u32>,
}

impl DomTree {
    /// Build the tree for a function with an entry block.
    pub fn compute(m: &Module, func: ValueId) -> DomTree {
        let entry = m
            .entry_block(func)
            .expect("dominance requires an entry block");

        // Dense ids for this function's blocks.
        let blocks = &m.func(func).blocks;
        let mut local: FxHashMap<ValueId, usize> = FxHashMap::default();
        for (i, &b) in blocks.iter().enumerate() {
            local.insert(b, i);
        }
        let succs: Vec<Vec<usize>> = blocks
            .iter()
            .map(|&b| {
                m.successors(b)
                    .iter()
                    .filter_map(|s| local.get(s).copied())
                    .collect()
            })
            .collect();

        let mut po = postorder(blocks.len(), local[&entry], &succs);
        po.reverse();
        let rpo: Vec<ValueId> = po.iter().map(|&i| blocks[i]).collect();

        let mut pos: FxHashMap<ValueId, usize> = FxHashMap::default();
        for (i, &b) in rpo.iter().enumerate() {
            pos.insert(b, i);
        }

        // Predecessors restricted to reachable blocks, in RPO positions.
        let preds: Vec<Vec<usize>> = rpo
            .iter()
            .map(|&b| {
                m.predecessors(b)
                    .iter()
                    .filter_map(|p| pos.get(p).copied())
                    .collect()
            })
            .collect();

        let idom = chk_idoms(rpo.len(), &preds);
        let frontier = frontiers(rpo.len(), &preds, &idom);
        let (dfn_in, dfn_out) = euler_intervals(rpo.len(), &idom);

        let mut children: FxHashMap<ValueId, Vec<ValueId>> = FxHashMap::default();
        for i in 1..rpo.len() {
            if idom[i] != UNDEF {
                children.entry(rpo[idom[i]]).or_default().push(rpo[i]);
            }
        }

        DomTree {
            entry,
            rpo,
            pos,
            idom,
            children,
            frontier,
            dfn_in,
            dfn_out,
        }
    }

    /// The entry block.
    #[inline]
    pub fn entry(&self) -> ValueId {
        self.entry
    }

    /// Reachable blocks in reverse postorder.
    #[inline]
    pub fn rpo(&self) -> &[ValueId] {
        &self.rpo
    }

    /// Whether the block is in the tree.
    #[inline]
    pub fn is_reachable(&self, block: ValueId) -> bool {
        self.pos.contains_key(&block)
    }

    fn index_of(&self, block: ValueId) -> AnalysisResult<usize> {
        self.pos
            .get(&block)
            .copied()
            .ok_or(AnalysisError::UnreachableBlock)
    }

    /// Immediate dominator. `idom(entry) == entry`.
    pub fn idom(&self, block: ValueId) -> AnalysisResult<ValueId> {
        let i = self.index_of(block)?;
        Ok(self.rpo[self.idom[i]])
    }

    /// Children in the dominator tree.
    pub fn children(&self, block: ValueId) -> &[ValueId] {
        self.children
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Dominance frontier of a block.
    pub fn frontier(&self, block: ValueId) -> AnalysisResult<Vec<ValueId>> {
        let i = self.index_of(block)?;
        Ok(self.frontier[i].iter().map(|&j| self.rpo[j]).collect())
    }

    /// Whether `a` dominates `b` (reflexively), in O(1) via Euler-tour
    /// interval containment.
    pub fn dominates(&self, a: ValueId, b: ValueId) -> AnalysisResult<bool> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        Ok(self.dfn_in[ia] <= self.dfn_in[ib] && self.dfn_out[ib] <= self.dfn_out[ia])
    }

    /// Whether `a` dominates `b` and `a != b`.
    pub fn strictly_dominates(&self, a: ValueId, b: ValueId) -> AnalysisResult<bool> {
        Ok(a != b && self.dominates(a, b)?)
    }
}

// =============================================================================
// PostDomTree
// =============================================================================

/// Post-dominator tree: the dominator tree of the reverse CFG rooted at a
/// virtual exit that post-dominates every return block and every block
/// with no successors. The virtual exit is never materialized; `ipdom`
/// answers `None` for blocks whose parent is the virtual exit.
#[derive(Debug, Clone)]
pub struct PostDomTree {
    // Position 0 is the virtual exit.
    rpo: Vec<ValueId>,
    pos: FxHashMap<ValueId, usize>,
    idom: Vec<usize>,
    dfn_in: Vec<u32>,
    dfn_out: Vec<u32>,
}

impl PostDomTree {
    /// Build the tree for a function with an entry block.
    pub fn compute(m: &Module, func: ValueId) -> PostDomTree {
        let blocks = &m.func(func).blocks;
        let mut local: FxHashMap<ValueId, usize> = FxHashMap::default();
        for (i, &b) in blocks.iter().enumerate() {
            // Reserve 0 for the virtual exit.
            local.insert(b, i + 1);
        }
        let n = blocks.len() + 1;

        // Reverse-graph successors: virtual exit → every CFG sink, and
        // b → its CFG predecessors.
        let mut rsuccs: Vec<Vec<usize>> = vec![Vec::new(); n];
        for &b in blocks.iter() {
            if m.successors(b).is_empty() {
                rsuccs[0].push(local[&b]);
            }
            for p in m.predecessors(b) {
                if let Some(&pi) = local.get(&p) {
                    rsuccs[local[&b]].push(pi);
                }
            }
        }

        let mut po = postorder(n, 0, &rsuccs);
        po.reverse();

        // Map reverse-graph rpo back to blocks; keep the virtual at 0.
        let rpo: Vec<ValueId> = po
            .iter()
            .map(|&i| {
                if i == 0 {
                    ValueId::INVALID
                } else {
                    blocks[i - 1]
                }
            })
            .collect();
        let mut pos: FxHashMap<ValueId, usize> = FxHashMap::default();
        for (i, &b) in rpo.iter().enumerate() {
            if b.is_valid() {
                pos.insert(b, i);
            }
        }

        // Reverse-graph predecessors in RPO positions: CFG successors,
        // plus the virtual exit for sinks.
        let preds: Vec<Vec<usize>> = rpo
            .iter()
            .map(|&b| {
                if !b.is_valid() {
                    return Vec::new();
                }
                let mut ps: Vec<usize> = m
                    .successors(b)
                    .iter()
                    .filter_map(|s| pos.get(s).copied())
                    .collect();
                if m.successors(b).is_empty() {
                    ps.push(0);
                }
                ps
            })
            .collect();

        let idom = chk_idoms(rpo.len(), &preds);
        let (dfn_in, dfn_out) = euler_intervals(rpo.len(), &idom);

        PostDomTree {
            rpo,
            pos,
            idom,
            dfn_in,
            dfn_out,
        }
    }

    /// Whether the block reaches an exit (is in the tree).
    #[inline]
    pub fn is_reachable(&self, block: ValueId) -> bool {
        self.pos.contains_key(&block)
    }

    fn index_of(&self, block: ValueId) -> AnalysisResult<usize> {
        self.pos
            .get(&block)
            .copied()
            .ok_or(AnalysisError::UnreachableBlock)
    }

    /// Immediate post-dominator, or `None` when it is the virtual exit.
    pub fn ipdom(&self, block: ValueId) -> AnalysisResult<Option<ValueId>> {
        let i = self.index_of(block)?;
        let p = self.rpo[self.idom[i]];
        Ok(p.is_valid().then_some(p))
    }

    /// Whether `a` post-dominates `b` (reflexively).
    pub fn post_dominates(&self, a: ValueId, b: ValueId) -> AnalysisResult<bool> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        Ok(self.dfn_in[ia] <= self.dfn_in[ib] && self.dfn_out[ib] <= self.dfn_out[ia])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;

    /// entry → {then, else} → join
    fn diamond() -> (Module, ValueId, [ValueId; 4]) {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let then_b = m.new_block(f);
        let else_b = m.new_block(f);
        let join = m.new_block(f);

        let cond = m.const_bool(true);
        let x = m.const_int(i32_ty, 1);
        let y = m.const_int(i32_ty, 2);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_cond_br(cond, then_b, else_b);
        b.set_pos_end(then_b);
        b.make_br(join);
        b.set_pos_end(else_b);
        b.make_br(join);
        b.set_pos_end(join);
        let phi = b.make_phi(i32_ty, &[(x, then_b), (y, else_b)]);
        b.make_return(Some(phi));

        (m, f, [entry, then_b, else_b, join])
    }

    #[test]
    fn test_single_block() {
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "main");
        let entry = m.new_entry_block(f);
        let zero = m.const_int(i32_ty, 0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_return(Some(zero));

        let dom = DomTree::compute(&m, f);
        assert_eq!(dom.rpo().len(), 1);
        assert_eq!(dom.idom(entry).unwrap(), entry);
        assert!(dom.dominates(entry, entry).unwrap());
    }

    #[test]
    fn test_diamond_idoms() {
        let (m, f, [entry, then_b, else_b, join]) = diamond();
        let dom = DomTree::compute(&m, f);

        assert_eq!(dom.idom(entry).unwrap(), entry);
        assert_eq!(dom.idom(then_b).unwrap(), entry);
        assert_eq!(dom.idom(else_b).unwrap(), entry);
        // Neither arm dominates the join; the entry does.
        assert_eq!(dom.idom(join).unwrap(), entry);

        assert!(dom.dominates(entry, join).unwrap());
        assert!(!dom.dominates(then_b, join).unwrap());
        assert!(dom.strictly_dominates(entry, then_b).unwrap());
        assert!(!dom.strictly_dominates(entry, entry).unwrap());
    }

    #[test]
    fn test_diamond_frontier() {
        let (m, f, [_, then_b, else_b, join]) = diamond();
        let dom = DomTree::compute(&m, f);

        assert_eq!(dom.frontier(then_b).unwrap(), vec![join]);
        assert_eq!(dom.frontier(else_b).unwrap(), vec![join]);
        assert!(dom.frontier(join).unwrap().is_empty());
    }

    #[test]
    fn test_idom_chain_terminates_at_entry() {
        let (m, f, [entry, _, _, join]) = diamond();
        let dom = DomTree::compute(&m, f);

        let mut cur = join;
        let mut steps = 0;
        while cur != entry {
            cur = dom.idom(cur).unwrap();
            steps += 1;
            assert!(steps < 10, "idom chain does not terminate");
        }
    }

    #[test]
    fn test_unreachable_query_fails() {
        let (mut m, f, _) = diamond();
        let dead = m.new_block(f);
        let i32_ty = m.types.int32();
        let zero = m.const_int(i32_ty, 0);
        let mut b = Builder::new(&mut m);
        b.set_pos_end(dead);
        b.make_return(Some(zero));

        let dom = DomTree::compute(&m, f);
        assert!(!dom.is_reachable(dead));
        assert_eq!(dom.idom(dead), Err(AnalysisError::UnreachableBlock));
        assert_eq!(
            dom.dominates(dead, dead),
            Err(AnalysisError::UnreachableBlock)
        );
    }

    #[test]
    fn test_post_dominance_diamond() {
        let (m, f, [entry, then_b, else_b, join]) = diamond();
        let pdom = PostDomTree::compute(&m, f);

        assert_eq!(pdom.ipdom(then_b).unwrap(), Some(join));
        assert_eq!(pdom.ipdom(else_b).unwrap(), Some(join));
        assert_eq!(pdom.ipdom(entry).unwrap(), Some(join));
        // The return block's parent is the virtual exit.
        assert_eq!(pdom.ipdom(join).unwrap(), None);

        assert!(pdom.post_dominates(join, entry).unwrap());
        assert!(!pdom.post_dominates(then_b, entry).unwrap());
    }

    #[test]
    fn test_loop_shaped_cfg() {
        // entry → header ↔ body, header → exit
        let mut m = Module::new();
        let i32_ty = m.types.int32();
        let fn_ty = m.types.function(i32_ty, vec![]);
        let f = m.new_function(fn_ty, "f");
        let entry = m.new_entry_block(f);
        let header = m.new_block(f);
        let body = m.new_block(f);
        let exit = m.new_block(f);
        let cond = m.const_bool(true);
        let zero = m.const_int(i32_ty, 0);

        let mut b = Builder::new(&mut m);
        b.set_pos_end(entry);
        b.make_br(header);
        b.set_pos_end(header);
        b.make_cond_br(cond, body, exit);
        b.set_pos_end(body);
        b.make_br(header);
        b.set_pos_end(exit);
        b.make_return(Some(zero));

        let dom = DomTree::compute(&m, f);
        assert_eq!(dom.idom(header).unwrap(), entry);
        assert_eq!(dom.idom(body).unwrap(), header);
        assert_eq!(dom.idom(exit).unwrap(), header);
        // The back edge target dominates its source.
        assert!(dom.dominates(header, body).unwrap());
    }
}
