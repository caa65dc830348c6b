//! W-graph extraction from completed KL data, and its cell decomposition.
//!
//! Vertices are block elements; for a mu pair `x < y` there is an edge
//! `u -> v` labelled `mu(x, y)` whenever the descent set of `v` is not
//! contained in that of `u`. Cells are the strong components; the induced
//! graph on cells is acyclic.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashSet;

use crate::bitset::RankFlags;
use crate::block::{BlockElt, MuCoeff};
use crate::error::{KlError, Result};
use crate::kl::KlContext;

/// Directed labelled graph on block elements with per-vertex descent sets.
pub struct WGraph {
    rank: usize,
    edges: Vec<Vec<BlockElt>>,
    coeffs: Vec<Vec<MuCoeff>>,
    descent: Vec<RankFlags>,
}

impl WGraph {
    pub fn empty(rank: usize, size: usize) -> Self {
        WGraph {
            rank,
            edges: vec![Vec::new(); size],
            coeffs: vec![Vec::new(); size],
            descent: vec![RankFlags::EMPTY; size],
        }
    }

    /// Extract the W-graph of a filled context.
    pub fn from_kl(ctx: &KlContext<'_>) -> Result<WGraph> {
        if !ctx.is_filled() {
            return Err(KlError::NotFilled { y: ctx.size() });
        }
        let n = ctx.size() as usize;
        let mut wg = WGraph::empty(ctx.rank(), n);
        for x in 0..n as BlockElt {
            wg.descent[x as usize] = ctx.descent_set(x);
        }
        for y in 0..n as BlockElt {
            for &(x, m) in ctx.mu_row(y) {
                wg.add_mu_pair(x, y, m);
            }
        }
        Ok(wg)
    }

    /// Record the edges induced by one non-zero `mu(x, y)` with `x < y`.
    pub fn add_mu_pair(&mut self, x: BlockElt, y: BlockElt, m: MuCoeff) {
        let dx = self.descent[x as usize];
        let dy = self.descent[y as usize];
        if !dy.is_subset_of(dx) {
            self.edges[x as usize].push(y);
            self.coeffs[x as usize].push(m);
        }
        if !dx.is_subset_of(dy) {
            self.edges[y as usize].push(x);
            self.coeffs[y as usize].push(m);
        }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_list(&self, x: BlockElt) -> &[BlockElt] {
        &self.edges[x as usize]
    }

    pub fn coeff_list(&self, x: BlockElt) -> &[MuCoeff] {
        &self.coeffs[x as usize]
    }

    pub fn descent(&self, x: BlockElt) -> RankFlags {
        self.descent[x as usize]
    }

    pub fn set_descent(&mut self, x: BlockElt, d: RankFlags) {
        self.descent[x as usize] = d;
    }

    /// Labelled edge multiset, for comparisons across extraction paths.
    pub fn edge_multiset(&self) -> Vec<(BlockElt, BlockElt, MuCoeff)> {
        let mut out = Vec::new();
        for u in 0..self.size() as BlockElt {
            for (i, &v) in self.edge_list(u).iter().enumerate() {
                out.push((u, v, self.coeffs[u as usize][i]));
            }
        }
        out.sort_unstable();
        out
    }

    /// Strong component decomposition, cells numbered in topological order
    /// of the induced graph.
    pub fn cells(&self) -> DecomposedWGraph {
        let n = self.size();
        let mut g = DiGraph::<(), ()>::with_capacity(n, n);
        for _ in 0..n {
            g.add_node(());
        }
        for u in 0..n {
            for &v in &self.edges[u] {
                g.add_edge(NodeIndex::new(u), NodeIndex::new(v as usize), ());
            }
        }

        // tarjan returns reverse topological order
        let mut sccs = tarjan_scc(&g);
        sccs.reverse();

        let mut partition = vec![0u32; n];
        let mut members: Vec<Vec<BlockElt>> = Vec::with_capacity(sccs.len());
        for (c, scc) in sccs.iter().enumerate() {
            let mut ids: Vec<BlockElt> = scc.iter().map(|ix| ix.index() as BlockElt).collect();
            ids.sort_unstable();
            for &v in &ids {
                partition[v as usize] = c as u32;
            }
            members.push(ids);
        }

        let mut cells = Vec::with_capacity(members.len());
        for ids in &members {
            let mut cell = WGraph::empty(self.rank, ids.len());
            for (local, &v) in ids.iter().enumerate() {
                cell.descent[local] = self.descent[v as usize];
                for (i, &w) in self.edges[v as usize].iter().enumerate() {
                    if let Ok(wl) = ids.binary_search(&w) {
                        cell.edges[local].push(wl as BlockElt);
                        cell.coeffs[local].push(self.coeffs[v as usize][i]);
                    }
                }
            }
            cells.push(cell);
        }

        let mut seen = FxHashSet::default();
        let mut induced = vec![Vec::new(); members.len()];
        for u in 0..n {
            let cu = partition[u];
            for &v in &self.edges[u] {
                let cv = partition[v as usize];
                if cu != cv && seen.insert((cu, cv)) {
                    induced[cu as usize].push(cv);
                }
            }
        }
        for l in &mut induced {
            l.sort_unstable();
        }

        DecomposedWGraph {
            rank: self.rank,
            cells,
            members,
            partition,
            induced,
        }
    }
}

/// Strong components of a W-graph with the induced acyclic cell graph.
pub struct DecomposedWGraph {
    rank: usize,
    cells: Vec<WGraph>,
    members: Vec<Vec<BlockElt>>,
    partition: Vec<u32>,
    induced: Vec<Vec<u32>>,
}

impl DecomposedWGraph {
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Restriction of the W-graph to cell `c`, vertices renumbered locally.
    pub fn cell(&self, c: usize) -> &WGraph {
        &self.cells[c]
    }

    /// Original block elements of cell `c`, ascending.
    pub fn cell_members(&self, c: usize) -> &[BlockElt] {
        &self.members[c]
    }

    /// Cell number of each block element.
    pub fn partition(&self) -> &[u32] {
        &self.partition
    }

    /// Adjacency of the induced graph on cells.
    pub fn induced_graph(&self, c: usize) -> &[u32] {
        &self.induced[c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(bits: &[usize]) -> RankFlags {
        let mut f = RankFlags::EMPTY;
        for &b in bits {
            f.set(b);
        }
        f
    }

    /// Two mutually connected vertices plus one sink below them.
    fn triangle() -> WGraph {
        let mut wg = WGraph::empty(2, 3);
        wg.set_descent(0, flags(&[]));
        wg.set_descent(1, flags(&[0]));
        wg.set_descent(2, flags(&[1]));
        wg.add_mu_pair(1, 2, 1); // incomparable descents: both directions
        wg.add_mu_pair(0, 1, 2); // only upward
        wg
    }

    #[test]
    fn edge_rule_follows_descent_containment() {
        let wg = triangle();
        // incomparable descent sets give both directions
        assert_eq!(wg.edge_list(1), &[2]);
        assert_eq!(wg.edge_list(2), &[1]);
        // the empty descent set is contained in everything: upward edge only
        assert_eq!(wg.edge_list(0), &[1]);
        assert_eq!(wg.coeff_list(0), &[2]);
    }

    #[test]
    fn cells_and_induced_dag() {
        let wg = triangle();
        let dec = wg.cells();
        assert_eq!(dec.cell_count(), 2);
        // vertex 0 alone, vertices 1 and 2 together
        let mut sizes: Vec<_> = (0..dec.cell_count()).map(|c| dec.cell_members(c).len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
        let pair_cell = (0..dec.cell_count())
            .find(|&c| dec.cell_members(c).len() == 2)
            .unwrap();
        assert_eq!(dec.cell_members(pair_cell), &[1, 2]);
        // the restriction keeps the internal double edge
        let cell = dec.cell(pair_cell);
        assert_eq!(cell.edge_list(0), &[1]);
        assert_eq!(cell.edge_list(1), &[0]);
        // partition is consistent
        assert_eq!(dec.partition()[1], dec.partition()[2]);
        assert_ne!(dec.partition()[0], dec.partition()[1]);
    }

    #[test]
    fn induced_graph_is_topologically_ordered() {
        let wg = triangle();
        let dec = wg.cells();
        for c in 0..dec.cell_count() {
            for &d in dec.induced_graph(c) {
                assert!(d > c as u32, "induced edges go forward");
            }
        }
    }
}
