//! Maximum-weight matching on general graphs.
//!
//! Primal-dual form of Edmonds' blossom algorithm, O(n^3). Every vertex
//! carries a dual variable and every non-trivial blossom carries one too. The
//! search grows alternating trees from the free vertices along tight edges
//! (zero slack), shrinks odd cycles into blossoms, augments along paths
//! between two trees and adjusts the duals by the smallest slack whenever
//! nothing is tight. With integer weights all arithmetic stays in integers.
//!
//! Edges are addressed by index `k` and their two endpoints by `2k` (the
//! first vertex) and `2k + 1` (the second), so `p ^ 1` is the opposite end of
//! endpoint `p`. Blossoms reuse the indices `n..2n`.

use log::debug;

use crate::error::{Error, Result};

/// An undirected weighted edge between two vertices of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub u: usize,
    pub v: usize,
    pub weight: i64,
}

impl Edge {
    pub fn new(u: usize, v: usize, weight: i64) -> Self {
        Self { u, v, weight }
    }
}

// Labels of top-level blossoms and of single vertices.
const FREE: u8 = 0;
const OUTER: u8 = 1;
const INNER: u8 = 2;
// Breadcrumb left by `scan_blossom`; always cleared before it returns.
const MARK: u8 = 4;

macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(Error::Invariant(format!($($arg)+)));
        }
    };
}

fn broken(msg: String) -> Error {
    Error::Invariant(msg)
}

/// Computes a maximum-weight matching. With `max_cardinality` set, only
/// matchings of maximum cardinality are considered and the heaviest of those
/// is returned.
///
/// Returns `mate`, where `mate[v]` is the partner of `v` or `None`.
pub fn max_weight_matching(
    n: usize,
    edges: &[Edge],
    max_cardinality: bool,
) -> Result<Vec<Option<usize>>> {
    for e in edges {
        if e.u >= n || e.v >= n || e.u == e.v {
            return Err(Error::InvalidEdge { u: e.u, v: e.v });
        }
    }
    if edges.is_empty() {
        return Ok(vec![None; n]);
    }
    Solver::new(n, edges, max_cardinality).solve()
}

/// Matches the complete graph on `n` vertices so that as many vertices as
/// possible are covered and, among those matchings, the summed `cost` of the
/// chosen edges is smallest. Costs must be non-negative.
///
/// Every maximum-cardinality matching of a complete graph has `n / 2` edges,
/// so maximising `ceiling - cost` over them minimises the total cost.
pub fn min_cost_matching<F>(n: usize, cost: F) -> Result<Vec<Option<usize>>>
where
    F: Fn(usize, usize) -> i64,
{
    let mut costs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for u in 0..n {
        for v in u + 1..n {
            let weight = cost(u, v);
            if weight < 0 {
                return Err(Error::NegativeWeight { u, v, weight });
            }
            costs.push((u, v, weight));
        }
    }
    let ceiling = costs.iter().map(|&(_, _, c)| c).max().unwrap_or(0) + 1;
    let edges: Vec<Edge> = costs
        .into_iter()
        .map(|(u, v, c)| Edge::new(u, v, ceiling - c))
        .collect();

    let mate = max_weight_matching(n, &edges, true)?;

    let unmatched: Vec<usize> = (0..n).filter(|&v| mate[v].is_none()).collect();
    ensure!(
        unmatched.len() == n % 2,
        "complete graph on {n} vertices left vertices {unmatched:?} unmatched"
    );
    Ok(mate)
}

struct Solver<'a> {
    n: usize,
    edges: &'a [Edge],
    max_cardinality: bool,
    /// Vertex at each endpoint.
    endpoint: Vec<usize>,
    /// For each vertex, the remote endpoints of its incident edges.
    neighbours: Vec<Vec<usize>>,
    /// Remote endpoint of the matched edge of each vertex.
    mate: Vec<Option<usize>>,
    label: Vec<u8>,
    /// Endpoint through which a vertex or top-level blossom got its label.
    label_end: Vec<Option<usize>>,
    /// Top-level blossom containing each vertex.
    in_blossom: Vec<usize>,
    parent: Vec<Option<usize>>,
    /// Sub-blossoms around the cycle, starting with the one holding the base.
    children: Vec<Vec<usize>>,
    base: Vec<Option<usize>>,
    /// `endps[b][i]` joins `children[b][i]` to `children[b][i + 1]`.
    endps: Vec<Vec<usize>>,
    /// Least-slack edge to a different outer blossom.
    best_edge: Vec<Option<usize>>,
    /// Per outer blossom, least-slack edges to each neighbouring outer blossom.
    best_edges: Vec<Option<Vec<usize>>>,
    unused: Vec<usize>,
    dual: Vec<i64>,
    allowed: Vec<bool>,
    queue: Vec<usize>,
}

enum DualStep {
    /// No further augmentation is possible.
    Stop,
    /// An edge from an outer vertex to a free one became tight.
    Grow(usize),
    /// An edge between two outer blossoms became tight.
    Link(usize),
    /// An inner blossom's dual reached zero.
    Expand(usize),
}

impl<'a> Solver<'a> {
    fn new(n: usize, edges: &'a [Edge], max_cardinality: bool) -> Self {
        let max_weight = edges.iter().map(|e| e.weight).max().unwrap_or(0).max(0);

        let endpoint = edges.iter().flat_map(|e| [e.u, e.v]).collect();
        let mut neighbours = vec![Vec::new(); n];
        for (k, e) in edges.iter().enumerate() {
            neighbours[e.u].push(2 * k + 1);
            neighbours[e.v].push(2 * k);
        }

        let mut dual = vec![max_weight; n];
        dual.extend(std::iter::repeat(0).take(n));

        Self {
            n,
            edges,
            max_cardinality,
            endpoint,
            neighbours,
            mate: vec![None; n],
            label: vec![FREE; 2 * n],
            label_end: vec![None; 2 * n],
            in_blossom: (0..n).collect(),
            parent: vec![None; 2 * n],
            children: vec![Vec::new(); 2 * n],
            base: (0..n)
                .map(Some)
                .chain(std::iter::repeat(None).take(n))
                .collect(),
            endps: vec![Vec::new(); 2 * n],
            best_edge: vec![None; 2 * n],
            best_edges: vec![None; 2 * n],
            unused: (n..2 * n).collect(),
            dual,
            allowed: vec![false; edges.len()],
            queue: Vec::new(),
        }
    }

    fn slack(&self, k: usize) -> i64 {
        let e = self.edges[k];
        self.dual[e.u] + self.dual[e.v] - 2 * e.weight
    }

    fn base_of(&self, b: usize) -> Result<usize> {
        self.base[b].ok_or_else(|| broken(format!("blossom {b} has no base")))
    }

    fn leaves(&self, b: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_leaves(b, &mut out);
        out
    }

    fn collect_leaves(&self, b: usize, out: &mut Vec<usize>) {
        if b < self.n {
            out.push(b);
        } else {
            for &t in &self.children[b] {
                self.collect_leaves(t, out);
            }
        }
    }

    /// Labels `w` and its top-level blossom, reached through endpoint `p`.
    /// An inner label propagates an outer label to the base's mate.
    fn assign_label(&mut self, w: usize, t: u8, p: Option<usize>) -> Result<()> {
        let b = self.in_blossom[w];
        ensure!(
            self.label[w] == FREE && self.label[b] == FREE,
            "vertex {w} in blossom {b} labelled twice"
        );
        self.label[w] = t;
        self.label[b] = t;
        self.label_end[w] = p;
        self.label_end[b] = p;
        self.best_edge[w] = None;
        self.best_edge[b] = None;
        if t == OUTER {
            let leaves = self.leaves(b);
            self.queue.extend(leaves);
        } else if t == INNER {
            let base = self.base_of(b)?;
            let m = self.mate[base]
                .ok_or_else(|| broken(format!("inner blossom {b} has unmatched base {base}")))?;
            let next = self.endpoint[m];
            self.assign_label(next, OUTER, Some(m ^ 1))?;
        }
        Ok(())
    }

    /// Walks up from `v` and `w` towards the tree roots. Returns the base of
    /// the new blossom when both paths meet, or `None` when they end in
    /// different roots (an augmenting path).
    fn scan_blossom(&mut self, v: usize, w: usize) -> Result<Option<usize>> {
        let mut path = Vec::new();
        let mut base = None;
        let (mut v, mut w) = (Some(v), Some(w));
        while let Some(cur) = v {
            let b = self.in_blossom[cur];
            if self.label[b] & MARK != 0 {
                base = Some(self.base_of(b)?);
                break;
            }
            ensure!(self.label[b] == OUTER, "scan reached non-outer blossom {b}");
            path.push(b);
            self.label[b] = OUTER | MARK;
            ensure!(
                self.label_end[b] == self.mate[self.base_of(b)?],
                "outer blossom {b} not labelled through its base's mate"
            );
            v = match self.label_end[b] {
                None => None,
                Some(p) => {
                    let bt = self.in_blossom[self.endpoint[p]];
                    ensure!(self.label[bt] == INNER, "blossom {bt} above {b} is not inner");
                    let q = self.label_end[bt]
                        .ok_or_else(|| broken(format!("inner blossom {bt} has no label edge")))?;
                    Some(self.endpoint[q])
                }
            };
            if w.is_some() {
                std::mem::swap(&mut v, &mut w);
            }
        }
        for b in path {
            self.label[b] = OUTER;
        }
        Ok(base)
    }

    /// Shrinks the cycle closed by edge `k` into a new outer blossom with the
    /// given base.
    fn add_blossom(&mut self, base: usize, k: usize) -> Result<()> {
        let Edge { u: v, v: w, .. } = self.edges[k];
        let bb = self.in_blossom[base];
        let mut bv = self.in_blossom[v];
        let mut bw = self.in_blossom[w];
        let b = self
            .unused
            .pop()
            .ok_or_else(|| broken("no free blossom slot".to_owned()))?;
        self.base[b] = Some(base);
        self.parent[b] = None;
        self.parent[bb] = Some(b);

        let mut path = Vec::new();
        let mut endps = Vec::new();
        while bv != bb {
            self.parent[bv] = Some(b);
            path.push(bv);
            let p = self.label_end[bv]
                .ok_or_else(|| broken(format!("blossom {bv} on cycle has no label edge")))?;
            endps.push(p);
            ensure!(
                self.label[bv] == INNER
                    || (self.label[bv] == OUTER
                        && self.label_end[bv] == self.mate[self.base_of(bv)?]),
                "blossom {bv} on cycle has inconsistent label"
            );
            bv = self.in_blossom[self.endpoint[p]];
        }
        path.push(bb);
        path.reverse();
        endps.reverse();
        endps.push(2 * k);
        while bw != bb {
            self.parent[bw] = Some(b);
            path.push(bw);
            let p = self.label_end[bw]
                .ok_or_else(|| broken(format!("blossom {bw} on cycle has no label edge")))?;
            endps.push(p ^ 1);
            bw = self.in_blossom[self.endpoint[p]];
        }
        ensure!(self.label[bb] == OUTER, "blossom base {bb} is not outer");

        self.children[b] = path.clone();
        self.endps[b] = endps;
        self.label[b] = OUTER;
        self.label_end[b] = self.label_end[bb];
        self.dual[b] = 0;

        for leaf in self.leaves(b) {
            if self.label[self.in_blossom[leaf]] == INNER {
                // Former inner vertices become outer and must be scanned.
                self.queue.push(leaf);
            }
            self.in_blossom[leaf] = b;
        }

        let mut best_to: Vec<Option<usize>> = vec![None; 2 * self.n];
        for &sub in &path {
            let lists: Vec<Vec<usize>> = match self.best_edges[sub].take() {
                Some(list) => vec![list],
                None => self
                    .leaves(sub)
                    .into_iter()
                    .map(|leaf| self.neighbours[leaf].iter().map(|p| p / 2).collect())
                    .collect(),
            };
            for list in lists {
                for k in list {
                    let e = self.edges[k];
                    let j = if self.in_blossom[e.v] == b { e.u } else { e.v };
                    let bj = self.in_blossom[j];
                    if bj != b
                        && self.label[bj] == OUTER
                        && best_to[bj].map_or(true, |cur| self.slack(k) < self.slack(cur))
                    {
                        best_to[bj] = Some(k);
                    }
                }
            }
            self.best_edge[sub] = None;
        }
        let best: Vec<usize> = best_to.into_iter().flatten().collect();
        self.best_edge[b] = None;
        for &k in &best {
            if self.best_edge[b].map_or(true, |cur| self.slack(k) < self.slack(cur)) {
                self.best_edge[b] = Some(k);
            }
        }
        self.best_edges[b] = Some(best);
        debug!("shrank blossom {b} with base {base} over {} children", path.len());
        Ok(())
    }

    /// Dissolves blossom `b`. Mid-stage expansion of an inner blossom relabels
    /// the part of its cycle that stays on the alternating path.
    fn expand_blossom(&mut self, b: usize, end_stage: bool) -> Result<()> {
        let children = self.children[b].clone();
        for &s in &children {
            self.parent[s] = None;
            if s < self.n {
                self.in_blossom[s] = s;
            } else if end_stage && self.dual[s] == 0 {
                self.expand_blossom(s, end_stage)?;
            } else {
                for leaf in self.leaves(s) {
                    self.in_blossom[leaf] = s;
                }
            }
        }

        if !end_stage && self.label[b] == INNER {
            let entry = self.label_end[b]
                .ok_or_else(|| broken(format!("inner blossom {b} has no label edge")))?;
            let entry_child = self.in_blossom[self.endpoint[entry ^ 1]];
            let len = children.len() as isize;
            let at = |j: isize| j.rem_euclid(len) as usize;
            let mut j = children
                .iter()
                .position(|&c| c == entry_child)
                .ok_or_else(|| broken(format!("entry child {entry_child} not in blossom {b}")))?
                as isize;
            // Walk the even-length side of the cycle back to the base.
            let (step, trick): (isize, usize) = if j & 1 == 1 {
                j -= len;
                (1, 0)
            } else {
                (-1, 1)
            };
            let endps = self.endps[b].clone();
            let mut p = entry;
            while j != 0 {
                let q = endps[at(j - trick as isize)];
                self.label[self.endpoint[p ^ 1]] = FREE;
                self.label[self.endpoint[q ^ trick ^ 1]] = FREE;
                let target = self.endpoint[p ^ 1];
                self.assign_label(target, INNER, Some(p))?;
                self.allowed[q / 2] = true;
                j += step;
                p = endps[at(j - trick as isize)] ^ trick;
                self.allowed[p / 2] = true;
                j += step;
            }
            let bv = children[at(j)];
            let target = self.endpoint[p ^ 1];
            self.label[target] = INNER;
            self.label[bv] = INNER;
            self.label_end[target] = Some(p);
            self.label_end[bv] = Some(p);
            self.best_edge[bv] = None;
            j += step;
            while children[at(j)] != entry_child {
                let bv = children[at(j)];
                if self.label[bv] == OUTER {
                    j += step;
                    continue;
                }
                let labelled = self.leaves(bv).into_iter().find(|&v| self.label[v] != FREE);
                if let Some(v) = labelled {
                    ensure!(self.label[v] == INNER, "vertex {v} in blossom {bv} is not inner");
                    ensure!(self.in_blossom[v] == bv, "vertex {v} escaped blossom {bv}");
                    self.label[v] = FREE;
                    let base = self.base_of(bv)?;
                    let m = self.mate[base].ok_or_else(|| {
                        broken(format!("base {base} of blossom {bv} is unmatched"))
                    })?;
                    self.label[self.endpoint[m]] = FREE;
                    let via = self.label_end[v];
                    self.assign_label(v, INNER, via)?;
                }
                j += step;
            }
        }

        self.label[b] = FREE;
        self.label_end[b] = None;
        self.children[b].clear();
        self.endps[b].clear();
        self.base[b] = None;
        self.best_edges[b] = None;
        self.best_edge[b] = None;
        self.unused.push(b);
        Ok(())
    }

    /// Flips the matching inside blossom `b` so that vertex `v` becomes its
    /// base.
    fn augment_blossom(&mut self, b: usize, v: usize) -> Result<()> {
        let mut t = v;
        while self.parent[t] != Some(b) {
            t = self.parent[t]
                .ok_or_else(|| broken(format!("vertex {v} is not inside blossom {b}")))?;
        }
        if t >= self.n {
            self.augment_blossom(t, v)?;
        }
        let len = self.children[b].len() as isize;
        let at = |j: isize| j.rem_euclid(len) as usize;
        let i = self.children[b]
            .iter()
            .position(|&c| c == t)
            .ok_or_else(|| broken(format!("child {t} missing from blossom {b}")))?;
        let mut j = i as isize;
        let (step, trick): (isize, usize) = if j & 1 == 1 {
            j -= len;
            (1, 0)
        } else {
            (-1, 1)
        };
        while j != 0 {
            j += step;
            let t = self.children[b][at(j)];
            let p = self.endps[b][at(j - trick as isize)] ^ trick;
            if t >= self.n {
                let inner = self.endpoint[p];
                self.augment_blossom(t, inner)?;
            }
            j += step;
            let t = self.children[b][at(j)];
            if t >= self.n {
                let inner = self.endpoint[p ^ 1];
                self.augment_blossom(t, inner)?;
            }
            let (x, y) = (self.endpoint[p], self.endpoint[p ^ 1]);
            self.mate[x] = Some(p ^ 1);
            self.mate[y] = Some(p);
        }
        self.children[b].rotate_left(i);
        self.endps[b].rotate_left(i);
        self.base[b] = self.base[self.children[b][0]];
        ensure!(
            self.base[b] == Some(v),
            "blossom {b} rotated to base {:?} instead of {v}",
            self.base[b]
        );
        Ok(())
    }

    /// Flips the augmenting path through edge `k` back to both tree roots.
    fn augment_matching(&mut self, k: usize) -> Result<()> {
        let e = self.edges[k];
        for (mut s, mut p) in [(e.u, 2 * k + 1), (e.v, 2 * k)] {
            loop {
                let bs = self.in_blossom[s];
                ensure!(self.label[bs] == OUTER, "augmenting path enters non-outer blossom {bs}");
                ensure!(
                    self.label_end[bs] == self.mate[self.base_of(bs)?],
                    "outer blossom {bs} not labelled through its base's mate"
                );
                if bs >= self.n {
                    self.augment_blossom(bs, s)?;
                }
                self.mate[s] = Some(p);
                let Some(up) = self.label_end[bs] else {
                    // Reached a tree root.
                    break;
                };
                let t = self.endpoint[up];
                let bt = self.in_blossom[t];
                ensure!(self.label[bt] == INNER, "blossom {bt} above {bs} is not inner");
                let q = self.label_end[bt]
                    .ok_or_else(|| broken(format!("inner blossom {bt} has no label edge")))?;
                s = self.endpoint[q];
                let j = self.endpoint[q ^ 1];
                ensure!(
                    self.base[bt] == Some(t),
                    "inner blossom {bt} entered at {t} instead of its base"
                );
                if bt >= self.n {
                    self.augment_blossom(bt, j)?;
                }
                self.mate[j] = Some(q);
                p = q ^ 1;
            }
        }
        Ok(())
    }

    /// Picks the dual adjustment: the smallest step that makes an edge tight,
    /// zeroes an inner blossom's dual, or (without the cardinality
    /// constraint) zeroes a vertex dual.
    fn next_dual_step(&self) -> Result<(i64, DualStep)> {
        let n = self.n;
        let mut best: Option<(i64, DualStep)> = None;
        let improves = |best: &Option<(i64, DualStep)>, d: i64| {
            best.as_ref().map_or(true, |(cur, _)| d < *cur)
        };

        if !self.max_cardinality {
            let d = self.dual[..n].iter().copied().min().unwrap_or(0);
            best = Some((d, DualStep::Stop));
        }
        for v in 0..n {
            if self.label[self.in_blossom[v]] == FREE {
                if let Some(k) = self.best_edge[v] {
                    let d = self.slack(k);
                    if improves(&best, d) {
                        best = Some((d, DualStep::Grow(k)));
                    }
                }
            }
        }
        for b in 0..2 * n {
            if self.parent[b].is_none() && self.label[b] == OUTER {
                if let Some(k) = self.best_edge[b] {
                    let slack = self.slack(k);
                    ensure!(slack % 2 == 0, "odd slack {slack} on edge {k} between outer blossoms");
                    let d = slack / 2;
                    if improves(&best, d) {
                        best = Some((d, DualStep::Link(k)));
                    }
                }
            }
        }
        for b in n..2 * n {
            if self.base[b].is_some()
                && self.parent[b].is_none()
                && self.label[b] == INNER
                && improves(&best, self.dual[b])
            {
                best = Some((self.dual[b], DualStep::Expand(b)));
            }
        }

        match best {
            Some(step) => Ok(step),
            None => {
                // Only reachable when the cardinality constraint disabled the
                // vertex-dual bound: the matching is already maximum.
                ensure!(self.max_cardinality, "no dual step available");
                let d = self.dual[..n].iter().copied().min().unwrap_or(0).max(0);
                Ok((d, DualStep::Stop))
            }
        }
    }

    fn scan_queue(&mut self) -> Result<bool> {
        while let Some(v) = self.queue.pop() {
            ensure!(
                self.label[self.in_blossom[v]] == OUTER,
                "queued vertex {v} is not outer"
            );
            for idx in 0..self.neighbours[v].len() {
                let p = self.neighbours[v][idx];
                let k = p / 2;
                let w = self.endpoint[p];
                if self.in_blossom[v] == self.in_blossom[w] {
                    continue;
                }
                let mut kslack = 0;
                if !self.allowed[k] {
                    kslack = self.slack(k);
                    if kslack <= 0 {
                        self.allowed[k] = true;
                    }
                }
                if self.allowed[k] {
                    let w_label = self.label[self.in_blossom[w]];
                    if w_label == FREE {
                        self.assign_label(w, INNER, Some(p ^ 1))?;
                    } else if w_label == OUTER {
                        match self.scan_blossom(v, w)? {
                            Some(base) => self.add_blossom(base, k)?,
                            None => {
                                self.augment_matching(k)?;
                                return Ok(true);
                            }
                        }
                    } else if self.label[w] == FREE {
                        ensure!(w_label == INNER, "vertex {w} sits in an unlabelled blossom");
                        self.label[w] = INNER;
                        self.label_end[w] = Some(p ^ 1);
                    }
                } else if self.label[self.in_blossom[w]] == OUTER {
                    let b = self.in_blossom[v];
                    if self.best_edge[b].map_or(true, |cur| kslack < self.slack(cur)) {
                        self.best_edge[b] = Some(k);
                    }
                } else if self.label[w] == FREE
                    && self.best_edge[w].map_or(true, |cur| kslack < self.slack(cur))
                {
                    self.best_edge[w] = Some(k);
                }
            }
        }
        Ok(false)
    }

    fn solve(mut self) -> Result<Vec<Option<usize>>> {
        let n = self.n;
        let mut augmentations = 0;
        let mut dual_steps = 0;

        for _ in 0..n {
            self.label.fill(FREE);
            self.best_edge.fill(None);
            for b in n..2 * n {
                self.best_edges[b] = None;
            }
            self.allowed.fill(false);
            self.queue.clear();

            for v in 0..n {
                if self.mate[v].is_none() && self.label[self.in_blossom[v]] == FREE {
                    self.assign_label(v, OUTER, None)?;
                }
            }

            let mut augmented = false;
            loop {
                if self.scan_queue()? {
                    augmented = true;
                    break;
                }

                let (delta, step) = self.next_dual_step()?;
                dual_steps += 1;
                for v in 0..n {
                    match self.label[self.in_blossom[v]] {
                        OUTER => self.dual[v] -= delta,
                        INNER => self.dual[v] += delta,
                        _ => {}
                    }
                }
                for b in n..2 * n {
                    if self.base[b].is_some() && self.parent[b].is_none() {
                        match self.label[b] {
                            OUTER => self.dual[b] += delta,
                            INNER => self.dual[b] -= delta,
                            _ => {}
                        }
                    }
                }

                match step {
                    DualStep::Stop => break,
                    DualStep::Grow(k) => {
                        self.allowed[k] = true;
                        let e = self.edges[k];
                        let i = if self.label[self.in_blossom[e.u]] == FREE { e.v } else { e.u };
                        ensure!(
                            self.label[self.in_blossom[i]] == OUTER,
                            "tightened edge {k} has no outer end"
                        );
                        self.queue.push(i);
                    }
                    DualStep::Link(k) => {
                        self.allowed[k] = true;
                        let i = self.edges[k].u;
                        ensure!(
                            self.label[self.in_blossom[i]] == OUTER,
                            "tightened edge {k} has no outer end"
                        );
                        self.queue.push(i);
                    }
                    DualStep::Expand(b) => self.expand_blossom(b, false)?,
                }
            }

            if !augmented {
                break;
            }
            augmentations += 1;

            for b in n..2 * n {
                if self.parent[b].is_none()
                    && self.base[b].is_some()
                    && self.label[b] == OUTER
                    && self.dual[b] == 0
                {
                    self.expand_blossom(b, true)?;
                }
            }
        }

        let mut mate = vec![None; n];
        for v in 0..n {
            if let Some(p) = self.mate[v] {
                mate[v] = Some(self.endpoint[p]);
            }
        }
        for v in 0..n {
            if let Some(w) = mate[v] {
                ensure!(
                    mate[w] == Some(v),
                    "vertex {v} is matched to {w} but {w} is matched to {:?}",
                    mate[w]
                );
            }
        }
        debug!(
            "matched {n} vertices: {augmentations} augmentations, {dual_steps} dual updates"
        );
        Ok(mate)
    }
}
