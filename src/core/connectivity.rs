use std::collections::{BTreeMap, VecDeque};

use hashbrown::HashMap;
use nalgebra::DMatrix;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prng::Prng;

pub type NodeId = usize;

/// Partition registered on every matrix; covers every node.
pub const ALL_NODES: &str = "all";

/// Which degree sequence `randomize` holds fixed.
///
/// - `Binary`: the unweighted degree of every node (weights travel with their
///   edges, so the weight multiset is preserved but node strengths may drift).
/// - `Strength`: only swaps between equally weighted edges are accepted, which
///   additionally keeps every node's weighted degree exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DegreePreservation {
    #[default]
    Binary,
    Strength,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapReport {
    pub attempted: usize,
    pub accepted: usize,
}

/// A coupling-scaled copy of the base connectivity, handed to each
/// `simulate` call. It is never mutated after construction.
#[derive(Debug, Clone)]
pub struct CoupledWeights {
    alpha: f64,
    w: DMatrix<f64>,
}

impl CoupledWeights {
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.w
    }

    pub fn n_nodes(&self) -> usize {
        self.w.nrows()
    }
}

/// Structural connectome used as reservoir wiring, plus named node partitions
/// (cortical/subcortical masks, resting-state modules, ...).
#[derive(Debug, Clone)]
pub struct ConnectivityMatrix {
    w: DMatrix<f64>,
    partitions: HashMap<String, Vec<NodeId>>,
}

impl ConnectivityMatrix {
    pub fn new(w: DMatrix<f64>) -> Result<Self> {
        if !w.is_square() {
            return Err(Error::mismatch("connectivity columns", w.nrows(), w.ncols()));
        }
        if w.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(
                "connectivity matrix contains non-finite weights".into(),
            ));
        }

        let mut partitions = HashMap::new();
        partitions.insert(ALL_NODES.to_string(), (0..w.nrows()).collect());

        Ok(Self { w, partitions })
    }

    pub fn n_nodes(&self) -> usize {
        self.w.nrows()
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.w
    }

    pub fn register_partition(&mut self, name: impl Into<String>, mut nodes: Vec<NodeId>) -> Result<()> {
        let n = self.n_nodes();
        if let Some(&bad) = nodes.iter().find(|&&i| i >= n) {
            return Err(Error::mismatch("partition node index bound", n, bad + 1));
        }
        nodes.sort_unstable();
        nodes.dedup();
        self.partitions.insert(name.into(), nodes);
        Ok(())
    }

    /// Registers `name` for nodes where `mask` is true and `complement` for the rest.
    pub fn register_mask(&mut self, name: &str, complement: &str, mask: &[bool]) -> Result<()> {
        if mask.len() != self.n_nodes() {
            return Err(Error::mismatch("partition mask length", self.n_nodes(), mask.len()));
        }
        let (inside, outside): (Vec<NodeId>, Vec<NodeId>) = (0..mask.len()).partition(|&i| mask[i]);
        self.register_partition(name, inside)?;
        self.register_partition(complement, outside)
    }

    /// One partition per distinct label, named after the label.
    pub fn register_labels<L: ToString>(&mut self, labels: &[L]) -> Result<()> {
        if labels.len() != self.n_nodes() {
            return Err(Error::mismatch("node label count", self.n_nodes(), labels.len()));
        }
        let mut groups: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
        for (node, label) in labels.iter().enumerate() {
            groups.entry(label.to_string()).or_default().push(node);
        }
        for (name, nodes) in groups {
            self.register_partition(name, nodes)?;
        }
        Ok(())
    }

    pub fn partition_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.partitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Ordered node indices of a registered partition. May be empty.
    pub fn get_nodes(&self, node_set: &str) -> Result<Vec<NodeId>> {
        self.partitions
            .get(node_set)
            .cloned()
            .ok_or_else(|| Error::UnknownPartition(node_set.to_string()))
    }

    /// `count` nodes drawn without replacement from a partition, returned sorted.
    pub fn sample_nodes(&self, node_set: &str, count: usize, rng: &mut Prng) -> Result<Vec<NodeId>> {
        let mut pool = self.get_nodes(node_set)?;
        if count > pool.len() {
            return Err(Error::InvalidInput(format!(
                "cannot sample {count} nodes from partition `{node_set}` of size {}",
                pool.len()
            )));
        }
        rng.shuffle(&mut pool);
        pool.truncate(count);
        pool.sort_unstable();
        Ok(pool)
    }

    pub fn is_symmetric(&self) -> bool {
        is_symmetric(&self.w)
    }

    /// Off-diagonal edges; undirected edges count once for a symmetric matrix.
    pub fn n_edges(&self) -> usize {
        self.edge_list(self.is_symmetric()).len()
    }

    /// Unweighted out-degree per node (equal to the degree for a symmetric matrix).
    pub fn degrees(&self) -> Vec<usize> {
        self.w
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .filter(|&(j, v)| j != i && *v != 0.0)
                    .count()
            })
            .collect()
    }

    pub fn in_degrees(&self) -> Vec<usize> {
        self.w
            .column_iter()
            .enumerate()
            .map(|(j, col)| {
                col.iter()
                    .enumerate()
                    .filter(|&(i, v)| i != j && *v != 0.0)
                    .count()
            })
            .collect()
    }

    /// Weighted out-degree (row sums).
    pub fn strengths(&self) -> Vec<f64> {
        self.w.row_iter().map(|row| row.sum()).collect()
    }

    pub fn in_strengths(&self) -> Vec<f64> {
        self.w.column_iter().map(|col| col.sum()).collect()
    }

    pub fn spectral_radius(&self) -> f64 {
        spectral_radius(&self.w)
    }

    /// Divides by the largest absolute weight, then by the spectral radius, so
    /// that `coupled(alpha)` has spectral radius `alpha`.
    ///
    /// Returns the spectral radius of the matrix as it was before the call.
    pub fn scale_and_normalize(&mut self) -> Result<f64> {
        let max_abs = self.w.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if max_abs == 0.0 {
            return Err(Error::DegenerateMatrix("all weights are zero".into()));
        }
        // After scaling the largest weight is 1, so the radius test is
        // independent of the connectome's units.
        let scaled = &self.w / max_abs;
        let rho_scaled = spectral_radius(&scaled);
        if rho_scaled < 1e-12 {
            return Err(Error::DegenerateMatrix(format!(
                "spectral radius is zero ({rho_scaled:e} after scaling)"
            )));
        }

        self.w = scaled / rho_scaled;
        let rho = rho_scaled * max_abs;

        debug!(rho, max_abs, "connectivity normalized to unit spectral radius");
        Ok(rho)
    }

    pub fn coupled(&self, alpha: f64) -> CoupledWeights {
        CoupledWeights {
            alpha,
            w: &self.w * alpha,
        }
    }

    /// Degree-preserving rewiring, in place.
    ///
    /// Makes `swaps * n_edges` attempts. Each picks two edges (a,b), (c,d) and
    /// proposes (a,d), (c,b). Proposals that would create a self-loop or a
    /// duplicate edge, or split a connected component, are rejected. A
    /// symmetric matrix is rewired as an undirected graph; anything else keeps
    /// in- and out-degrees separately.
    pub fn randomize(
        &mut self,
        swaps: usize,
        preservation: DegreePreservation,
        rng: &mut Prng,
    ) -> SwapReport {
        let symmetric = self.is_symmetric();
        let mut edges = self.edge_list(symmetric);
        let mut report = SwapReport::default();
        if swaps == 0 || edges.len() < 2 {
            return report;
        }

        let mut adjacency = self.link_lists();
        let attempts = swaps.saturating_mul(edges.len());

        for _ in 0..attempts {
            report.attempted += 1;

            let e1 = rng.gen_range_usize(0, edges.len());
            let mut e2 = rng.gen_range_usize(0, edges.len() - 1);
            if e2 >= e1 {
                e2 += 1;
            }

            let (a, b) = edges[e1];
            let (mut c, mut d) = edges[e2];
            if symmetric && rng.gen_bool() {
                std::mem::swap(&mut c, &mut d);
            }

            if a == c || a == d || b == c || b == d {
                continue;
            }
            if self.w[(a, d)] != 0.0 || self.w[(c, b)] != 0.0 {
                continue;
            }
            if preservation == DegreePreservation::Strength && self.w[(a, b)] != self.w[(c, d)] {
                continue;
            }

            self.move_edge((a, b), (a, d), symmetric);
            self.move_edge((c, d), (c, b), symmetric);
            unlink(&mut adjacency, a, b);
            unlink(&mut adjacency, c, d);
            link(&mut adjacency, a, d);
            link(&mut adjacency, c, b);

            if !(reachable(&adjacency, a, b) && reachable(&adjacency, c, d)) {
                self.move_edge((a, d), (a, b), symmetric);
                self.move_edge((c, b), (c, d), symmetric);
                unlink(&mut adjacency, a, d);
                unlink(&mut adjacency, c, b);
                link(&mut adjacency, a, b);
                link(&mut adjacency, c, d);
                continue;
            }

            edges[e1] = (a, d);
            edges[e2] = (c, b);
            report.accepted += 1;
        }

        debug!(
            attempted = report.attempted,
            accepted = report.accepted,
            symmetric,
            "connectivity randomized"
        );
        if report.accepted == 0 {
            warn!(
                attempted = report.attempted,
                ?preservation,
                "no swap accepted; the null model equals the input matrix"
            );
        }
        report
    }

    fn edge_list(&self, symmetric: bool) -> Vec<(NodeId, NodeId)> {
        let n = self.n_nodes();
        let mut edges = Vec::new();
        for i in 0..n {
            let start = if symmetric { i + 1 } else { 0 };
            for j in start..n {
                if i != j && self.w[(i, j)] != 0.0 {
                    edges.push((i, j));
                }
            }
        }
        edges
    }

    // Undirected view used for connectivity checks. A pair linked in both
    // directions of a directed matrix appears twice.
    fn link_lists(&self) -> Vec<Vec<NodeId>> {
        let n = self.n_nodes();
        let symmetric = self.is_symmetric();
        let mut adjacency = vec![Vec::new(); n];
        for i in 0..n {
            let start = if symmetric { i + 1 } else { 0 };
            for j in start..n {
                if i != j && self.w[(i, j)] != 0.0 {
                    link(&mut adjacency, i, j);
                }
            }
        }
        adjacency
    }

    fn move_edge(&mut self, from: (NodeId, NodeId), to: (NodeId, NodeId), symmetric: bool) {
        self.w[to] = self.w[from];
        self.w[from] = 0.0;
        if symmetric {
            let (fi, fj) = from;
            let (ti, tj) = to;
            self.w[(tj, ti)] = self.w[(fj, fi)];
            self.w[(fj, fi)] = 0.0;
        }
    }
}

fn link(adjacency: &mut [Vec<NodeId>], i: NodeId, j: NodeId) {
    adjacency[i].push(j);
    adjacency[j].push(i);
}

fn unlink(adjacency: &mut [Vec<NodeId>], i: NodeId, j: NodeId) {
    if let Some(pos) = adjacency[i].iter().position(|&k| k == j) {
        adjacency[i].swap_remove(pos);
    }
    if let Some(pos) = adjacency[j].iter().position(|&k| k == i) {
        adjacency[j].swap_remove(pos);
    }
}

fn reachable(adjacency: &[Vec<NodeId>], from: NodeId, to: NodeId) -> bool {
    if from == to {
        return true;
    }
    let mut seen = vec![false; adjacency.len()];
    let mut queue = VecDeque::from([from]);
    seen[from] = true;
    while let Some(node) = queue.pop_front() {
        for &next in &adjacency[node] {
            if next == to {
                return true;
            }
            if !seen[next] {
                seen[next] = true;
                queue.push_back(next);
            }
        }
    }
    false
}

pub fn is_symmetric(m: &DMatrix<f64>) -> bool {
    m.is_square()
        && (0..m.nrows()).all(|i| (i + 1..m.ncols()).all(|j| m[(i, j)] == m[(j, i)]))
}

/// Largest eigenvalue magnitude.
///
/// Symmetric matrices go through the symmetric eigensolver. For general
/// matrices the radius is estimated with Gelfand's formula on repeated
/// squares, `||A^(2^k)||^(1/2^k)`, which stays robust for permutation-like
/// matrices whose eigenvalues all share the same modulus.
pub fn spectral_radius(m: &DMatrix<f64>) -> f64 {
    if m.nrows() == 0 {
        return 0.0;
    }
    if is_symmetric(m) {
        return m
            .symmetric_eigenvalues()
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    }

    let norm = m.norm();
    if norm == 0.0 {
        return 0.0;
    }
    let mut power = m / norm;
    let mut log_scale = norm.ln();
    let mut exponent = 1.0_f64;
    let mut estimate = norm;

    for _ in 0..64 {
        let squared = &power * &power;
        let s = squared.norm();
        if s == 0.0 {
            return 0.0;
        }
        power = squared / s;
        log_scale = 2.0 * log_scale + s.ln();
        exponent *= 2.0;

        let next = (log_scale / exponent).exp();
        if (next - estimate).abs() <= 1e-14 * next {
            return next;
        }
        estimate = next;
    }
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| if j == (i + 1) % n { 1.0 } else { 0.0 })
    }

    // Undirected weighted lattice: ring plus chords, distinct weights.
    fn lattice(n: usize) -> DMatrix<f64> {
        let mut w = DMatrix::zeros(n, n);
        for i in 0..n {
            for step in [1, 2, 5] {
                let j = (i + step) % n;
                let v = 0.1 + ((i * 7 + step * 3) % 11) as f64 / 10.0;
                w[(i, j)] = v;
                w[(j, i)] = v;
            }
        }
        w
    }

    fn sorted_weights(m: &DMatrix<f64>) -> Vec<f64> {
        let mut v: Vec<f64> = m.iter().copied().filter(|v| *v != 0.0).collect();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap());
        v
    }

    #[test]
    fn rejects_non_square() {
        let err = ConnectivityMatrix::new(DMatrix::zeros(2, 3)).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn rejects_non_finite() {
        let mut w = ring(3);
        w[(0, 0)] = f64::NAN;
        assert!(matches!(
            ConnectivityMatrix::new(w),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn partitions_lookup() {
        let mut conn = ConnectivityMatrix::new(ring(4)).unwrap();
        conn.register_mask("ctx", "subctx", &[true, false, true, true])
            .unwrap();

        assert_eq!(conn.get_nodes("all").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(conn.get_nodes("ctx").unwrap(), vec![0, 2, 3]);
        assert_eq!(conn.get_nodes("subctx").unwrap(), vec![1]);
        assert!(matches!(
            conn.get_nodes("limbic"),
            Err(Error::UnknownPartition(name)) if name == "limbic"
        ));
    }

    #[test]
    fn empty_partition_is_allowed() {
        let mut conn = ConnectivityMatrix::new(ring(3)).unwrap();
        conn.register_mask("ctx", "subctx", &[true, true, true])
            .unwrap();
        assert!(conn.get_nodes("subctx").unwrap().is_empty());
    }

    #[test]
    fn partition_out_of_range() {
        let mut conn = ConnectivityMatrix::new(ring(3)).unwrap();
        assert!(conn.register_partition("x", vec![0, 3]).is_err());
    }

    #[test]
    fn labels_become_partitions() {
        let mut conn = ConnectivityMatrix::new(ring(5)).unwrap();
        conn.register_labels(&["VIS", "DMN", "VIS", "SM", "DMN"])
            .unwrap();
        assert_eq!(conn.get_nodes("VIS").unwrap(), vec![0, 2]);
        assert_eq!(conn.get_nodes("DMN").unwrap(), vec![1, 4]);
        assert_eq!(conn.partition_names(), vec!["DMN", "SM", "VIS", "all"]);
    }

    #[test]
    fn sample_nodes_is_subset() {
        let conn = ConnectivityMatrix::new(lattice(12)).unwrap();
        let mut rng = Prng::new(5);
        let picked = conn.sample_nodes("all", 4, &mut rng).unwrap();
        assert_eq!(picked.len(), 4);
        assert!(picked.windows(2).all(|p| p[0] < p[1]));
        assert!(conn.sample_nodes("all", 13, &mut rng).is_err());
    }

    #[test]
    fn zero_swaps_is_noop() {
        let mut conn = ConnectivityMatrix::new(lattice(10)).unwrap();
        let before = conn.weights().clone();
        let report = conn.randomize(0, DegreePreservation::Binary, &mut Prng::new(1));
        assert_eq!(report, SwapReport::default());
        assert_eq!(conn.weights(), &before);
    }

    #[test]
    fn randomize_preserves_degrees_and_weights() {
        let mut conn = ConnectivityMatrix::new(lattice(16)).unwrap();
        let degrees = conn.degrees();
        let weights = sorted_weights(conn.weights());
        let total: f64 = conn.weights().sum();

        let report = conn.randomize(10, DegreePreservation::Binary, &mut Prng::new(11));

        assert!(report.accepted > 0);
        assert!(conn.is_symmetric());
        assert_eq!(conn.degrees(), degrees);
        assert_eq!(sorted_weights(conn.weights()), weights);
        assert!((conn.weights().sum() - total).abs() < 1e-9);
        assert!((0..16).all(|i| conn.weights()[(i, i)] == 0.0));
    }

    #[test]
    fn randomize_actually_rewires() {
        let mut conn = ConnectivityMatrix::new(lattice(16)).unwrap();
        let before = conn.weights().clone();
        conn.randomize(5, DegreePreservation::Binary, &mut Prng::new(2));
        assert_ne!(conn.weights(), &before);
    }

    #[test]
    fn strength_mode_preserves_strengths() {
        // Binary-weighted with two weight classes: only like-for-like swaps pass.
        let mut w = DMatrix::zeros(12, 12);
        for i in 0..12 {
            for step in [1, 3] {
                let j = (i + step) % 12;
                let v = if step == 1 { 1.0 } else { 2.0 };
                w[(i, j)] = v;
                w[(j, i)] = v;
            }
        }
        let mut conn = ConnectivityMatrix::new(w).unwrap();
        let strengths = conn.strengths();
        let degrees = conn.degrees();

        conn.randomize(10, DegreePreservation::Strength, &mut Prng::new(4));

        assert_eq!(conn.degrees(), degrees);
        for (a, b) in conn.strengths().iter().zip(&strengths) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn directed_randomize_preserves_in_and_out_degree() {
        let n = 10;
        let mut w = DMatrix::zeros(n, n);
        for i in 0..n {
            w[(i, (i + 1) % n)] = 1.0 + i as f64;
            w[(i, (i + 3) % n)] = 0.5;
        }
        let mut conn = ConnectivityMatrix::new(w).unwrap();
        let out_deg = conn.degrees();
        let in_deg = conn.in_degrees();
        let weights = sorted_weights(conn.weights());

        conn.randomize(8, DegreePreservation::Binary, &mut Prng::new(9));

        assert_eq!(conn.degrees(), out_deg);
        assert_eq!(conn.in_degrees(), in_deg);
        assert_eq!(sorted_weights(conn.weights()), weights);
    }

    #[test]
    fn randomize_keeps_graph_connected() {
        let mut conn = ConnectivityMatrix::new(lattice(14)).unwrap();
        conn.randomize(20, DegreePreservation::Binary, &mut Prng::new(21));
        let adjacency = conn.link_lists();
        assert!((1..14).all(|j| reachable(&adjacency, 0, j)));
    }

    #[test]
    fn spectral_radius_of_ring_is_one() {
        assert!((spectral_radius(&ring(3)) - 1.0).abs() < 1e-9);
        assert!((spectral_radius(&(ring(5) * 2.5)) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn spectral_radius_of_nilpotent_is_zero() {
        let mut w = DMatrix::zeros(3, 3);
        w[(0, 1)] = 1.0;
        w[(1, 2)] = 1.0;
        assert_eq!(spectral_radius(&w), 0.0);
    }

    #[test]
    fn normalization_sets_unit_radius() {
        let mut conn = ConnectivityMatrix::new(lattice(12) * 3.0).unwrap();
        conn.scale_and_normalize().unwrap();
        assert!((conn.spectral_radius() - 1.0).abs() < 1e-9);
        assert!((spectral_radius(conn.coupled(1.0).matrix()) - 1.0).abs() < 1e-9);
        assert!((spectral_radius(conn.coupled(0.8).matrix()) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn normalization_of_directed_ring() {
        let mut conn = ConnectivityMatrix::new(ring(3) * 4.0).unwrap();
        let rho = conn.scale_and_normalize().unwrap();
        assert!((rho - 4.0).abs() < 1e-9);
        assert!((conn.spectral_radius() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn small_weights_still_normalize() {
        let mut conn = ConnectivityMatrix::new(ring(3) * 1e-13).unwrap();
        let rho = conn.scale_and_normalize().unwrap();
        assert!((rho / 1e-13 - 1.0).abs() < 1e-9);
        assert!((conn.spectral_radius() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn nilpotent_matrix_is_degenerate() {
        let mut w = DMatrix::zeros(3, 3);
        w[(0, 1)] = 1.0;
        w[(1, 2)] = 1.0;
        let mut conn = ConnectivityMatrix::new(w.clone()).unwrap();
        assert!(matches!(
            conn.scale_and_normalize(),
            Err(Error::DegenerateMatrix(_))
        ));
        // A failed normalization leaves the weights untouched.
        assert_eq!(conn.weights(), &w);
    }

    #[test]
    fn strength_mode_with_distinct_weights_rejects_every_swap() {
        let n = 10;
        let mut w = DMatrix::zeros(n, n);
        let mut k = 0.0;
        for i in 0..n {
            for step in [1, 2] {
                let j = (i + step) % n;
                k += 1.0;
                w[(i, j)] = 1.0 + k * 0.01;
                w[(j, i)] = 1.0 + k * 0.01;
            }
        }
        let mut conn = ConnectivityMatrix::new(w.clone()).unwrap();
        let report = conn.randomize(5, DegreePreservation::Strength, &mut Prng::new(9));
        assert!(report.attempted > 0);
        assert_eq!(report.accepted, 0);
        assert_eq!(conn.weights(), &w);
    }

    #[test]
    fn zero_matrix_is_degenerate() {
        let mut conn = ConnectivityMatrix::new(DMatrix::zeros(4, 4)).unwrap();
        assert!(matches!(
            conn.scale_and_normalize(),
            Err(Error::DegenerateMatrix(_))
        ));
    }
}
