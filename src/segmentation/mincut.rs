//! Maximum flow and minimum s-t cut by depth-first augmenting paths.
//!
//! Capacities are integers. The input is a square [`CapacityMatrix`] that
//! may carry capacity in both directions between two nodes. Before solving,
//! every such pair is rewritten through two fresh intermediate nodes (one per
//! direction) so that each arc of the resulting [`FlowNetwork`] owns its own
//! reverse residual arc. Intermediate nodes are appended after the original
//! ones, so original node indices stay stable and the final cut is projected
//! back by dropping every index `>= original_node_count()`.

use crate::error::MinCutError;
use tracing::{debug, trace};

/// Integer edge capacity
pub type Capacity = i64;

/// Capacity used for hard constraints; never saturated by a finite cut
pub const INFINITE_CAPACITY: Capacity = Capacity::MAX;

/// Square capacity matrix with sparse rows
///
/// Cells are written directly with [`CapacityMatrix::set`]; rows only store
/// their non-zero entries, which keeps grid graphs with a bounded degree
/// linear in size. Each row is kept sorted by column, so a cell is found by
/// binary search and writes in increasing column order append.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityMatrix {
    rows: Vec<Vec<(usize, Capacity)>>,
}

impl CapacityMatrix {
    /// All-zero matrix over `node_count` nodes
    pub fn new(node_count: usize) -> Self {
        Self {
            rows: vec![Vec::new(); node_count],
        }
    }

    /// Builds a matrix from dense rows
    ///
    /// # Errors
    ///
    /// * `MinCutError::NotSquare` - If a row length differs from the row count
    /// * `MinCutError::NegativeCapacity` - If any entry is negative
    pub fn from_dense<R: AsRef<[Capacity]>>(rows: &[R]) -> Result<Self, MinCutError> {
        let n = rows.len();
        let mut matrix = Self::new(n);
        for (from, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n {
                return Err(MinCutError::NotSquare {
                    row: from,
                    len: row.len(),
                    expected: n,
                });
            }
            for (to, &capacity) in row.iter().enumerate() {
                if capacity < 0 {
                    return Err(MinCutError::NegativeCapacity { from, to, capacity });
                }
                matrix.set(from, to, capacity);
            }
        }
        Ok(matrix)
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    /// Writes one cell; a zero capacity removes the edge
    ///
    /// # Panics
    ///
    /// Panics if either index is out of range.
    pub fn set(&mut self, from: usize, to: usize, capacity: Capacity) {
        assert!(to < self.rows.len(), "capacity column out of range");
        let row = &mut self.rows[from];
        match row.binary_search_by_key(&to, |&(column, _)| column) {
            Ok(slot) if capacity == 0 => {
                row.remove(slot);
            }
            Ok(slot) => row[slot].1 = capacity,
            Err(_) if capacity == 0 => {}
            Err(slot) => row.insert(slot, (to, capacity)),
        }
    }

    /// Reads one cell; absent edges are zero
    pub fn get(&self, from: usize, to: usize) -> Capacity {
        self.rows
            .get(from)
            .and_then(|row| {
                row.binary_search_by_key(&to, |&(column, _)| column)
                    .ok()
                    .map(|slot| row[slot].1)
            })
            .unwrap_or(0)
    }

    /// Every non-zero `(from, to, capacity)` triple, row by row in column order
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, Capacity)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(from, row)| row.iter().map(move |&(to, capacity)| (from, to, capacity)))
    }

    /// Total capacity of edges leaving `source_side`
    ///
    /// Saturates instead of overflowing when infinite edges are cut.
    pub fn cut_capacity(&self, source_side: &[usize]) -> Capacity {
        let mut inside = vec![false; self.node_count()];
        for &node in source_side {
            if let Some(flag) = inside.get_mut(node) {
                *flag = true;
            }
        }
        self.edges()
            .filter(|&(from, to, _)| inside[from] && !inside[to])
            .fold(0, |total: Capacity, (_, _, capacity)| {
                total.saturating_add(capacity)
            })
    }
}

#[derive(Debug, Clone)]
struct Arc {
    head: usize,
    capacity: Capacity,
    residual: Capacity,
}

/// Residual flow network built from a [`CapacityMatrix`]
///
/// Arcs are stored in pairs: arc `e` and arc `e ^ 1` are each other's
/// reverse. Forward arcs start with their capacity as residual, reverse arcs
/// start at zero.
#[derive(Debug, Clone)]
pub struct FlowNetwork {
    adjacency: Vec<Vec<usize>>,
    arcs: Vec<Arc>,
    original_node_count: usize,
    split_pairs: usize,
}

impl FlowNetwork {
    /// Builds the residual network, splitting anti-parallel edge pairs
    ///
    /// # Errors
    ///
    /// * `MinCutError::NegativeCapacity` - If any capacity is negative
    pub fn new(capacities: &CapacityMatrix) -> Result<Self, MinCutError> {
        let original_node_count = capacities.node_count();
        let mut network = Self {
            adjacency: vec![Vec::new(); original_node_count],
            arcs: Vec::new(),
            original_node_count,
            split_pairs: 0,
        };

        for (from, to, capacity) in capacities.edges() {
            if capacity < 0 {
                return Err(MinCutError::NegativeCapacity { from, to, capacity });
            }
            if from == to {
                continue;
            }

            let reverse = capacities.get(to, from);
            if reverse == 0 {
                network.add_arc(from, to, capacity);
            } else if from < to {
                // Each direction is routed through its own intermediate node.
                let forward_hop = network.add_node();
                network.add_arc(from, forward_hop, capacity);
                network.add_arc(forward_hop, to, capacity);

                let backward_hop = network.add_node();
                network.add_arc(to, backward_hop, reverse);
                network.add_arc(backward_hop, from, reverse);

                network.split_pairs += 1;
            }
        }

        Ok(network)
    }

    fn add_node(&mut self) -> usize {
        self.adjacency.push(Vec::new());
        self.adjacency.len() - 1
    }

    fn add_arc(&mut self, from: usize, to: usize, capacity: Capacity) {
        let index = self.arcs.len();
        self.arcs.push(Arc {
            head: to,
            capacity,
            residual: capacity,
        });
        self.arcs.push(Arc {
            head: from,
            capacity: 0,
            residual: 0,
        });
        self.adjacency[from].push(index);
        self.adjacency[to].push(index + 1);
    }

    #[inline]
    fn tail(&self, arc: usize) -> usize {
        self.arcs[arc ^ 1].head
    }

    /// Node count including intermediate nodes
    #[inline]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Node count of the matrix this network was built from
    #[inline]
    pub const fn original_node_count(&self) -> usize {
        self.original_node_count
    }

    /// Number of anti-parallel pairs that were rewritten
    #[inline]
    pub const fn split_pairs(&self) -> usize {
        self.split_pairs
    }

    /// Original capacity from `from` to `to` in the rewritten topology
    pub fn capacity(&self, from: usize, to: usize) -> Capacity {
        self.adjacency
            .get(from)
            .into_iter()
            .flatten()
            .map(|&arc| &self.arcs[arc])
            .filter(|arc| arc.head == to)
            .map(|arc| arc.capacity)
            .sum()
    }

    /// Depth-first search for a source-to-sink path over positive residuals
    ///
    /// Returns the arcs of the path in order. Each node is expanded at most
    /// once per search, so no node repeats on a path.
    fn find_augmenting_path(&self, source: usize, sink: usize) -> Option<Vec<usize>> {
        let mut visited = vec![false; self.node_count()];
        let mut parent_arc = vec![usize::MAX; self.node_count()];
        let mut stack = vec![source];
        visited[source] = true;

        while let Some(node) = stack.pop() {
            if node == sink {
                let mut path = Vec::new();
                let mut current = sink;
                while current != source {
                    let arc = parent_arc[current];
                    path.push(arc);
                    current = self.tail(arc);
                }
                path.reverse();
                return Some(path);
            }

            for &arc in self.adjacency[node].iter().rev() {
                let Arc { head, residual, .. } = self.arcs[arc];
                if residual > 0 && !visited[head] {
                    visited[head] = true;
                    parent_arc[head] = arc;
                    stack.push(head);
                }
            }
        }

        None
    }

    fn augment(&mut self, path: &[usize]) -> Result<Capacity, MinCutError> {
        let bottleneck = path
            .iter()
            .map(|&arc| self.arcs[arc].residual)
            .min()
            .unwrap_or(0);

        for &arc in path {
            let from = self.tail(arc);
            let forward = &mut self.arcs[arc];
            let residual = forward.residual - bottleneck;
            if residual < 0 {
                return Err(MinCutError::NegativeResidual {
                    from,
                    to: forward.head,
                    residual,
                });
            }
            forward.residual = residual;

            let backward = &mut self.arcs[arc ^ 1];
            backward.residual = backward.residual.saturating_add(bottleneck);
        }

        Ok(bottleneck)
    }

    /// Saturates the network and returns the maximum flow value
    ///
    /// # Errors
    ///
    /// * `MinCutError::NodeOutOfRange` - If `source` or `sink` is not an original node
    /// * `MinCutError::SourceIsSink` - If `source == sink`
    /// * `MinCutError::NegativeResidual` - If an augmentation breaks the residual invariant
    pub fn max_flow(&mut self, source: usize, sink: usize) -> Result<Capacity, MinCutError> {
        self.validate_terminals(source, sink)?;

        let mut flow: Capacity = 0;
        let mut augmentations = 0usize;
        while let Some(path) = self.find_augmenting_path(source, sink) {
            let pushed = self.augment(&path)?;
            flow = flow.saturating_add(pushed);
            augmentations += 1;
        }

        trace!(augmentations, flow, "augmenting paths exhausted");
        Ok(flow)
    }

    /// Nodes reachable from `source` over positive residual arcs
    ///
    /// The result covers every node of the rewritten network.
    pub fn source_side(&self, source: usize) -> Vec<bool> {
        let mut reachable = vec![false; self.node_count()];
        if source >= self.node_count() {
            return reachable;
        }
        let mut stack = vec![source];
        reachable[source] = true;
        while let Some(node) = stack.pop() {
            for &arc in &self.adjacency[node] {
                let Arc { head, residual, .. } = self.arcs[arc];
                if residual > 0 && !reachable[head] {
                    reachable[head] = true;
                    stack.push(head);
                }
            }
        }
        reachable
    }

    fn validate_terminals(&self, source: usize, sink: usize) -> Result<(), MinCutError> {
        let node_count = self.original_node_count;
        if node_count == 0 {
            return Err(MinCutError::EmptyNetwork);
        }
        for node in [source, sink] {
            if node >= node_count {
                return Err(MinCutError::NodeOutOfRange { node, node_count });
            }
        }
        if source == sink {
            return Err(MinCutError::SourceIsSink { node: source });
        }
        Ok(())
    }
}

/// Partition of the original nodes by a minimum s-t cut
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinCut {
    /// Nodes reachable from the source in the final residual network, source included
    pub source_side: Vec<usize>,
    /// Every other original node
    pub sink_side: Vec<usize>,
    /// Maximum flow value, equal to the capacity of the cut
    pub max_flow: Capacity,
}

/// Computes a minimum s-t cut of `capacities`
///
/// # Errors
///
/// * `MinCutError::EmptyNetwork` - If the matrix has no nodes
/// * `MinCutError::NodeOutOfRange` / `MinCutError::SourceIsSink` - On invalid terminals
/// * `MinCutError::NegativeCapacity` - If any capacity is negative
/// * `MinCutError::NegativeResidual` - If the residual invariant breaks while solving
///
/// # Examples
///
/// ```rust
/// use imageops_grabcut::{min_cut, CapacityMatrix};
///
/// let capacities = CapacityMatrix::from_dense(&[
///     [0, 0, 3, 2],
///     [0, 0, 0, 0],
///     [0, 2, 0, 1],
///     [0, 3, 0, 0],
/// ])
/// .unwrap();
///
/// let cut = min_cut(&capacities, 0, 1).unwrap();
/// assert_eq!(cut.max_flow, 5);
/// assert_eq!(capacities.cut_capacity(&cut.source_side), cut.max_flow);
/// ```
pub fn min_cut(
    capacities: &CapacityMatrix,
    source: usize,
    sink: usize,
) -> Result<MinCut, MinCutError> {
    let mut network = FlowNetwork::new(capacities)?;
    let max_flow = network.max_flow(source, sink)?;
    let reachable = network.source_side(source);

    let (source_side, sink_side): (Vec<usize>, Vec<usize>) =
        (0..network.original_node_count()).partition(|&node| reachable[node]);

    debug!(
        nodes = network.node_count(),
        split_pairs = network.split_pairs(),
        max_flow,
        source_side = source_side.len(),
        "minimum cut extracted"
    );

    Ok(MinCut {
        source_side,
        sink_side,
        max_flow,
    })
}
