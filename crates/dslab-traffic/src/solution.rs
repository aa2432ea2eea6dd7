//! Link flow reports and comparison with reference solutions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::network::Network;

/// Flow and cost of a link, keyed by 1-based node numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkFlow {
    /// Start node.
    pub init_node: usize,
    /// End node.
    pub term_node: usize,
    /// Total link flow.
    pub flow: f64,
    /// Link cost at this flow.
    pub cost: f64,
}

/// Link whose computed flow differs from the reference one by more than the threshold.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowMismatch {
    /// Start node.
    pub init_node: usize,
    /// End node.
    pub term_node: usize,
    /// Computed flow.
    pub flow: f64,
    /// Reference flow.
    pub expected: f64,
}

/// Result of comparing network flows with a reference solution.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SolutionComparison {
    /// Largest absolute flow difference.
    pub max_difference: f64,
    /// Link with the largest difference.
    pub worst_link: Option<(usize, usize)>,
    /// Links differing by more than the threshold.
    pub mismatches: Vec<FlowMismatch>,
}

impl SolutionComparison {
    /// Returns whether all links are within the threshold.
    pub fn matches(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Published link flows for a network, keyed by 1-based `(init_node, term_node)`.
#[derive(Clone, Debug, Default)]
pub struct KnownSolution {
    flows: FxHashMap<(usize, usize), f64>,
}

impl KnownSolution {
    /// Threshold used by benchmark regression checks.
    pub const DEFAULT_THRESHOLD: f64 = 1.;

    /// Creates an empty solution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reference flow of a link.
    pub fn insert(&mut self, init_node: usize, term_node: usize, flow: f64) {
        self.flows.insert((init_node, term_node), flow);
    }

    /// Reference flow of a link.
    pub fn flow(&self, init_node: usize, term_node: usize) -> Option<f64> {
        self.flows.get(&(init_node, term_node)).copied()
    }

    /// Number of links in the solution.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Returns whether the solution has no links.
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Compares the reference flows with the current network flows.
    ///
    /// Links of the network absent from the solution are not checked.
    pub fn compare(&self, network: &Network, threshold: f64) -> Result<SolutionComparison, NetworkError> {
        let mut entries: Vec<_> = self.flows.iter().map(|(&key, &flow)| (key, flow)).collect();
        entries.sort_by_key(|(key, _)| *key);

        let mut result = SolutionComparison::default();
        for ((src, dest), expected) in entries {
            let link_id = (src > 0 && dest > 0)
                .then(|| network.find_link(src - 1, dest - 1))
                .flatten()
                .ok_or(NetworkError::UnknownLink { src, dest })?;
            let flow = network.link(link_id).flow();
            let difference = (flow - expected).abs();
            if difference > result.max_difference || result.worst_link.is_none() {
                result.max_difference = difference;
                result.worst_link = Some((src, dest));
            }
            if difference > threshold {
                result.mismatches.push(FlowMismatch {
                    init_node: src,
                    term_node: dest,
                    flow,
                    expected,
                });
            }
        }
        Ok(result)
    }
}

impl FromIterator<LinkFlow> for KnownSolution {
    fn from_iter<T: IntoIterator<Item = LinkFlow>>(iter: T) -> Self {
        let mut solution = Self::new();
        for link in iter {
            solution.insert(link.init_node, link.term_node, link.flow);
        }
        solution
    }
}
