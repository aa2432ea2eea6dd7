//! Common interface of equilibration algorithms.

use serde::Serialize;
use sugars::boxed;

use dslab_traffic::Network;

use crate::algorithm_b::AlgorithmB;
use crate::bush::Bush;
use crate::config::{AlgorithmKind, GapKind, SolverConfig};
use crate::error::SolverError;
use crate::tapas::Tapas;

/// Total travel time below which the relative gap is undefined.
const MIN_TRAVEL_TIME: f64 = 1e-25;

/// Convergence measures of the current assignment.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Gaps {
    /// `1 - shortest path travel time / total travel time`, infinite for an empty network.
    pub relative: f64,
    /// Largest difference between the longest used path cost in a bush and the shortest path cost over the whole
    /// network.
    ///
    /// A bush may miss the network shortest path until it is improved, so this value is never below `bush_max`.
    pub max: f64,
    /// Largest difference between the longest and the shortest path cost to a destination inside its bush.
    pub bush_max: f64,
}

impl Gaps {
    /// Value of the chosen gap.
    pub fn get(&self, kind: GapKind) -> f64 {
        match kind {
            GapKind::Relative => self.relative,
            GapKind::Max => self.max,
        }
    }
}

/// Iterative solver which improves the assignment stored in its network.
pub trait Algorithm {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Performs one outer iteration over all origins.
    fn iteration(&mut self);

    /// Computes convergence gaps of the current assignment.
    fn gaps(&mut self) -> Gaps;

    /// Network with the current link flows.
    fn network(&self) -> &Network;

    /// Consumes the algorithm and returns the network with final flows.
    fn into_network(self: Box<Self>) -> Network;
}

/// Computes gaps from the network flows and up-to-date bushes.
///
/// Each bush is re-sorted and its trees rebuilt, the shortest path costs come from the whole network.
pub(crate) fn compute_gaps<'a>(network: &Network, bushes: impl Iterator<Item = &'a mut Bush>) -> Gaps {
    let total_travel_time = network.total_travel_time();
    let mut min_travel_time = 0.;
    let mut max_gap: f64 = 0.;
    let mut bush_max_gap: f64 = 0.;
    for bush in bushes {
        bush.topo_sort(network.links());
        bush.build_trees(network.links(), 0);
        let tree = network.shortest_path_tree(bush.origin());
        for &(destination, demand) in bush.destinations() {
            let shortest = tree[destination].pi_min;
            min_travel_time += demand * shortest;
            max_gap = max_gap.max(bush.label(destination).pi_max - shortest);
            bush_max_gap = bush_max_gap.max(bush.label(destination).gap());
        }
    }
    let relative = if total_travel_time <= MIN_TRAVEL_TIME {
        f64::INFINITY
    } else {
        1. - min_travel_time / total_travel_time
    };
    Gaps {
        relative,
        max: max_gap,
        bush_max: bush_max_gap,
    }
}

/// Creates the algorithm selected in config and loads the demand onto the network.
pub fn make_algorithm(network: Network, config: &SolverConfig) -> Result<Box<dyn Algorithm>, SolverError> {
    let algorithm: Box<dyn Algorithm> = match config.algorithm {
        AlgorithmKind::B => boxed!(AlgorithmB::new(network, config.clone())?),
        AlgorithmKind::Tapas => boxed!(Tapas::new(network, config.clone())?),
    };
    Ok(algorithm)
}
