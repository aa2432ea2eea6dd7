//! Outer loop driving an algorithm to the user equilibrium.

use log::info;
use serde::Serialize;

use dslab_traffic::Network;

use crate::algorithm::{make_algorithm, Algorithm, Gaps};
use crate::config::SolverConfig;
use crate::error::SolverError;

/// Outcome of an equilibrium run.
#[derive(Clone, Debug, Serialize)]
pub struct EquilibriumReport {
    /// Algorithm name.
    pub algorithm: String,
    /// Number of performed iterations.
    pub iterations: usize,
    /// Final relative gap.
    pub relative_gap: f64,
    /// Final max gap.
    pub max_gap: f64,
    /// Whether the chosen gap reached the target before the iteration limit.
    pub converged: bool,
    /// Gaps after every iteration.
    pub gap_history: Vec<Gaps>,
}

/// Runs iterations until the chosen gap is at most `max_error` or `max_iterations` is reached.
///
/// An assignment which already meets `max_error` is returned without iterations. Reaching the iteration limit is
/// not an error, the report tells whether the run converged.
pub fn solve(algorithm: &mut dyn Algorithm, config: &SolverConfig) -> EquilibriumReport {
    let mut gaps = algorithm.gaps();
    info!(
        "{}: initial relative gap {:.6e}, max gap {:.6e}",
        algorithm.name(),
        gaps.relative,
        gaps.max
    );
    let mut history = Vec::new();
    let mut iterations = 0;
    while gaps.get(config.gap) > config.max_error && iterations < config.max_iterations {
        algorithm.iteration();
        iterations += 1;
        gaps = algorithm.gaps();
        history.push(gaps);
        info!(
            "Iteration {}: relative gap {:.6e}, max gap {:.6e}",
            iterations, gaps.relative, gaps.max
        );
    }
    let converged = gaps.get(config.gap) <= config.max_error;
    if converged {
        info!("{} converged in {} iterations", algorithm.name(), iterations);
    } else {
        info!(
            "{} stopped after {} iterations with {:?} gap {:.6e}",
            algorithm.name(),
            iterations,
            config.gap,
            gaps.get(config.gap)
        );
    }
    EquilibriumReport {
        algorithm: algorithm.name().to_string(),
        iterations,
        relative_gap: gaps.relative,
        max_gap: gaps.max,
        converged,
        gap_history: history,
    }
}

/// Creates the configured algorithm, runs it and returns the network with equilibrium flows.
pub fn find_equilibrium(network: Network, config: &SolverConfig) -> Result<(Network, EquilibriumReport), SolverError> {
    let mut algorithm = make_algorithm(network, config)?;
    let report = solve(algorithm.as_mut(), config);
    Ok((algorithm.into_network(), report))
}
