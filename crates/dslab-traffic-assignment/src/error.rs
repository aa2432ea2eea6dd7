//! Solver errors.

use dslab_traffic::NetworkError;
use thiserror::Error;

/// Error detected before the equilibration starts.
///
/// Node numbers in messages are 1-based.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Invalid network or demand.
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// Origin has demand to a destination it can not reach.
    #[error("destination {destination} is unreachable from origin {origin}")]
    UnreachableDestination {
        /// Origin node.
        origin: usize,
        /// Destination node.
        destination: usize,
    },
    /// Demand matrix has no trips.
    #[error("demand matrix has no trips")]
    NoDemand,
    /// Algorithm name is not recognized.
    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),
    /// Configuration value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// Configuration file can not be read or parsed.
    #[error("can't read config from {path}: {message}")]
    ConfigFile {
        /// File path.
        path: String,
        /// Description of the problem.
        message: String,
    },
}
