//! Errors in network input data.

use std::path::PathBuf;

use thiserror::Error;

/// Error in the description of a network, its demand or a reference solution.
///
/// Node numbers in messages are 1-based, as in the input data.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Node number is zero or exceeds the node count.
    #[error("node {node} is out of range 1..={node_count}")]
    InvalidNode {
        /// Offending node number.
        node: usize,
        /// Number of nodes in the network.
        node_count: usize,
    },
    /// Network has no nodes.
    #[error("network has no nodes")]
    Empty,
    /// Two links connect the same ordered pair of nodes.
    #[error("duplicate link {src} -> {dest}")]
    DuplicateLink {
        /// Start node.
        src: usize,
        /// End node.
        dest: usize,
    },
    /// Link starts and ends at the same node.
    #[error("link {node} -> {node} is a loop")]
    SelfLoop {
        /// Node of the loop.
        node: usize,
    },
    /// Link parameters do not define a valid cost function.
    #[error("invalid link {src} -> {dest}: {reason}")]
    InvalidLink {
        /// Start node.
        src: usize,
        /// End node.
        dest: usize,
        /// Description of the problem.
        reason: String,
    },
    /// Demand matrix is not square or does not match the node count.
    #[error("demand matrix has {rows} rows, expected {expected}")]
    DemandSize {
        /// Number of rows or columns found.
        rows: usize,
        /// Expected size.
        expected: usize,
    },
    /// Demand value is negative or not finite.
    #[error("invalid demand {value} from {origin} to {destination}")]
    InvalidDemand {
        /// Origin node.
        origin: usize,
        /// Destination node.
        destination: usize,
        /// Offending value.
        value: f64,
    },
    /// Reference solution mentions a link absent from the network.
    #[error("unknown link {src} -> {dest}")]
    UnknownLink {
        /// Start node.
        src: usize,
        /// End node.
        dest: usize,
    },
    /// Malformed line in a data file.
    #[error("line {line}: {message}")]
    Parse {
        /// Line number, starting from 1.
        line: usize,
        /// Description of the problem.
        message: String,
    },
    /// Data file can not be read.
    #[error("can't read {path}: {source}")]
    File {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Reading from the data source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
