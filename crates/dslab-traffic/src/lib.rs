#![warn(missing_docs)]
//! Road network model for static traffic assignment.
//!
//! Provides links with flow-dependent travel costs, per-node shortest path labels, the network itself with its
//! origin-destination demand, readers for TNTP-formatted data files and comparison of computed flows with published
//! reference solutions.

pub mod demand;
pub mod error;
pub mod link;
pub mod network;
pub mod node;
pub mod solution;
pub mod tntp;

pub use demand::DemandMatrix;
pub use error::NetworkError;
pub use link::{CostFunction, Link, LinkId, LinkRecord};
pub use network::Network;
pub use node::{Node, NodeId};
pub use solution::{FlowMismatch, KnownSolution, LinkFlow, SolutionComparison};
