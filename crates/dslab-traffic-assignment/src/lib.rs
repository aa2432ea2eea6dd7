#![warn(missing_docs)]
//! Static traffic assignment: origin-based user equilibrium solvers.
//!
//! Two algorithms are provided over a [`dslab_traffic::Network`]:
//!
//! - [`AlgorithmB`] keeps an acyclic bush per origin and equalizes path costs inside every bush with Newton flow
//!   shifts between the longest used and the shortest paths.
//! - [`Tapas`] equalizes costs on paired alternative segments shared between origins.
//!
//! The [`solve`] driver runs iterations until the relative or max gap falls below the target.

pub mod algorithm;
pub mod algorithm_b;
pub mod bush;
pub mod config;
pub mod equilibrate;
pub mod equilibrium;
pub mod error;
pub mod tapas;

pub use algorithm::{make_algorithm, Algorithm, Gaps};
pub use algorithm_b::AlgorithmB;
pub use bush::Bush;
pub use config::{AlgorithmKind, GapKind, SolverConfig, TapasConfig};
pub use equilibrate::Segments;
pub use equilibrium::{find_equilibrium, solve, EquilibriumReport};
pub use error::SolverError;
pub use tapas::{Pas, PasId, PasManager, Tapas, TapasBush};

#[cfg(test)]
mod tests;
