//! Network node labels.

use crate::link::LinkId;

/// Node index, 0-based inside the library.
pub type NodeId = usize;

/// Shortest and longest used path labels of a node with respect to some origin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Node {
    /// Cost of the shortest path from the origin.
    pub pi_min: f64,
    /// Cost of the longest path from the origin which carries flow.
    pub pi_max: f64,
    /// Last link of the shortest path.
    pub alpha_min: Option<LinkId>,
    /// Last link of the longest used path.
    pub alpha_max: Option<LinkId>,
}

impl Node {
    /// Labels of a node which is not reached from the origin.
    pub fn unreached() -> Self {
        Self {
            pi_min: f64::INFINITY,
            pi_max: f64::INFINITY,
            alpha_min: None,
            alpha_max: None,
        }
    }

    /// Labels of the origin itself.
    pub fn origin() -> Self {
        Self {
            pi_min: 0.,
            pi_max: 0.,
            alpha_min: None,
            alpha_max: None,
        }
    }

    /// Returns whether the node has a finite shortest path label.
    pub fn is_reached(&self) -> bool {
        self.pi_min.is_finite()
    }

    /// Difference between the longest used and the shortest path costs.
    pub fn gap(&self) -> f64 {
        self.pi_max - self.pi_min
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::unreached()
    }
}
