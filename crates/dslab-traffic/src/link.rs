//! Road link and its travel cost model.

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Link index in the network link arena.
pub type LinkId = usize;

/// Dependency of the link travel cost on its flow.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostFunction {
    /// Bureau of Public Roads function `t0 * (1 + b * (x / capacity)^power)`.
    Bpr {
        /// Travel time on the empty link.
        free_flow_time: f64,
        /// Practical link capacity.
        capacity: f64,
        /// Scale of the congestion term.
        b: f64,
        /// Power of the congestion term.
        power: f64,
    },
    /// Cost proportional to flow, `slope * x`.
    Linear {
        /// Cost per unit of flow.
        slope: f64,
    },
}

impl CostFunction {
    /// Creates BPR cost function.
    pub fn bpr(free_flow_time: f64, capacity: f64, b: f64, power: f64) -> Self {
        Self::Bpr {
            free_flow_time,
            capacity,
            b,
            power,
        }
    }

    /// Creates linear cost function.
    pub fn linear(slope: f64) -> Self {
        Self::Linear { slope }
    }

    /// Returns the link cost for the given flow.
    pub fn cost(&self, flow: f64) -> f64 {
        match *self {
            Self::Bpr {
                free_flow_time,
                capacity,
                b,
                power,
            } => free_flow_time * (1. + b * (flow / capacity).powf(power)),
            Self::Linear { slope } => slope * flow,
        }
    }

    /// Returns the derivative of the link cost with respect to flow.
    pub fn derivative(&self, flow: f64) -> f64 {
        match *self {
            Self::Bpr {
                free_flow_time,
                capacity,
                b,
                power,
            } => {
                if power == 0. || (flow <= 0. && power < 1.) {
                    0.
                } else {
                    free_flow_time * b * power / capacity * (flow / capacity).powf(power - 1.)
                }
            }
            Self::Linear { slope } => slope,
        }
    }

    /// Checks that the parameters define a non-negative non-decreasing cost.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Bpr {
                free_flow_time,
                capacity,
                b,
                power,
            } => {
                if !(capacity.is_finite() && capacity > 0.) {
                    return Err(format!("capacity must be positive, got {capacity}"));
                }
                for (name, value) in [("free flow time", free_flow_time), ("b", b), ("power", power)] {
                    if !(value.is_finite() && value >= 0.) {
                        return Err(format!("{name} must be non-negative, got {value}"));
                    }
                }
                Ok(())
            }
            Self::Linear { slope } => {
                if slope.is_finite() && slope >= 0. {
                    Ok(())
                } else {
                    Err(format!("slope must be non-negative, got {slope}"))
                }
            }
        }
    }
}

/// Link description as it comes from network data files.
///
/// Node numbers are 1-based. Only the BPR parameters take part in the cost model, the remaining fields are kept
/// for reporting.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Start node (1-based).
    pub init_node: usize,
    /// End node (1-based).
    pub term_node: usize,
    /// Link capacity.
    pub capacity: f64,
    /// Link length.
    pub length: f64,
    /// Free flow travel time.
    pub free_flow_time: f64,
    /// BPR scale parameter.
    pub b: f64,
    /// BPR power parameter.
    pub power: f64,
    /// Speed limit.
    pub speed_limit: f64,
    /// Toll.
    pub toll: f64,
    /// Link type.
    pub link_type: f64,
}

impl LinkRecord {
    /// BPR cost function defined by the record.
    pub fn cost_function(&self) -> CostFunction {
        CostFunction::bpr(self.free_flow_time, self.capacity, self.b, self.power)
    }
}

/// A directed link of the road network carrying the flow of all origins.
#[derive(Clone, Debug)]
pub struct Link {
    /// Link index.
    pub id: LinkId,
    /// Start node.
    pub src: NodeId,
    /// End node.
    pub dest: NodeId,
    cost_function: CostFunction,
    flow: f64,
    cost: f64,
    cost_derivative: f64,
}

impl Link {
    /// Creates an empty link.
    pub fn new(id: LinkId, src: NodeId, dest: NodeId, cost_function: CostFunction) -> Self {
        let mut link = Self {
            id,
            src,
            dest,
            cost_function,
            flow: 0.,
            cost: 0.,
            cost_derivative: 0.,
        };
        link.update_cost();
        link
    }

    /// Total flow on the link.
    pub fn flow(&self) -> f64 {
        self.flow
    }

    /// Travel cost at the current flow.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Cost derivative at the current flow.
    pub fn cost_derivative(&self) -> f64 {
        self.cost_derivative
    }

    /// Link cost function.
    pub fn cost_function(&self) -> &CostFunction {
        &self.cost_function
    }

    /// Changes the flow by `delta`, flow below `zero_flow` is set to zero.
    pub fn add_flow(&mut self, delta: f64, zero_flow: f64) {
        self.flow += delta;
        if self.flow < zero_flow {
            self.flow = 0.;
        }
        self.update_cost();
    }

    /// Sets the flow to the given non-negative value.
    pub fn set_flow(&mut self, flow: f64) {
        self.flow = flow.max(0.);
        self.update_cost();
    }

    fn update_cost(&mut self) {
        self.cost = self.cost_function.cost(self.flow);
        self.cost_derivative = self.cost_function.derivative(self.flow);
    }
}
