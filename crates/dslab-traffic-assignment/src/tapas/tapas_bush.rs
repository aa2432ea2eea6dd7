//! Bush holding exactly the links with positive origin flow.

use log::debug;

use dslab_traffic::{Link, LinkId, Network, NodeId};

use crate::bush::Bush;
use crate::error::SolverError;

/// Bush of the TAPAS variant.
///
/// Flow moves on shared segment pairs may create cycles of origin flow, they are cancelled before the bush is
/// used again.
#[derive(Clone, Debug)]
pub struct TapasBush {
    bush: Bush,
}

impl TapasBush {
    /// Creates the bush from the shortest path tree of the origin.
    pub fn new(network: &mut Network, origin: NodeId, zero_flow: f64) -> Result<Self, SolverError> {
        Ok(Self {
            bush: Bush::new(network, origin, zero_flow)?,
        })
    }

    /// Underlying bush.
    pub fn bush(&self) -> &Bush {
        &self.bush
    }

    pub(crate) fn bush_mut(&mut self) -> &mut Bush {
        &mut self.bush
    }

    /// Origin of the bush.
    pub fn origin(&self) -> NodeId {
        self.bush.origin()
    }

    /// Flow of the origin on the link.
    pub fn flow(&self, link_id: LinkId) -> f64 {
        self.bush.flow(link_id)
    }

    /// Changes the origin flow on the link and returns the applied change, the link joins or leaves the bush with
    /// its flow.
    ///
    /// The link flow itself is not touched, the caller moves it by the returned change.
    pub fn shift_flow(&mut self, link: &Link, delta: f64) -> f64 {
        let change = self.bush.add_flow(link.id, delta);
        if self.bush.flow(link.id) > 0. {
            self.bush.insert_link(link);
        } else {
            self.bush.remove_link(link);
        }
        change
    }

    /// Cancels cycles of origin flow until none is left, returns the number of cancelled cycles.
    ///
    /// The smallest flow along a cycle is removed from every cycle link, both in the bush and in the network.
    pub fn remove_cyclic_flows(&mut self, links: &mut [Link]) -> usize {
        let zero_flow = self.bush.zero_flow();
        let mut removed = 0;
        while let Some(cycle) = self.bush.find_cycle(links) {
            let flow = self.bush.min_flow(&cycle);
            for &link_id in &cycle {
                // the link with the smallest flow always leaves the bush
                let change = self.shift_flow(&links[link_id], -flow);
                links[link_id].add_flow(change, zero_flow);
            }
            removed += 1;
        }
        debug_assert!(self.bush.has_consistent_flows(links));
        if removed > 0 {
            debug!("Removed {} flow cycles from bush of origin {}", removed, self.origin() + 1);
        }
        removed
    }
}
