//! Newton flow shifts between the longest used and the shortest bush paths.

use log::trace;

use dslab_traffic::{Link, LinkId, NodeId};

use crate::bush::Bush;
use crate::config::SolverConfig;

/// Pair of bush path segments between a divergence node and a merge node.
#[derive(Clone, Debug, PartialEq)]
pub struct Segments {
    /// Node where the segments diverge.
    pub branch: NodeId,
    /// Links of the shortest path segment, from the merge node backwards.
    pub min: Vec<LinkId>,
    /// Links of the longest used path segment, from the merge node backwards.
    pub max: Vec<LinkId>,
}

/// Costs and derivatives summed along a segment pair.
#[derive(Copy, Clone, Debug)]
struct SegmentCosts {
    min_cost: f64,
    max_cost: f64,
    derivative: f64,
    max_flow: f64,
}

impl Bush {
    /// Walks the shortest and the longest used paths back from `node` until they meet.
    ///
    /// At every step the pointer at the node with the higher topological rank moves back, so the paths meet at
    /// their last common node. Returns `None` if both paths enter the node through the same link.
    pub fn branch_segments(&self, links: &[Link], node: NodeId) -> Option<Segments> {
        let label = self.label(node);
        let min_link = label.alpha_min?;
        let max_link = label.alpha_max?;
        if min_link == max_link {
            return None;
        }
        let mut segments = Segments {
            branch: node,
            min: vec![min_link],
            max: vec![max_link],
        };
        let mut min_node = links[min_link].src;
        let mut max_node = links[max_link].src;
        while min_node != max_node {
            if self.rank(min_node) > self.rank(max_node) {
                let link_id = self.label(min_node).alpha_min?;
                segments.min.push(link_id);
                min_node = links[link_id].src;
            } else {
                let link_id = self.label(max_node).alpha_max?;
                segments.max.push(link_id);
                max_node = links[link_id].src;
            }
        }
        segments.branch = min_node;
        Some(segments)
    }

    fn segment_costs(&self, links: &[Link], segments: &Segments) -> SegmentCosts {
        let sum = |ids: &[LinkId], value: fn(&Link) -> f64| ids.iter().map(|&id| value(&links[id])).sum::<f64>();
        SegmentCosts {
            min_cost: sum(&segments.min, Link::cost),
            max_cost: sum(&segments.max, Link::cost),
            derivative: sum(&segments.min, Link::cost_derivative) + sum(&segments.max, Link::cost_derivative),
            max_flow: self.min_flow(&segments.max),
        }
    }

    /// Moves `delta` of flow from the longest used segment to the shortest one, in the bush and in the network.
    pub(crate) fn shift_flow(&mut self, links: &mut [Link], segments: &Segments, delta: f64) {
        let zero_flow = self.zero_flow();
        for &link_id in &segments.min {
            let change = self.add_flow(link_id, delta);
            links[link_id].add_flow(change, zero_flow);
        }
        for &link_id in &segments.max {
            let change = self.add_flow(link_id, -delta);
            links[link_id].add_flow(change, zero_flow);
        }
    }

    /// Equalizes used path costs for every node in reverse topological order, returns the number of flow shifts.
    ///
    /// The Newton step `(c_max - c_min) / (c'_min + c'_max)` is limited by the smallest flow on the longest used
    /// segment. With zero derivatives all of this flow is shifted at once. At most `max_shift_steps` shifts are made
    /// per node.
    pub fn equilibrate(&mut self, links: &mut [Link], config: &SolverConfig) -> usize {
        let mut shifts = 0;
        for position in (1..self.order().len()).rev() {
            let node = self.order()[position];
            for _ in 0..config.max_shift_steps {
                if self.label(node).gap() <= config.dir_tolerance {
                    break;
                }
                let Some(segments) = self.branch_segments(links, node) else {
                    break;
                };
                let costs = self.segment_costs(links, &segments);
                if costs.max_cost - costs.min_cost <= config.dir_tolerance {
                    break;
                }
                let delta = if costs.derivative > 0. {
                    costs.max_flow.min((costs.max_cost - costs.min_cost) / costs.derivative)
                } else {
                    costs.max_flow
                };
                if delta <= config.zero_flow {
                    break;
                }
                trace!(
                    "Shift {:.6} at node {} (branch {}), costs {:.6} / {:.6}",
                    delta,
                    node + 1,
                    segments.branch + 1,
                    costs.min_cost,
                    costs.max_cost
                );
                self.shift_flow(links, &segments, delta);
                shifts += 1;
                let start = self.rank(segments.branch) + 1;
                self.build_trees(links, start);
            }
        }
        debug_assert!(self.has_consistent_flows(links));
        shifts
    }
}
