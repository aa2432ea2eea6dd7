//! Paired alternative segments.

use log::trace;

use dslab_traffic::{Link, LinkId};

use crate::bush::Bush;
use crate::tapas::tapas_bush::TapasBush;

/// Unique PAS id.
pub type PasId = usize;

/// Two link sequences from a common divergence node to a common merge node, shared by several origins.
///
/// Segments are stored in path order. Which of them is the cheap one is re-evaluated on every cost update.
#[derive(Clone, Debug)]
pub struct Pas {
    segments: [Vec<LinkId>; 2],
    cheap: usize,
    cheap_cost: f64,
    exp_cost: f64,
    flow_moves: i64,
    origins: Vec<usize>,
}

impl Pas {
    /// Creates PAS from segments given in path order and evaluates their costs.
    pub fn new(cheap_segment: Vec<LinkId>, exp_segment: Vec<LinkId>, links: &[Link]) -> Self {
        let mut pas = Self {
            segments: [cheap_segment, exp_segment],
            cheap: 0,
            cheap_cost: 0.,
            exp_cost: 0.,
            flow_moves: -1,
            origins: Vec::new(),
        };
        pas.recalc_costs(links);
        pas
    }

    fn exp(&self) -> usize {
        1 - self.cheap
    }

    /// Links of the cheaper segment.
    pub fn cheap_segment(&self) -> &[LinkId] {
        &self.segments[self.cheap]
    }

    /// Links of the more expensive segment.
    pub fn exp_segment(&self) -> &[LinkId] {
        &self.segments[self.exp()]
    }

    /// Last link of the cheaper segment, entering the merge node.
    pub fn last_cheap_link(&self) -> Option<LinkId> {
        self.cheap_segment().last().copied()
    }

    /// Last link of the more expensive segment, entering the merge node.
    pub fn last_exp_link(&self) -> Option<LinkId> {
        self.exp_segment().last().copied()
    }

    /// Cost of the cheaper segment.
    pub fn cheap_cost(&self) -> f64 {
        self.cheap_cost
    }

    /// Cost of the more expensive segment.
    pub fn exp_cost(&self) -> f64 {
        self.exp_cost
    }

    /// Difference between the segment costs, never negative.
    pub fn cost_difference(&self) -> f64 {
        self.exp_cost - self.cheap_cost
    }

    /// Bush indices of the origins using this PAS.
    pub fn origins(&self) -> &[usize] {
        &self.origins
    }

    /// Returns whether the origin uses this PAS.
    pub fn is_relevant(&self, origin: usize) -> bool {
        self.origins.contains(&origin)
    }

    /// Registers the origin, each origin is kept once.
    pub fn add_origin(&mut self, origin: usize) {
        if !self.is_relevant(origin) {
            self.origins.push(origin);
        }
    }

    /// Number of flow moves since the last reset, negative if there were none.
    pub fn flow_moves(&self) -> i64 {
        self.flow_moves
    }

    pub(crate) fn reset_flow_moves(&mut self) {
        self.flow_moves = -1;
    }

    /// Re-evaluates segment costs and which segment is cheaper.
    pub fn recalc_costs(&mut self, links: &[Link]) {
        let cost = |segment: &[LinkId]| segment.iter().map(|&id| links[id].cost()).sum::<f64>();
        let costs = [cost(&self.segments[0]), cost(&self.segments[1])];
        if costs[0] < costs[1] {
            self.cheap = 0;
        } else {
            self.cheap = 1;
        }
        self.cheap_cost = costs[self.cheap];
        self.exp_cost = costs[self.exp()];
    }

    /// Checks that the PAS covers enough of the reduced cost and carries enough of the triggering link flow.
    pub fn is_effective(&self, reduced_cost: f64, v: f64, exp_link: LinkId, bush: &Bush) -> bool {
        let cost_effective = self.cost_difference() >= reduced_cost;
        let flow_effective = bush.min_flow(self.exp_segment()) >= v * bush.flow(exp_link);
        cost_effective && flow_effective
    }

    /// Moves flow of all relevant origins from the expensive segment to the cheap one with one Newton step.
    ///
    /// The step is limited by the total flow the origins have on the expensive segment and split between them in
    /// proportion to their flows. Returns whether any flow was moved.
    pub fn move_flow(
        &mut self,
        links: &mut [Link],
        bushes: &mut [TapasBush],
        zero_flow: f64,
        dir_tolerance: f64,
    ) -> bool {
        self.recalc_costs(links);
        let difference = self.cost_difference();
        if difference < dir_tolerance {
            return false;
        }
        let exp = self.exp();
        let shares: Vec<f64> = self
            .origins
            .iter()
            .map(|&origin| bushes[origin].bush().min_flow(&self.segments[exp]))
            .collect();
        let total: f64 = shares.iter().sum();
        if total <= 0. {
            return false;
        }
        let derivative: f64 = self
            .segments
            .iter()
            .flatten()
            .map(|&id| links[id].cost_derivative())
            .sum();
        let step = if derivative > 0. {
            (difference / derivative).min(total)
        } else {
            total
        };

        let mut moved = 0.;
        // applied changes of link flows, in segment order
        let mut cheap_changes = vec![0.; self.segments[self.cheap].len()];
        let mut exp_changes = vec![0.; self.segments[exp].len()];
        for (&origin, share) in self.origins.iter().zip(shares) {
            let delta = share / total * step;
            if delta <= zero_flow {
                continue;
            }
            let bush = &mut bushes[origin];
            for (change, &link_id) in cheap_changes.iter_mut().zip(&self.segments[self.cheap]) {
                *change += bush.shift_flow(&links[link_id], delta);
            }
            for (change, &link_id) in exp_changes.iter_mut().zip(&self.segments[exp]) {
                *change += bush.shift_flow(&links[link_id], -delta);
            }
            debug_assert!(bush.bush().has_consistent_flows(links));
            moved += delta;
        }
        if moved <= 0. {
            return false;
        }
        for (change, &link_id) in cheap_changes.into_iter().zip(&self.segments[self.cheap]) {
            links[link_id].add_flow(change, zero_flow);
        }
        for (change, &link_id) in exp_changes.into_iter().zip(&self.segments[exp]) {
            links[link_id].add_flow(change, zero_flow);
        }
        trace!(
            "Moved {:.6} between segments with costs {:.6} / {:.6}",
            moved,
            self.cheap_cost,
            self.exp_cost
        );
        self.flow_moves = self.flow_moves.max(0) + 1;
        true
    }
}
