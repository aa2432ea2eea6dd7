//! Bush: acyclic subnetwork carrying the flow of a single origin.

use log::debug;

use dslab_traffic::{Link, LinkId, Network, Node, NodeId};

use crate::error::SolverError;

const UNRANKED: usize = usize::MAX;

/// Allowed flow imbalance at a node relative to the origin demand.
const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Acyclic set of links rooted at an origin together with this origin's share of link flows.
///
/// Link and node state is kept in dense vectors indexed by [`LinkId`] and [`NodeId`], the links themselves
/// are owned by the [`Network`] and passed to every operation as a slice.
#[derive(Clone, Debug)]
pub struct Bush {
    origin: NodeId,
    destinations: Vec<(NodeId, f64)>,
    zero_flow: f64,
    in_bush: Vec<bool>,
    flow: Vec<f64>,
    incoming: Vec<Vec<LinkId>>,
    outgoing: Vec<Vec<LinkId>>,
    contains_node: Vec<bool>,
    order: Vec<NodeId>,
    rank: Vec<usize>,
    next_rank: usize,
    labels: Vec<Node>,
}

impl Bush {
    /// Builds the bush from the current shortest path tree of the origin and loads the origin's demand onto it.
    ///
    /// The demand is added both to the bush flows and to the network link flows.
    pub fn new(network: &mut Network, origin: NodeId, zero_flow: f64) -> Result<Self, SolverError> {
        let node_count = network.node_count();
        let link_count = network.link_count();
        let mut bush = Self {
            origin,
            destinations: network.demand().destinations(origin).to_vec(),
            zero_flow,
            in_bush: vec![false; link_count],
            flow: vec![0.; link_count],
            incoming: vec![Vec::new(); node_count],
            outgoing: vec![Vec::new(); node_count],
            contains_node: vec![false; node_count],
            order: Vec::new(),
            rank: vec![UNRANKED; node_count],
            next_rank: 0,
            labels: vec![Node::unreached(); node_count],
        };
        bush.contains_node[origin] = true;

        let tree = network.build_min_tree(origin).to_vec();
        for &(destination, demand) in &bush.destinations.clone() {
            if !tree[destination].is_reached() {
                return Err(SolverError::UnreachableDestination {
                    origin: origin + 1,
                    destination: destination + 1,
                });
            }
            let mut next = tree[destination].alpha_min;
            while let Some(link_id) = next {
                network.add_flow(link_id, demand, zero_flow);
                bush.flow[link_id] += demand;
                let link = network.link(link_id);
                bush.insert_link(link);
                next = tree[link.src].alpha_min;
            }
        }
        bush.topo_sort(network.links());
        bush.build_trees(network.links(), 0);
        debug!(
            "Created bush for origin {} with {} links and {} destinations",
            origin + 1,
            bush.link_count(),
            bush.destinations.len()
        );
        Ok(bush)
    }

    /// Origin of the bush.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Destinations with positive demand from the origin.
    pub fn destinations(&self) -> &[(NodeId, f64)] {
        &self.destinations
    }

    /// Flow of the origin on the link.
    pub fn flow(&self, link_id: LinkId) -> f64 {
        self.flow[link_id]
    }

    /// Flows of the origin on all network links.
    pub fn flows(&self) -> &[f64] {
        &self.flow
    }

    /// Returns whether the link belongs to the bush.
    pub fn contains_link(&self, link_id: LinkId) -> bool {
        self.in_bush[link_id]
    }

    /// Returns whether the node was ever reached by a bush link.
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.contains_node[node]
    }

    /// Number of links in the bush.
    pub fn link_count(&self) -> usize {
        self.in_bush.iter().filter(|in_bush| **in_bush).count()
    }

    /// Bush links entering the node.
    pub fn incoming(&self, node: NodeId) -> &[LinkId] {
        &self.incoming[node]
    }

    /// Bush links leaving the node.
    pub fn outgoing(&self, node: NodeId) -> &[LinkId] {
        &self.outgoing[node]
    }

    /// Nodes reachable from the origin in topological order, computed by the last [`Self::topo_sort`].
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Position of the node in the topological order.
    pub fn rank(&self, node: NodeId) -> usize {
        self.rank[node]
    }

    /// Labels of the node computed by the last [`Self::build_trees`].
    pub fn label(&self, node: NodeId) -> &Node {
        &self.labels[node]
    }

    /// Labels of all nodes.
    pub fn labels(&self) -> &[Node] {
        &self.labels
    }

    /// Flow threshold below which bush flow is treated as zero.
    pub fn zero_flow(&self) -> f64 {
        self.zero_flow
    }

    /// Smallest bush flow along the links.
    pub fn min_flow(&self, links: &[LinkId]) -> f64 {
        links.iter().map(|&id| self.flow[id]).fold(f64::INFINITY, f64::min)
    }

    /// Adds the link to the bush, returns false if it is already there.
    pub(crate) fn insert_link(&mut self, link: &Link) -> bool {
        if self.in_bush[link.id] {
            return false;
        }
        self.in_bush[link.id] = true;
        self.incoming[link.dest].push(link.id);
        self.outgoing[link.src].push(link.id);
        self.contains_node[link.dest] = true;
        true
    }

    pub(crate) fn remove_link(&mut self, link: &Link) {
        if !self.in_bush[link.id] {
            return;
        }
        self.in_bush[link.id] = false;
        self.incoming[link.dest].retain(|&id| id != link.id);
        self.outgoing[link.src].retain(|&id| id != link.id);
    }

    /// Changes the bush flow on the link and returns the applied change.
    ///
    /// Flow not above zero flow becomes zero, so the change may exceed `delta` in absolute value. Callers move
    /// the link flow by the returned change to keep it equal to the sum of bush flows.
    pub(crate) fn add_flow(&mut self, link_id: LinkId, delta: f64) -> f64 {
        let flow = &mut self.flow[link_id];
        let initial = *flow;
        *flow += delta;
        if *flow <= self.zero_flow {
            *flow = 0.;
        }
        *flow - initial
    }

    // Consistency checks ----------------------------------------------------------------------------------------------

    /// Largest difference between the net inflow and the demand over nodes other than the origin.
    pub fn conservation_error(&self, links: &[Link]) -> f64 {
        let mut balance = vec![0.; self.contains_node.len()];
        for link in links {
            let flow = self.flow[link.id];
            if flow != 0. {
                balance[link.dest] += flow;
                balance[link.src] -= flow;
            }
        }
        for &(destination, demand) in &self.destinations {
            balance[destination] -= demand;
        }
        balance
            .iter()
            .enumerate()
            .filter(|&(node, _)| node != self.origin)
            .fold(0., |error: f64, (_, value)| error.max(value.abs()))
    }

    /// Returns whether all bush flows are non-negative and conserved at every node up to rounding errors.
    pub fn has_consistent_flows(&self, links: &[Link]) -> bool {
        let total_demand: f64 = self.destinations.iter().map(|(_, demand)| demand).sum();
        self.flow.iter().all(|&flow| flow >= 0.)
            && self.conservation_error(links) <= CONSERVATION_TOLERANCE * total_demand.max(1.)
    }

    /// Returns whether every reached node other than the origin keeps an incoming bush link.
    pub fn all_nodes_entered(&self) -> bool {
        (0..self.contains_node.len())
            .all(|node| node == self.origin || !self.contains_node[node] || !self.incoming[node].is_empty())
    }

    // Topological order -----------------------------------------------------------------------------------------------

    /// Recomputes the topological order of nodes reachable from the origin.
    ///
    /// Uses depth-first search with an explicit stack, nodes are ordered by reversed finishing time.
    pub fn topo_sort(&mut self, links: &[Link]) {
        let mut visited = vec![false; self.rank.len()];
        let mut finished = Vec::new();
        let mut stack = vec![(self.origin, 0)];
        visited[self.origin] = true;
        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            if let Some(&link_id) = self.outgoing[node].get(*next) {
                *next += 1;
                let dest = links[link_id].dest;
                if !visited[dest] {
                    visited[dest] = true;
                    stack.push((dest, 0));
                }
            } else {
                stack.pop();
                finished.push(node);
            }
        }
        finished.reverse();
        self.rank.fill(UNRANKED);
        for (position, &node) in finished.iter().enumerate() {
            self.rank[node] = position;
        }
        self.next_rank = finished.len();
        self.order = finished;
    }

    // Min and max trees -----------------------------------------------------------------------------------------------

    /// Computes shortest path and longest used path labels in topological order, starting from `start` position.
    ///
    /// Labels of nodes before `start` are kept, so after a flow shift the trees are updated from the position
    /// following the divergence node. The longest path is taken over links with positive bush flow, a node without
    /// such incoming links gets its shortest path as the longest one.
    pub fn build_trees(&mut self, links: &[Link], start: usize) {
        if start == 0 {
            self.labels.fill(Node::unreached());
            self.labels[self.origin] = Node::origin();
        }
        for position in start.max(1)..self.order.len() {
            let node = self.order[position];
            let mut label = Node {
                pi_min: f64::INFINITY,
                pi_max: f64::NEG_INFINITY,
                alpha_min: None,
                alpha_max: None,
            };
            for &link_id in &self.incoming[node] {
                let link = &links[link_id];
                let src = &self.labels[link.src];
                let cost = src.pi_min + link.cost();
                if cost < label.pi_min {
                    label.pi_min = cost;
                    label.alpha_min = Some(link_id);
                }
                if self.flow[link_id] > self.zero_flow {
                    let cost = src.pi_max + link.cost();
                    if cost > label.pi_max {
                        label.pi_max = cost;
                        label.alpha_max = Some(link_id);
                    }
                }
            }
            if label.alpha_max.is_none() {
                label.pi_max = label.pi_min;
                label.alpha_max = label.alpha_min;
            }
            self.labels[node] = label;
        }
    }

    /// Longest path costs from the origin over all bush links, used and unused.
    fn longest_paths(&self, links: &[Link]) -> Vec<f64> {
        let mut potential = vec![f64::NEG_INFINITY; self.labels.len()];
        potential[self.origin] = 0.;
        for &node in self.order.iter().skip(1) {
            for &link_id in &self.incoming[node] {
                let link = &links[link_id];
                potential[node] = potential[node].max(potential[link.src] + link.cost());
            }
        }
        potential
    }

    // Bush maintenance ------------------------------------------------------------------------------------------------

    /// Adds network links which shorten paths to bush nodes, returns the number of added links.
    ///
    /// A link is a candidate if its end node is new to the bush or if it is shorter than the longest bush path to
    /// the end node, so the bush stays acyclic. Candidates improving the shortest path are added right away, the
    /// other ones only when no such candidate exists.
    pub fn improve(&mut self, links: &[Link]) -> usize {
        self.build_trees(links, 0);
        let potential = self.longest_paths(links);
        let mut secondary = Vec::new();
        let mut improved = false;
        let mut ranks_valid = true;
        let mut added = 0;
        for link in links {
            if self.in_bush[link.id] || !self.contains_node[link.src] || link.dest == self.origin {
                continue;
            }
            if self.contains_node[link.dest] && potential[link.src] + link.cost() >= potential[link.dest] {
                continue;
            }
            if self.labels[link.src].pi_min + link.cost() < self.labels[link.dest].pi_min {
                improved = true;
                if self.try_add_link(links, link, &mut ranks_valid) {
                    added += 1;
                }
            } else {
                secondary.push(link.id);
            }
        }
        if !improved {
            for link_id in secondary {
                if self.try_add_link(links, &links[link_id], &mut ranks_valid) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            self.topo_sort(links);
            self.build_trees(links, 0);
            debug!("Added {} links to bush of origin {}", added, self.origin + 1);
        }
        debug_assert!(self.find_cycle(links).is_none());
        added
    }

    fn try_add_link(&mut self, links: &[Link], link: &Link, ranks_valid: &mut bool) -> bool {
        if !self.contains_node[link.dest] {
            self.rank[link.dest] = self.next_rank;
            self.next_rank += 1;
            return self.insert_link(link);
        }
        if *ranks_valid && self.rank[link.src] < self.rank[link.dest] {
            return self.insert_link(link);
        }
        if self.reaches(links, link.dest, link.src) {
            return false;
        }
        *ranks_valid = false;
        self.insert_link(link)
    }

    /// Returns whether `target` can be reached from `start` over bush links.
    pub fn reaches(&self, links: &[Link], start: NodeId, target: NodeId) -> bool {
        let mut visited = vec![false; self.contains_node.len()];
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            for &link_id in &self.outgoing[node] {
                let dest = links[link_id].dest;
                if !visited[dest] {
                    visited[dest] = true;
                    stack.push(dest);
                }
            }
        }
        false
    }

    /// Removes links without bush flow, returns the number of removed links.
    ///
    /// A link stays if it is the only bush link entering its end node or if it belongs to the bush shortest path
    /// tree.
    pub fn remove_unused_links(&mut self, links: &[Link]) -> usize {
        let mut removed = 0;
        for link in links {
            if self.in_bush[link.id]
                && self.flow[link.id] <= self.zero_flow
                && self.incoming[link.dest].len() > 1
                && self.labels[link.dest].alpha_min != Some(link.id)
            {
                self.remove_link(link);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} unused links from bush of origin {}", removed, self.origin + 1);
        }
        debug_assert!(self.all_nodes_entered());
        removed
    }

    // Cycles ----------------------------------------------------------------------------------------------------------

    /// Finds a cycle of bush links with depth-first search, returns its links.
    ///
    /// A link to a node which is visited but not yet finished closes a cycle.
    pub fn find_cycle(&self, links: &[Link]) -> Option<Vec<LinkId>> {
        let node_count = self.contains_node.len();
        let mut pre_visit = vec![false; node_count];
        let mut post_visit = vec![false; node_count];
        let roots = std::iter::once(self.origin).chain((0..node_count).filter(|&node| node != self.origin));
        for root in roots {
            if pre_visit[root] || self.outgoing[root].is_empty() {
                continue;
            }
            pre_visit[root] = true;
            // node, next outgoing link position, link used to enter the node
            let mut stack: Vec<(NodeId, usize, Option<LinkId>)> = vec![(root, 0, None)];
            while let Some((node, next, _)) = stack.last_mut() {
                let node = *node;
                if let Some(&link_id) = self.outgoing[node].get(*next) {
                    *next += 1;
                    let dest = links[link_id].dest;
                    if !pre_visit[dest] {
                        pre_visit[dest] = true;
                        stack.push((dest, 0, Some(link_id)));
                    } else if !post_visit[dest] {
                        let mut cycle = vec![link_id];
                        for &(visited, _, entry) in stack.iter().rev() {
                            if visited == dest {
                                break;
                            }
                            cycle.extend(entry);
                        }
                        cycle.reverse();
                        return Some(cycle);
                    }
                } else {
                    post_visit[node] = true;
                    stack.pop();
                }
            }
        }
        None
    }
}
