//! Road network.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::debug;
use rustc_hash::FxHashMap;

use crate::demand::DemandMatrix;
use crate::error::NetworkError;
use crate::link::{CostFunction, Link, LinkId, LinkRecord};
use crate::node::{Node, NodeId};
use crate::solution::LinkFlow;

// Dijkstra queue entry ------------------------------------------------------------------------------------------------

#[derive(Copy, Clone)]
struct QueueEntry {
    node: NodeId,
    cost: f64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed because BinaryHeap extracts maximum and we need the closest node
        other.cost.total_cmp(&self.cost).then(other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.cost == other.cost
    }
}

impl Eq for QueueEntry {}

// Network -------------------------------------------------------------------------------------------------------------

/// Directed road network with the origin-destination demand.
///
/// The network is the only owner of links, all other structures refer to them by [`LinkId`].
/// There is at most one link per ordered pair of nodes. The network may contain cycles.
#[derive(Clone, Debug)]
pub struct Network {
    nodes: Vec<Node>,
    links: Vec<Link>,
    outgoing: Vec<Vec<LinkId>>,
    incoming: Vec<Vec<LinkId>>,
    link_index: FxHashMap<(NodeId, NodeId), LinkId>,
    demand: DemandMatrix,
}

impl Network {
    /// Creates a network with the given number of nodes and no links.
    pub fn new(node_count: usize, demand: DemandMatrix) -> Result<Self, NetworkError> {
        if node_count == 0 {
            return Err(NetworkError::Empty);
        }
        if demand.size() != node_count {
            return Err(NetworkError::DemandSize {
                rows: demand.size(),
                expected: node_count,
            });
        }
        Ok(Self {
            nodes: vec![Node::unreached(); node_count],
            links: Vec::new(),
            outgoing: vec![Vec::new(); node_count],
            incoming: vec![Vec::new(); node_count],
            link_index: FxHashMap::default(),
            demand,
        })
    }

    /// Creates a network from link records with 1-based node numbers.
    pub fn from_records(
        node_count: usize,
        records: &[LinkRecord],
        demand: DemandMatrix,
    ) -> Result<Self, NetworkError> {
        let mut network = Self::new(node_count, demand)?;
        for record in records {
            let src = network.external_node(record.init_node)?;
            let dest = network.external_node(record.term_node)?;
            network.add_link(src, dest, record.cost_function())?;
        }
        debug!(
            "Created network with {} nodes, {} links and {} trips",
            network.node_count(),
            network.link_count(),
            network.demand.total()
        );
        Ok(network)
    }

    /// Adds a link between nodes with 0-based indices and returns its id.
    pub fn add_link(&mut self, src: NodeId, dest: NodeId, cost_function: CostFunction) -> Result<LinkId, NetworkError> {
        let node_count = self.node_count();
        for node in [src, dest] {
            if node >= node_count {
                return Err(NetworkError::InvalidNode {
                    node: node + 1,
                    node_count,
                });
            }
        }
        if src == dest {
            return Err(NetworkError::SelfLoop { node: src + 1 });
        }
        if self.link_index.contains_key(&(src, dest)) {
            return Err(NetworkError::DuplicateLink {
                src: src + 1,
                dest: dest + 1,
            });
        }
        cost_function.validate().map_err(|reason| NetworkError::InvalidLink {
            src: src + 1,
            dest: dest + 1,
            reason,
        })?;
        let id = self.links.len();
        self.links.push(Link::new(id, src, dest, cost_function));
        self.outgoing[src].push(id);
        self.incoming[dest].push(id);
        self.link_index.insert((src, dest), id);
        Ok(id)
    }

    fn external_node(&self, node: usize) -> Result<NodeId, NetworkError> {
        if node == 0 || node > self.node_count() {
            Err(NetworkError::InvalidNode {
                node,
                node_count: self.node_count(),
            })
        } else {
            Ok(node - 1)
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Returns the link by id.
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id]
    }

    /// All links ordered by id.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Mutable access to links for flow updates.
    pub fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links
    }

    /// Id of the link from `src` to `dest`, if present.
    pub fn find_link(&self, src: NodeId, dest: NodeId) -> Option<LinkId> {
        self.link_index.get(&(src, dest)).copied()
    }

    /// Links leaving the node.
    pub fn outgoing(&self, node: NodeId) -> &[LinkId] {
        &self.outgoing[node]
    }

    /// Links entering the node.
    pub fn incoming(&self, node: NodeId) -> &[LinkId] {
        &self.incoming[node]
    }

    /// Labels computed by the last [`Self::build_min_tree`] call.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node labels by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Origin-destination demand.
    pub fn demand(&self) -> &DemandMatrix {
        &self.demand
    }

    /// Changes the flow of the link, keeping its cost and derivative in sync.
    pub fn add_flow(&mut self, id: LinkId, delta: f64, zero_flow: f64) {
        self.links[id].add_flow(delta, zero_flow);
    }

    /// Computes the shortest path tree from the origin over all links and stores it in node labels.
    pub fn build_min_tree(&mut self, origin: NodeId) -> &[Node] {
        self.nodes = self.shortest_path_tree(origin);
        &self.nodes
    }

    /// Computes the shortest path tree from the origin with Dijkstra's algorithm.
    ///
    /// Only `pi_min` and `alpha_min` are meaningful in the result, `pi_max` and `alpha_max` repeat them.
    pub fn shortest_path_tree(&self, origin: NodeId) -> Vec<Node> {
        let mut tree = vec![Node::unreached(); self.node_count()];
        let mut visited = vec![false; self.node_count()];
        let mut queue = BinaryHeap::new();
        tree[origin] = Node::origin();
        queue.push(QueueEntry { node: origin, cost: 0. });
        while let Some(QueueEntry { node, cost }) = queue.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            for &link_id in &self.outgoing[node] {
                let link = &self.links[link_id];
                let next_cost = cost + link.cost();
                if next_cost < tree[link.dest].pi_min {
                    tree[link.dest] = Node {
                        pi_min: next_cost,
                        pi_max: next_cost,
                        alpha_min: Some(link_id),
                        alpha_max: Some(link_id),
                    };
                    queue.push(QueueEntry {
                        node: link.dest,
                        cost: next_cost,
                    });
                }
            }
        }
        tree
    }

    /// Sum of flow times cost over all links.
    pub fn total_travel_time(&self) -> f64 {
        self.links.iter().map(|link| link.flow() * link.cost()).sum()
    }

    /// Current flows and costs of all links with 1-based node numbers.
    pub fn link_flows(&self) -> Vec<LinkFlow> {
        self.links
            .iter()
            .map(|link| LinkFlow {
                init_node: link.src + 1,
                term_node: link.dest + 1,
                flow: link.flow(),
                cost: link.cost(),
            })
            .collect()
    }
}
