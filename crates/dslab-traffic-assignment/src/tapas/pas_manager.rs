//! Creation, lookup and disposal of paired alternative segments.

use std::collections::VecDeque;

use indexmap::IndexMap;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use dslab_traffic::{Link, LinkId, Node, NodeId};

use crate::bush::Bush;
use crate::config::{SolverConfig, TapasConfig};
use crate::tapas::pas::{Pas, PasId};
use crate::tapas::tapas_bush::TapasBush;

/// Set of all PASs of the TAPAS solver.
///
/// PASs are kept in creation order and indexed by the pair of links entering their merge node. Several PASs may
/// share this pair when their segments differ further from the merge node.
pub struct PasManager {
    pases: IndexMap<PasId, Pas>,
    by_last_links: FxHashMap<(LinkId, LinkId), Vec<PasId>>,
    next_id: PasId,
    iteration: i32,
    params: TapasConfig,
    zero_flow: f64,
    dir_tolerance: f64,
}

fn last_links_key(first: LinkId, second: LinkId) -> (LinkId, LinkId) {
    (first.min(second), first.max(second))
}

impl PasManager {
    /// Creates an empty manager.
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            pases: IndexMap::new(),
            by_last_links: FxHashMap::default(),
            next_id: 0,
            iteration: 1,
            params: config.tapas.clone(),
            zero_flow: config.zero_flow,
            dir_tolerance: config.dir_tolerance,
        }
    }

    /// Number of active PASs.
    pub fn len(&self) -> usize {
        self.pases.len()
    }

    /// Returns whether there are no active PASs.
    pub fn is_empty(&self) -> bool {
        self.pases.is_empty()
    }

    /// Returns the PAS by id.
    pub fn get(&self, id: PasId) -> Option<&Pas> {
        self.pases.get(&id)
    }

    /// Active PASs in creation order.
    pub fn pases(&self) -> impl Iterator<Item = (PasId, &Pas)> {
        self.pases.iter().map(|(id, pas)| (*id, pas))
    }

    fn matching(&self, cheap_link: LinkId, exp_link: LinkId) -> impl Iterator<Item = (PasId, &Pas)> {
        self.by_last_links
            .get(&last_links_key(cheap_link, exp_link))
            .into_iter()
            .flatten()
            .filter_map(move |id| self.pases.get(id).map(|pas| (*id, pas)))
            .filter(move |(_, pas)| {
                pas.last_cheap_link() == Some(cheap_link) && pas.last_exp_link() == Some(exp_link)
            })
    }

    /// Finds a PAS whose cheap and expensive segments end with the given links.
    pub fn find(&self, cheap_link: LinkId, exp_link: LinkId) -> Option<PasId> {
        self.matching(cheap_link, exp_link).map(|(id, _)| id).next()
    }

    /// Same as [`Self::find`], preferring a PAS whose expensive segment carries flow of the bush.
    pub fn find_for_bush(&self, cheap_link: LinkId, exp_link: LinkId, bush: &Bush) -> Option<PasId> {
        let mut fallback = None;
        for (id, pas) in self.matching(cheap_link, exp_link) {
            if bush.min_flow(pas.exp_segment()) > 0. {
                return Some(id);
            }
            fallback.get_or_insert(id);
        }
        fallback
    }

    fn find_same(&self, pas: &Pas) -> Option<PasId> {
        let (cheap, exp) = (pas.last_cheap_link()?, pas.last_exp_link()?);
        self.matching(cheap, exp)
            .find(|(_, other)| other.cheap_segment() == pas.cheap_segment() && other.exp_segment() == pas.exp_segment())
            .map(|(id, _)| id)
    }

    fn insert(&mut self, pas: Pas) -> PasId {
        let id = self.next_id;
        self.next_id += 1;
        if let (Some(cheap), Some(exp)) = (pas.last_cheap_link(), pas.last_exp_link()) {
            self.by_last_links
                .entry(last_links_key(cheap, exp))
                .or_default()
                .push(id);
        }
        self.pases.insert(id, pas);
        id
    }

    fn remove(&mut self, id: PasId) {
        if let Some(pas) = self.pases.shift_remove(&id) {
            if let (Some(cheap), Some(exp)) = (pas.last_cheap_link(), pas.last_exp_link()) {
                let key = last_links_key(cheap, exp);
                if let Some(ids) = self.by_last_links.get_mut(&key) {
                    ids.retain(|&other| other != id);
                    if ids.is_empty() {
                        self.by_last_links.remove(&key);
                    }
                }
            }
        }
    }

    /// Re-evaluates segment costs of all PASs.
    pub fn recalc_costs(&mut self, links: &[Link]) {
        for pas in self.pases.values_mut() {
            pas.recalc_costs(links);
        }
    }

    /// Threshold of the reduced cost above which a strict PAS is searched for.
    fn strict_threshold(&self) -> f64 {
        10. * 10f64.powi(-self.iteration)
    }

    /// Builds a PAS for flow of the bush entering `merge` through `exp_link` instead of the shortest path.
    ///
    /// The expensive segment is found by breadth-first search backwards from `exp_link` over links with bush flow
    /// until a node of the shortest path tree `tree` is met, this node is the divergence node. With `strict` only
    /// links carrying more than `v` times the flow of `exp_link` are followed. The cheap segment follows the
    /// shortest path tree from the merge node back to the divergence node.
    ///
    /// Returns an existing PAS with the same segments, if any, registering the origin in it. Returns `None` if no
    /// divergence node is found or the segment costs are equal.
    pub fn create_pas(
        &mut self,
        links: &[Link],
        tree: &[Node],
        bush: &Bush,
        bush_index: usize,
        exp_link: LinkId,
        merge: NodeId,
        strict: bool,
    ) -> Option<PasId> {
        let mut shortest_path_nodes = FxHashSet::default();
        shortest_path_nodes.insert(merge);
        let mut next = tree[merge].alpha_min;
        while let Some(link_id) = next {
            let src = links[link_id].src;
            shortest_path_nodes.insert(src);
            next = tree[src].alpha_min;
        }

        let exp_src = links[exp_link].src;
        let threshold = self.params.v * bush.flow(exp_link);
        let mut toward_merge: FxHashMap<NodeId, LinkId> = FxHashMap::default();
        toward_merge.insert(exp_src, exp_link);
        let mut checked: FxHashSet<NodeId> = [merge, exp_src].into_iter().collect();
        let mut queue = VecDeque::from([exp_link]);
        let mut divergence = shortest_path_nodes.contains(&exp_src).then_some(exp_src);
        while divergence.is_none() {
            let Some(current) = queue.pop_front() else {
                break;
            };
            for &link_id in bush.incoming(links[current].src) {
                let flow = bush.flow(link_id);
                if flow <= self.zero_flow || (strict && flow <= threshold) {
                    continue;
                }
                let src = links[link_id].src;
                if !checked.insert(src) {
                    continue;
                }
                toward_merge.insert(src, link_id);
                queue.push_back(link_id);
                if shortest_path_nodes.contains(&src) {
                    divergence = Some(src);
                    break;
                }
            }
        }
        let divergence = divergence?;

        let mut exp_segment = Vec::new();
        let mut node = divergence;
        while node != merge {
            let link_id = *toward_merge.get(&node)?;
            exp_segment.push(link_id);
            node = links[link_id].dest;
        }
        let mut cheap_segment = Vec::new();
        let mut node = merge;
        while node != divergence {
            let link_id = tree[node].alpha_min?;
            cheap_segment.push(link_id);
            node = links[link_id].src;
        }
        cheap_segment.reverse();

        let mut pas = Pas::new(cheap_segment, exp_segment, links);
        if pas.cost_difference() < self.dir_tolerance {
            return None;
        }
        if let Some(id) = self.find_same(&pas) {
            if let Some(existing) = self.pases.get_mut(&id) {
                existing.add_origin(bush_index);
            }
            return Some(id);
        }
        pas.add_origin(bush_index);
        Some(self.insert(pas))
    }

    /// Makes sure an effective PAS exists for flow of the bush entering `merge` through `exp_link`.
    ///
    /// An existing PAS or a newly created non-strict one is checked for effectiveness against the reduced cost of
    /// `exp_link`. If it is not effective and the reduced cost is large enough for the current iteration, a strict
    /// PAS is searched for.
    pub fn create_new_pas(
        &mut self,
        links: &[Link],
        tree: &[Node],
        bush: &Bush,
        bush_index: usize,
        exp_link: LinkId,
        merge: NodeId,
    ) {
        let link = &links[exp_link];
        let reduced_cost = tree[link.src].pi_min + link.cost() - tree[merge].pi_min;
        let min_cost_difference = self.params.mu * reduced_cost;
        let v = self.params.v;

        let found = tree[merge]
            .alpha_min
            .and_then(|cheap| self.find_for_bush(cheap, exp_link, bush));
        let effective = match found {
            Some(id) => self.pases.get_mut(&id).map_or(false, |pas| {
                pas.add_origin(bush_index);
                pas.is_effective(min_cost_difference, v, exp_link, bush)
            }),
            None => self
                .create_pas(links, tree, bush, bush_index, exp_link, merge, false)
                .and_then(|id| self.pases.get(&id))
                .map_or(false, |pas| pas.is_effective(min_cost_difference, v, exp_link, bush)),
        };
        if reduced_cost > self.strict_threshold() && !effective {
            self.create_pas(links, tree, bush, bush_index, exp_link, merge, true);
        }
    }

    /// Moves flow on every PAS used by the origin, returns the number of PASs with moved flow.
    pub fn move_flow_for_origin(&mut self, bush_index: usize, links: &mut [Link], bushes: &mut [TapasBush]) -> usize {
        let mut moved = 0;
        for pas in self.pases.values_mut() {
            if pas.is_relevant(bush_index) && pas.move_flow(links, bushes, self.zero_flow, self.dir_tolerance) {
                moved += 1;
            }
        }
        moved
    }

    /// Moves flow on all PASs and deletes the ones which had no flow moves since the previous call.
    ///
    /// Returns the number of deleted PASs.
    pub fn delete_unused_and_move_flow(&mut self, links: &mut [Link], bushes: &mut [TapasBush]) -> usize {
        self.iteration += 1;
        let ids: Vec<PasId> = self.pases.keys().copied().collect();
        let mut deleted = 0;
        for id in ids {
            let Some(pas) = self.pases.get_mut(&id) else {
                continue;
            };
            pas.move_flow(links, bushes, self.zero_flow, self.dir_tolerance);
            if pas.flow_moves() < 0 {
                self.remove(id);
                deleted += 1;
            } else {
                pas.reset_flow_moves();
            }
        }
        debug!("PAS manager: {} active, {} deleted", self.pases.len(), deleted);
        deleted
    }
}
