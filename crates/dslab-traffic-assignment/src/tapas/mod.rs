//! TAPAS: Traffic Assignment by Paired Alternative Segments.
//!
//! Flow of every origin is equilibrated on PASs, pairs of segments between a divergence and a merge node. A PAS
//! found for one origin is shared with all other origins that use both of its segments, so one Newton step moves
//! flow of many origins at once.

pub mod pas;
pub mod pas_manager;
pub mod tapas_bush;

use log::{debug, info};

use dslab_traffic::{LinkId, Network, NodeId};

use crate::algorithm::{compute_gaps, Algorithm, Gaps};
use crate::config::SolverConfig;
use crate::error::SolverError;

pub use pas::{Pas, PasId};
pub use pas_manager::PasManager;
pub use tapas_bush::TapasBush;

/// TAPAS solver.
pub struct Tapas {
    network: Network,
    bushes: Vec<TapasBush>,
    manager: PasManager,
    config: SolverConfig,
}

impl Tapas {
    /// Creates bushes for all origins and assigns the demand to initial shortest paths.
    pub fn new(mut network: Network, config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        let origins: Vec<NodeId> = network.demand().origins().collect();
        if origins.is_empty() {
            return Err(SolverError::NoDemand);
        }
        let bushes = origins
            .into_iter()
            .map(|origin| TapasBush::new(&mut network, origin, config.zero_flow))
            .collect::<Result<Vec<_>, _>>()?;
        if config.threads > 1 {
            debug!("TAPAS shares PASs between origins and runs in a single thread");
        }
        info!(
            "TAPAS: {} nodes, {} links, {} bushes",
            network.node_count(),
            network.link_count(),
            bushes.len()
        );
        Ok(Self {
            manager: PasManager::new(&config),
            network,
            bushes,
            config,
        })
    }

    /// Bushes in increasing order of their origins.
    pub fn bushes(&self) -> &[TapasBush] {
        &self.bushes
    }

    /// PAS set.
    pub fn manager(&self) -> &PasManager {
        &self.manager
    }

    /// Removes flow cycles of the bush, creates PASs for its flow off the shortest paths and moves flow on them.
    fn equilibrate_bush(&mut self, index: usize) {
        let links = self.network.links_mut();
        let bush = &mut self.bushes[index];
        bush.remove_cyclic_flows(links);

        let tree = self.network.shortest_path_tree(bush.origin());
        let links = self.network.links();
        self.manager.recalc_costs(links);
        let bush = self.bushes[index].bush();
        for merge in 0..self.network.node_count() {
            let Some(shortest) = tree[merge].alpha_min else {
                continue;
            };
            let used: Vec<LinkId> = bush
                .incoming(merge)
                .iter()
                .copied()
                .filter(|&link_id| link_id != shortest && bush.flow(link_id) > self.config.zero_flow)
                .collect();
            for exp_link in used {
                self.manager.create_new_pas(links, &tree, bush, index, exp_link, merge);
            }
        }

        self.manager
            .move_flow_for_origin(index, self.network.links_mut(), &mut self.bushes);
    }
}

impl Algorithm for Tapas {
    fn name(&self) -> &str {
        "TAPAS"
    }

    fn iteration(&mut self) {
        for index in 0..self.bushes.len() {
            self.equilibrate_bush(index);
        }
        self.manager
            .delete_unused_and_move_flow(self.network.links_mut(), &mut self.bushes);
    }

    fn gaps(&mut self) -> Gaps {
        let links = self.network.links_mut();
        for bush in self.bushes.iter_mut() {
            bush.remove_cyclic_flows(links);
        }
        compute_gaps(&self.network, self.bushes.iter_mut().map(|bush| bush.bush_mut()))
    }

    fn network(&self) -> &Network {
        &self.network
    }

    fn into_network(self: Box<Self>) -> Network {
        self.network
    }
}
