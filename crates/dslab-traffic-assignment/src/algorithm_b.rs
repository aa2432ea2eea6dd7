//! Algorithm B: origin-based assignment with Newton flow shifts inside every bush.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use threadpool::ThreadPool;

use dslab_traffic::{Link, Network, NodeId};

use crate::algorithm::{compute_gaps, Algorithm, Gaps};
use crate::bush::Bush;
use crate::config::SolverConfig;
use crate::error::SolverError;

/// Creates a bush for every origin with demand, loading the demand onto the network.
pub(crate) fn create_bushes(network: &mut Network, zero_flow: f64) -> Result<Vec<Bush>, SolverError> {
    let origins: Vec<NodeId> = network.demand().origins().collect();
    if origins.is_empty() {
        return Err(SolverError::NoDemand);
    }
    origins
        .into_iter()
        .map(|origin| Bush::new(network, origin, zero_flow))
        .collect()
}

/// Numbers of changes made to a bush during one iteration.
#[derive(Copy, Clone, Debug, Default)]
struct BushUpdate {
    added: usize,
    shifts: usize,
    removed: usize,
}

impl BushUpdate {
    fn add(&mut self, other: BushUpdate) {
        self.added += other.added;
        self.shifts += other.shifts;
        self.removed += other.removed;
    }
}

fn improve_bush(bush: &mut Bush, links: &[Link]) -> usize {
    bush.topo_sort(links);
    bush.improve(links)
}

/// Shifts flow inside the bush against the current link costs and drops the emptied links.
fn equilibrate_bush(bush: &mut Bush, links: &mut [Link], config: &SolverConfig, added: usize) -> BushUpdate {
    bush.build_trees(links, 0);
    let shifts = bush.equilibrate(links, config);
    let removed = bush.remove_unused_links(links);
    BushUpdate {
        added,
        shifts,
        removed,
    }
}

/// Algorithm B solver.
///
/// With `threads > 1` the bushes of one iteration are improved concurrently, each against the link costs from the
/// start of the iteration. Flow shifts change the shared link costs, so they are made afterwards on the calling
/// thread, bush by bush, as in the sequential iteration.
pub struct AlgorithmB {
    network: Network,
    bushes: Vec<Bush>,
    config: SolverConfig,
    pool: Option<ThreadPool>,
}

impl AlgorithmB {
    /// Creates bushes for all origins and assigns the demand to initial shortest paths.
    pub fn new(mut network: Network, config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        let bushes = create_bushes(&mut network, config.zero_flow)?;
        info!(
            "AlgorithmB: {} nodes, {} links, {} bushes",
            network.node_count(),
            network.link_count(),
            bushes.len()
        );
        let pool = (config.threads > 1).then(|| ThreadPool::new(config.threads));
        Ok(Self {
            network,
            bushes,
            config,
            pool,
        })
    }

    /// Bushes in increasing order of their origins.
    pub fn bushes(&self) -> &[Bush] {
        &self.bushes
    }

    fn sequential_iteration(&mut self) -> BushUpdate {
        let mut total = BushUpdate::default();
        for bush in self.bushes.iter_mut() {
            let added = improve_bush(bush, self.network.links());
            total.add(equilibrate_bush(bush, self.network.links_mut(), &self.config, added));
        }
        total
    }

    fn parallel_iteration(&mut self, pool: &ThreadPool) -> BushUpdate {
        let bush_count = self.bushes.len();
        let snapshot = Arc::new(self.network.links().to_vec());
        let results = Arc::new(Mutex::new(Vec::with_capacity(bush_count)));
        for (index, mut bush) in std::mem::take(&mut self.bushes).into_iter().enumerate() {
            let snapshot = snapshot.clone();
            let results = results.clone();
            pool.execute(move || {
                let added = improve_bush(&mut bush, &snapshot);
                results
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((index, bush, added));
            });
        }
        pool.join();

        let mut results = std::mem::take(&mut *results.lock().unwrap_or_else(PoisonError::into_inner));
        assert_eq!(results.len(), bush_count, "bush update failed in worker thread");
        results.sort_by_key(|(index, ..)| *index);

        let mut total = BushUpdate::default();
        for (_, mut bush, added) in results {
            total.add(equilibrate_bush(&mut bush, self.network.links_mut(), &self.config, added));
            self.bushes.push(bush);
        }
        total
    }
}

impl Algorithm for AlgorithmB {
    fn name(&self) -> &str {
        "AlgorithmB"
    }

    fn iteration(&mut self) {
        let update = match self.pool.take() {
            Some(pool) => {
                let update = self.parallel_iteration(&pool);
                self.pool = Some(pool);
                update
            }
            None => self.sequential_iteration(),
        };
        debug!(
            "AlgorithmB iteration: {} links added, {} flow shifts, {} links removed",
            update.added, update.shifts, update.removed
        );
    }

    fn gaps(&mut self) -> Gaps {
        compute_gaps(&self.network, self.bushes.iter_mut())
    }

    fn network(&self) -> &Network {
        &self.network
    }

    fn into_network(self: Box<Self>) -> Network {
        self.network
    }
}
