use approx::assert_abs_diff_eq;
use rand::prelude::*;
use rand_pcg::Pcg64;
use rstest::rstest;

use dslab_traffic::tntp::{read_network_file, read_solution_file, read_trips_file};
use dslab_traffic::{CostFunction, DemandMatrix, KnownSolution, Link, Network};
use dslab_traffic_assignment::{
    find_equilibrium, make_algorithm, solve, Algorithm, AlgorithmB, AlgorithmKind, Bush, GapKind, SolverConfig,
    Tapas,
};

fn four_nodes() -> Network {
    let mut demand = DemandMatrix::new(4);
    demand.set(0, 3, 100.).unwrap();
    let mut network = Network::new(4, demand).unwrap();
    for (src, dest, slope) in [(0, 1, 2.), (0, 3, 4.), (1, 2, 1.), (1, 3, 2.), (2, 3, 1.)] {
        network.add_link(src, dest, CostFunction::linear(slope)).unwrap();
    }
    network
}

/// Grid with links in both directions, random BPR parameters and random trips.
fn random_grid(size: usize, seed: u64) -> Network {
    let mut rand = Pcg64::seed_from_u64(seed);
    let node_count = size * size;
    let mut demand = DemandMatrix::new(node_count);
    for _ in 0..3 * size {
        let origin = rand.gen_range(0..node_count);
        let destination = rand.gen_range(0..node_count);
        if origin != destination {
            let value = demand.get(origin, destination) + rand.gen_range(20.0..200.0);
            demand.set(origin, destination, value).unwrap();
        }
    }
    let mut network = Network::new(node_count, demand).unwrap();
    for row in 0..size {
        for col in 0..size {
            let node = row * size + col;
            let mut neighbors = Vec::new();
            if col + 1 < size {
                neighbors.push(node + 1);
            }
            if col > 0 {
                neighbors.push(node - 1);
            }
            if row + 1 < size {
                neighbors.push(node + size);
            }
            if row > 0 {
                neighbors.push(node - size);
            }
            for neighbor in neighbors {
                let cost_function = CostFunction::bpr(rand.gen_range(1.0..5.0), rand.gen_range(50.0..150.0), 0.15, 4.);
                network.add_link(node, neighbor, cost_function).unwrap();
            }
        }
    }
    network
}

fn assert_bush_consistent(bush: &Bush, network: &Network) {
    for node in 0..network.node_count() {
        if node == bush.origin() {
            continue;
        }
        let inflow: f64 = network.incoming(node).iter().map(|&id| bush.flow(id)).sum();
        let outflow: f64 = network.outgoing(node).iter().map(|&id| bush.flow(id)).sum();
        let demand = network.demand().get(bush.origin(), node);
        assert_abs_diff_eq!(inflow - outflow, demand, epsilon = 1e-6);
    }
    assert!(bush.flows().iter().all(|&flow| flow >= 0.));
    assert!(bush.find_cycle(network.links()).is_none());
}

fn assert_links_consistent<'a>(network: &Network, bush_flows: impl Iterator<Item = &'a [f64]>) {
    let mut total = vec![0.; network.link_count()];
    for flows in bush_flows {
        for (sum, flow) in total.iter_mut().zip(flows) {
            *sum += flow;
        }
    }
    for link in network.links() {
        assert!(link.flow() >= 0.);
        assert_abs_diff_eq!(link.flow(), total[link.id], epsilon = 1e-6);
        assert_abs_diff_eq!(link.cost(), link.cost_function().cost(link.flow()), epsilon = 1e-9);
        assert_abs_diff_eq!(
            link.cost_derivative(),
            link.cost_function().derivative(link.flow()),
            epsilon = 1e-9
        );
    }
}

fn link_flows(network: &Network) -> Vec<f64> {
    network.links().iter().map(Link::flow).collect()
}

#[rstest]
fn four_nodes_known_solution(
    #[values(AlgorithmKind::B, AlgorithmKind::Tapas)] algorithm: AlgorithmKind,
    #[values(1, 2)] threads: usize,
) {
    let config = SolverConfig {
        algorithm,
        threads,
        gap: GapKind::Max,
        max_error: 0.25,
        max_iterations: 100,
        ..SolverConfig::default()
    };
    let (network, report) = find_equilibrium(four_nodes(), &config).unwrap();
    assert!(report.converged);
    assert!(report.max_gap <= 0.25);
    assert_eq!(report.gap_history.len(), report.iterations);

    let mut solution = KnownSolution::new();
    for (src, dest, flow) in [(1, 2, 57.), (1, 4, 42.), (2, 3, 28.), (2, 4, 28.), (3, 4, 28.)] {
        solution.insert(src, dest, flow);
    }
    let comparison = solution.compare(&network, KnownSolution::DEFAULT_THRESHOLD).unwrap();
    assert!(comparison.matches(), "{:?}", comparison);
    assert!(comparison.max_difference < 1.);

    // exact equilibrium: 400/7 on 1 -> 2, 300/7 on 1 -> 4 and 200/7 on the rest
    assert_abs_diff_eq!(network.link(0).flow(), 400. / 7., epsilon = 0.1);
    assert_abs_diff_eq!(network.link(1).flow(), 300. / 7., epsilon = 0.1);
    assert_abs_diff_eq!(network.link(3).flow(), 200. / 7., epsilon = 0.1);
}

#[rstest]
fn algorithm_b_on_random_grid(
    #[values(3, 4, 5)] size: usize,
    #[values(1, 2)] seed: u64,
    #[values(1, 4)] threads: usize,
) {
    let config = SolverConfig {
        threads,
        max_error: 1e-6,
        max_iterations: 1000,
        ..SolverConfig::default()
    };
    let mut algorithm = AlgorithmB::new(random_grid(size, seed), config.clone()).unwrap();
    let report = solve(&mut algorithm, &config);
    assert!(report.converged, "relative gap {}", report.relative_gap);
    assert!(report.relative_gap <= 1e-6);
    assert!(report.max_gap >= 0.);

    let network = algorithm.network();
    for bush in algorithm.bushes() {
        assert_bush_consistent(bush, network);
    }
    assert_links_consistent(network, algorithm.bushes().iter().map(Bush::flows));
}

#[rstest]
fn tapas_on_random_grid(#[values(3, 4, 5)] size: usize, #[values(1, 2)] seed: u64) {
    let config = SolverConfig {
        algorithm: AlgorithmKind::Tapas,
        max_error: 1e-6,
        max_iterations: 1000,
        ..SolverConfig::default()
    };
    let mut algorithm = Tapas::new(random_grid(size, seed), config.clone()).unwrap();
    let report = solve(&mut algorithm, &config);
    assert!(report.converged, "relative gap {}", report.relative_gap);

    let network = algorithm.network();
    for bush in algorithm.bushes() {
        assert_bush_consistent(bush.bush(), network);
    }
    assert_links_consistent(network, algorithm.bushes().iter().map(|bush| bush.bush().flows()));
}

#[rstest]
fn algorithms_agree_on_link_flows(#[values(4, 6)] size: usize) {
    let mut results = Vec::new();
    for (algorithm, threads) in [(AlgorithmKind::B, 1), (AlgorithmKind::B, 4), (AlgorithmKind::Tapas, 1)] {
        let config = SolverConfig {
            algorithm,
            threads,
            max_error: 1e-9,
            max_iterations: 2000,
            ..SolverConfig::default()
        };
        let (network, report) = find_equilibrium(random_grid(size, 7), &config).unwrap();
        assert!(report.converged, "{} gap {}", report.algorithm, report.relative_gap);
        results.push(link_flows(&network));
    }
    // link flows at equilibrium are unique for strictly increasing costs
    for other in &results[1..] {
        for (flow, expected) in other.iter().zip(&results[0]) {
            assert_abs_diff_eq!(flow, expected, epsilon = 1e-2);
        }
    }
}

#[test]
fn iteration_limit_is_reported() {
    let config = SolverConfig {
        max_error: 0.,
        max_iterations: 2,
        ..SolverConfig::default()
    };
    let mut algorithm = make_algorithm(random_grid(5, 3), &config).unwrap();
    let report = solve(algorithm.as_mut(), &config);
    assert_eq!(report.iterations, 2);
    assert!(!report.converged);
    assert!(report.relative_gap.is_finite());
    let network = algorithm.into_network();
    assert!(network.links().iter().all(|link| link.flow() >= 0.));
}

#[test]
fn gaps_decrease_on_four_nodes() {
    let config = SolverConfig {
        max_error: 1e-9,
        ..SolverConfig::default()
    };
    let mut algorithm = make_algorithm(four_nodes(), &config).unwrap();
    let initial = algorithm.gaps();
    // all demand starts on the direct link while the path through node 1 is free
    assert_abs_diff_eq!(initial.relative, 1.);
    assert_abs_diff_eq!(initial.max, 400.);
    // the bush only knows the direct link yet
    assert_eq!(initial.bush_max, 0.);
    let report = solve(algorithm.as_mut(), &config);
    assert!(report.converged);
    assert!(report.relative_gap < initial.relative);
    assert!(report.max_gap < initial.max);
}

#[rstest]
fn braess_network_from_files(#[values(AlgorithmKind::B, AlgorithmKind::Tapas)] algorithm: AlgorithmKind) {
    let data_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data");
    let data = read_network_file(data_dir.join("braess_net.tntp")).unwrap();
    let demand = read_trips_file(data_dir.join("braess_trips.tntp"), data.node_count).unwrap();
    let network = Network::from_records(data.node_count, &data.links, demand).unwrap();
    let config = SolverConfig {
        algorithm,
        ..SolverConfig::default()
    };
    let (network, report) = find_equilibrium(network, &config).unwrap();
    // the initial all-or-nothing assignment is already the equilibrium
    assert!(report.converged);
    assert_eq!(report.iterations, 0);
    assert!(report.gap_history.is_empty());
    assert_abs_diff_eq!(network.total_travel_time(), 600. * 14.1, epsilon = 1e-6);

    let solution = read_solution_file(data_dir.join("braess_flow.tntp")).unwrap();
    assert_eq!(solution.len(), 5);
    let comparison = solution.compare(&network, 1e-6).unwrap();
    assert!(comparison.matches(), "{:?}", comparison);
}
