use approx::assert_abs_diff_eq;

use dslab_traffic::{CostFunction, DemandMatrix, LinkId, Network};

use crate::bush::Bush;
use crate::config::{AlgorithmKind, GapKind, SolverConfig};
use crate::equilibrate::Segments;
use crate::error::SolverError;
use crate::tapas::{PasManager, TapasBush};
use crate::{make_algorithm, AlgorithmB};

const ZERO_FLOW: f64 = 1e-12;

fn network(node_count: usize, links: &[(usize, usize, CostFunction)], trips: &[(usize, usize, f64)]) -> Network {
    let mut demand = DemandMatrix::new(node_count);
    for &(origin, destination, value) in trips {
        demand.set(origin, destination, value).unwrap();
    }
    let mut network = Network::new(node_count, demand).unwrap();
    for &(src, dest, cost_function) in links {
        network.add_link(src, dest, cost_function).unwrap();
    }
    network
}

fn four_nodes() -> Network {
    network(
        4,
        &[
            (0, 1, CostFunction::linear(2.)),
            (0, 3, CostFunction::linear(4.)),
            (1, 2, CostFunction::linear(1.)),
            (1, 3, CostFunction::linear(2.)),
            (2, 3, CostFunction::linear(1.)),
        ],
        &[(0, 3, 100.)],
    )
}

/// Two disjoint routes 0 -> 1 -> 3 and 0 -> 2 -> 3.
fn two_routes() -> Network {
    network(
        4,
        &[
            (0, 1, CostFunction::linear(1.)),
            (0, 2, CostFunction::linear(1.)),
            (1, 3, CostFunction::linear(1.)),
            (2, 3, CostFunction::linear(1.)),
        ],
        &[(0, 3, 10.)],
    )
}

fn shift(bush: &mut TapasBush, network: &mut Network, link_id: LinkId, delta: f64) {
    let link = network.link(link_id).clone();
    let change = bush.shift_flow(&link, delta);
    network.add_flow(link_id, change, ZERO_FLOW);
}

#[test]
fn bush_starts_on_shortest_paths() {
    let mut network = four_nodes();
    let bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    // all links are empty and free, the direct link is found first
    assert_eq!(bush.link_count(), 1);
    assert!(bush.contains_link(1));
    assert_abs_diff_eq!(bush.flow(1), 100.);
    assert_abs_diff_eq!(network.link(1).flow(), 100.);
    assert_abs_diff_eq!(network.link(1).cost(), 400.);
    assert_eq!(bush.order(), &[0, 3]);
    assert_abs_diff_eq!(bush.label(3).pi_min, 400.);
    assert_abs_diff_eq!(bush.label(3).pi_max, 400.);
}

#[test]
fn improve_and_remove_unused_links() {
    let mut network = four_nodes();
    let mut bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    let links = network.links();

    assert_eq!(bush.improve(links), 1);
    assert!(bush.contains_link(0));
    assert_eq!(bush.improve(links), 2);
    assert!(bush.contains_link(2) && bush.contains_link(3));
    assert_eq!(bush.order(), &[0, 1, 2, 3]);
    assert_eq!(bush.improve(links), 1);
    assert!(bush.contains_link(4));
    assert!(bush.find_cycle(links).is_none());

    // 2 -> 3 has no flow and is not on the shortest path, 1 -> 3 is the shortest path to node 3
    assert_eq!(bush.label(3).alpha_min, Some(3));
    assert_eq!(bush.remove_unused_links(links), 1);
    assert!(!bush.contains_link(4));
    assert!(bush.contains_link(3));
    assert!(bush.contains_link(0));
    assert_eq!(bush.remove_unused_links(links), 0);
}

#[test]
fn equilibrate_splits_flow_between_routes() {
    let mut network = two_routes();
    let mut bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    assert!(bush.contains_link(0) && bush.contains_link(2));

    bush.improve(network.links());
    bush.improve(network.links());
    assert_eq!(bush.link_count(), 4);
    assert_eq!(
        bush.branch_segments(network.links(), 3),
        Some(Segments {
            branch: 0,
            min: vec![3, 1],
            max: vec![2, 0],
        })
    );

    let config = SolverConfig::default();
    assert_eq!(bush.equilibrate(network.links_mut(), &config), 1);
    for link_id in 0..4 {
        assert_abs_diff_eq!(bush.flow(link_id), 5., epsilon = 1e-9);
        assert_abs_diff_eq!(network.link(link_id).flow(), 5., epsilon = 1e-9);
    }
    assert_abs_diff_eq!(bush.label(3).gap(), 0., epsilon = 1e-9);
    assert!(bush.branch_segments(network.links(), 1).is_none());
}

#[test]
fn equilibrate_moves_all_flow_without_derivatives() {
    let mut network = network(
        4,
        &[
            (0, 1, CostFunction::bpr(1., 1., 0., 1.)),
            (1, 3, CostFunction::bpr(1., 1., 0., 1.)),
            (0, 2, CostFunction::bpr(0.1, 1., 1., 0.5)),
            (2, 3, CostFunction::bpr(0.1, 1., 1., 0.5)),
        ],
        &[(0, 3, 10.)],
    );
    // background flow makes 0 -> 2 -> 3 longer while the bush is built
    network.add_flow(2, 100., ZERO_FLOW);
    network.add_flow(3, 100., ZERO_FLOW);
    let mut bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    assert!(bush.contains_link(0) && bush.contains_link(1));
    network.add_flow(2, -100., ZERO_FLOW);
    network.add_flow(3, -100., ZERO_FLOW);

    bush.improve(network.links());
    bush.improve(network.links());
    assert_eq!(bush.link_count(), 4);
    // both segments have zero cost derivatives
    assert_eq!(bush.equilibrate(network.links_mut(), &SolverConfig::default()), 1);
    assert_abs_diff_eq!(bush.flow(2), 10.);
    assert_abs_diff_eq!(bush.flow(3), 10.);
    assert_eq!(bush.flow(0), 0.);
    assert_eq!(network.link(1).flow(), 0.);
    assert_eq!(bush.label(3).alpha_min, Some(3));

    assert_eq!(bush.remove_unused_links(network.links()), 1);
    assert!(!bush.contains_link(1));
    assert!(bush.contains_link(0));
}

#[test]
fn clamped_bush_flow_leaves_the_link() {
    let mut network = two_routes();
    let mut bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    assert!(bush.contains_link(0) && bush.contains_link(2));
    // flow of other origins on the first route
    network.add_flow(0, 5., ZERO_FLOW);
    network.add_flow(2, 5., ZERO_FLOW);
    bush.improve(network.links());
    bush.improve(network.links());
    assert_eq!(bush.link_count(), 4);

    let segments = Segments {
        branch: 0,
        min: vec![3, 1],
        max: vec![2, 0],
    };
    // the bush keeps less than zero flow on the first route, the rest is dropped from the links as well
    bush.shift_flow(network.links_mut(), &segments, 10. - 1e-13);
    assert_eq!(bush.flow(0), 0.);
    assert_eq!(bush.flow(2), 0.);
    assert_eq!(network.link(0).flow(), 5.);
    assert_eq!(network.link(2).flow(), 5.);
    assert_eq!(network.link(1).flow(), bush.flow(1));
    assert!(bush.has_consistent_flows(network.links()));
}

#[test]
fn flow_consistency_checks() {
    let mut network = two_routes();
    let mut bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    assert_eq!(bush.conservation_error(network.links()), 0.);
    assert!(bush.has_consistent_flows(network.links()));
    assert!(bush.all_nodes_entered());

    // flow which leaves node 1 without arriving to the destination
    bush.add_flow(2, -4.);
    assert_abs_diff_eq!(bush.conservation_error(network.links()), 4.);
    assert!(!bush.has_consistent_flows(network.links()));
}

#[test]
fn clamped_tapas_flow_is_reported() {
    let mut network = two_routes();
    let mut bush = TapasBush::new(&mut network, 0, ZERO_FLOW).unwrap();
    let link = network.link(0).clone();
    assert_eq!(bush.shift_flow(&link, -(10. - 1e-13)), -10.);
    assert!(!bush.bush().contains_link(0));
    assert_eq!(bush.shift_flow(&link, 3.), 3.);
    assert!(bush.bush().contains_link(0));
}

#[test]
fn build_trees_is_idempotent() {
    let mut network = four_nodes();
    let mut bush = Bush::new(&mut network, 0, ZERO_FLOW).unwrap();
    let config = SolverConfig::default();
    for _ in 0..3 {
        bush.topo_sort(network.links());
        bush.improve(network.links());
        bush.equilibrate(network.links_mut(), &config);
    }
    bush.build_trees(network.links(), 0);
    let labels = bush.labels().to_vec();
    bush.build_trees(network.links(), 0);
    assert_eq!(labels, bush.labels());
    for &node in bush.order() {
        assert!(bush.label(node).pi_max >= bush.label(node).pi_min);
    }
}

#[test]
fn unreachable_destination() {
    let mut network = network(3, &[(0, 1, CostFunction::linear(1.))], &[(0, 2, 5.)]);
    assert!(matches!(
        Bush::new(&mut network, 0, ZERO_FLOW),
        Err(SolverError::UnreachableDestination {
            origin: 1,
            destination: 3
        })
    ));
}

#[test]
fn no_demand() {
    let network = network(2, &[(0, 1, CostFunction::linear(1.))], &[]);
    assert!(matches!(
        AlgorithmB::new(network, SolverConfig::default()),
        Err(SolverError::NoDemand)
    ));
}

#[test]
fn config_parsing_and_validation() {
    let config: SolverConfig = serde_yaml::from_str(
        "algorithm: tapas
gap: max
max_error: 0.25
tapas:
  mu: 0.3
",
    )
    .unwrap();
    assert_eq!(config.algorithm, AlgorithmKind::Tapas);
    assert_eq!(config.gap, GapKind::Max);
    assert_abs_diff_eq!(config.max_error, 0.25);
    assert_abs_diff_eq!(config.tapas.mu, 0.3);
    assert_abs_diff_eq!(config.tapas.v, 0.25);
    assert_eq!(config.max_shift_steps, 100);
    assert!(config.validate().is_ok());

    assert_eq!("algorithm-b".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::B);
    assert!(matches!(
        "oba".parse::<AlgorithmKind>(),
        Err(SolverError::UnknownAlgorithm(name)) if name == "oba"
    ));

    for invalid in [
        SolverConfig {
            zero_flow: 0.,
            ..SolverConfig::default()
        },
        SolverConfig {
            threads: 0,
            ..SolverConfig::default()
        },
        SolverConfig {
            max_error: -1.,
            ..SolverConfig::default()
        },
    ] {
        assert!(matches!(invalid.validate(), Err(SolverError::InvalidConfig(_))));
        assert!(make_algorithm(four_nodes(), &invalid).is_err());
    }
}

#[test]
fn cyclic_flow_is_removed() {
    let mut network = network(
        4,
        &[
            (0, 1, CostFunction::linear(1.)),
            (1, 2, CostFunction::linear(1.)),
            (2, 1, CostFunction::linear(1.)),
            (2, 3, CostFunction::linear(1.)),
        ],
        &[(0, 3, 10.)],
    );
    let mut bush = TapasBush::new(&mut network, 0, ZERO_FLOW).unwrap();
    assert!(bush.bush().find_cycle(network.links()).is_none());

    shift(&mut bush, &mut network, 2, 3.);
    shift(&mut bush, &mut network, 1, 3.);
    assert!(bush.bush().contains_link(2));
    let cycle = bush.bush().find_cycle(network.links()).unwrap();
    assert_eq!(cycle.len(), 2);

    assert_eq!(bush.remove_cyclic_flows(network.links_mut()), 1);
    assert!(!bush.bush().contains_link(2));
    assert_abs_diff_eq!(bush.flow(1), 10.);
    assert_abs_diff_eq!(network.link(1).flow(), 10.);
    assert_abs_diff_eq!(network.link(2).flow(), 0.);
    assert_eq!(bush.remove_cyclic_flows(network.links_mut()), 0);
}

/// Five parallel branches 0 -> i -> 6 followed by 6 -> 7 and a direct constant link 0 -> 7.
fn branches() -> (Network, TapasBush) {
    let mut links = Vec::new();
    for node in 1..=5 {
        links.push((0, node, CostFunction::linear(1.)));
        links.push((node, 6, CostFunction::linear(1.)));
    }
    links.push((6, 7, CostFunction::linear(1.)));
    links.push((0, 7, CostFunction::bpr(5., 10., 0., 1.)));
    let mut network = network(8, &links, &[(0, 7, 10.)]);
    let mut bush = TapasBush::new(&mut network, 0, ZERO_FLOW).unwrap();
    assert_abs_diff_eq!(bush.flow(0), 10.);
    for branch in 1..5 {
        for link_id in [0, 1] {
            shift(&mut bush, &mut network, link_id, -2.);
        }
        for link_id in [2 * branch, 2 * branch + 1] {
            shift(&mut bush, &mut network, link_id, 2.);
        }
    }
    (network, bush)
}

#[test]
fn flow_ineffective_pas_is_rejected() {
    let (network, bush) = branches();
    let tree = network.shortest_path_tree(0);
    assert_eq!(tree[7].alpha_min, Some(11));
    let mut manager = PasManager::new(&SolverConfig::default());

    let strict = manager.create_pas(network.links(), &tree, bush.bush(), 0, 10, 7, true);
    assert!(strict.is_none());
    assert!(manager.is_empty());

    let id = manager
        .create_pas(network.links(), &tree, bush.bush(), 0, 10, 7, false)
        .unwrap();
    let pas = manager.get(id).unwrap();
    assert_eq!(pas.cheap_segment(), &[11]);
    assert_eq!(pas.exp_segment(), &[0, 1, 10]);
    assert_abs_diff_eq!(pas.cost_difference(), 9.);
    // covers the reduced cost but carries only 2 of 10 units entering through 6 -> 7
    assert!(!pas.is_effective(0.5 * 9., 0.25, 10, bush.bush()));
    assert!(pas.is_effective(0.5 * 9., 0.2, 10, bush.bush()));

    // the same segments are not duplicated
    let again = manager.create_pas(network.links(), &tree, bush.bush(), 0, 10, 7, false);
    assert_eq!(again, Some(id));
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.get(id).unwrap().origins(), &[0]);
}

#[test]
fn pas_moves_flow_of_its_origins() {
    let (mut network, bush) = branches();
    let tree = network.shortest_path_tree(0);
    let mut manager = PasManager::new(&SolverConfig::default());
    let id = manager
        .create_pas(network.links(), &tree, bush.bush(), 0, 10, 7, false)
        .unwrap();

    let mut bushes = vec![bush];
    assert_eq!(manager.move_flow_for_origin(0, network.links_mut(), &mut bushes), 1);
    // Newton step 9 / 3 is limited by the 2 units on the branch
    assert_abs_diff_eq!(network.link(11).flow(), 2.);
    assert_abs_diff_eq!(network.link(10).flow(), 8.);
    assert_abs_diff_eq!(network.link(0).flow(), 0.);
    assert!(!bushes[0].bush().contains_link(0));
    assert!(bushes[0].bush().contains_link(11));
    assert_eq!(manager.get(id).unwrap().flow_moves(), 1);

    // the emptied PAS has nothing to move anymore and is dropped on the second sweep
    assert_eq!(manager.delete_unused_and_move_flow(network.links_mut(), &mut bushes), 0);
    assert_eq!(manager.delete_unused_and_move_flow(network.links_mut(), &mut bushes), 1);
    assert!(manager.is_empty());
}
