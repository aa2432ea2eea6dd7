use approx::assert_abs_diff_eq;
use rstest::rstest;

use dslab_traffic::{CostFunction, DemandMatrix, Network, NodeId};

fn grid_network(size: usize) -> Network {
    let node_count = size * size;
    let mut network = Network::new(node_count, DemandMatrix::new(node_count)).unwrap();
    let node = |row: usize, col: usize| row * size + col;
    for row in 0..size {
        for col in 0..size {
            let weight = ((row * 7 + col * 3) % 5 + 1) as f64;
            if col + 1 < size {
                network
                    .add_link(node(row, col), node(row, col + 1), CostFunction::bpr(weight, 10., 0.15, 4.))
                    .unwrap();
                network
                    .add_link(node(row, col + 1), node(row, col), CostFunction::bpr(weight + 1., 10., 0.15, 4.))
                    .unwrap();
            }
            if row + 1 < size {
                network
                    .add_link(node(row, col), node(row + 1, col), CostFunction::bpr(weight * 2., 10., 0.15, 4.))
                    .unwrap();
                network
                    .add_link(node(row + 1, col), node(row, col), CostFunction::linear(weight))
                    .unwrap();
            }
        }
    }
    network
}

fn bellman_ford(network: &Network, origin: NodeId) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; network.node_count()];
    dist[origin] = 0.;
    for _ in 0..network.node_count() {
        for link in network.links() {
            if dist[link.src] + link.cost() < dist[link.dest] {
                dist[link.dest] = dist[link.src] + link.cost();
            }
        }
    }
    dist
}

#[rstest]
fn min_tree_matches_bellman_ford(#[values(2, 3, 6)] size: usize, #[values(0., 7.5)] flow: f64) {
    let mut network = grid_network(size);
    for id in 0..network.link_count() {
        network.add_flow(id, flow * (id % 3) as f64, 1e-12);
    }
    for origin in [0, size * size - 1, size / 2] {
        let expected = bellman_ford(&network, origin);
        let tree = network.build_min_tree(origin).to_vec();
        for node in 0..network.node_count() {
            assert_abs_diff_eq!(tree[node].pi_min, expected[node], epsilon = 1e-9);
            if let Some(link_id) = tree[node].alpha_min {
                let link = network.link(link_id);
                assert_eq!(link.dest, node);
                assert_abs_diff_eq!(tree[link.src].pi_min + link.cost(), tree[node].pi_min, epsilon = 1e-9);
            } else {
                assert_eq!(node, origin);
            }
        }
    }
}
