use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use env_logger::Builder;
use log::{info, warn};
use serde::Serialize;

use dslab_traffic::tntp::{read_network_file, read_solution_file, read_trips_file};
use dslab_traffic::{KnownSolution, LinkFlow, Network};
use dslab_traffic_assignment::{find_equilibrium, AlgorithmKind, EquilibriumReport, GapKind, SolverConfig};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Computes user equilibrium link flows for a network in TNTP format
struct Args {
    /// Path to network file (*_net.tntp)
    #[arg(short, long)]
    network: PathBuf,

    /// Path to trips file (*_trips.tntp)
    #[arg(short = 'd', long)]
    trips: PathBuf,

    /// Path to file with known equilibrium flows (*_flow.tntp) to compare with
    #[arg(short, long)]
    solution: Option<PathBuf>,

    /// Path to YAML file with solver configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to produced JSON file with link flows (default - print to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Algorithm: b or tapas
    #[arg(short, long)]
    algorithm: Option<AlgorithmKind>,

    /// Gap used as stopping criterion: relative or max
    #[arg(short, long)]
    gap: Option<GapKind>,

    /// Target gap value
    #[arg(short = 'e', long)]
    max_error: Option<f64>,

    /// Maximum number of iterations
    #[arg(short = 'i', long)]
    max_iterations: Option<usize>,

    /// Number of threads used by Algorithm B
    #[arg(short, long)]
    threads: Option<usize>,
}

#[derive(Serialize)]
struct Output {
    report: EquilibriumReport,
    total_travel_time: f64,
    links: Vec<LinkFlow>,
}

fn load_config(args: &Args) -> Result<SolverConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => SolverConfig::from_file(&path.to_string_lossy())?,
        None => SolverConfig::default(),
    };
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(gap) = args.gap {
        config.gap = gap;
    }
    if let Some(max_error) = args.max_error {
        config.max_error = max_error;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.validate()?;
    Ok(config)
}

fn compare(network: &Network, solution: &KnownSolution) -> Result<(), Box<dyn Error>> {
    let comparison = solution.compare(network, KnownSolution::DEFAULT_THRESHOLD)?;
    for mismatch in &comparison.mismatches {
        warn!(
            "Link ({}, {}): flow {:.4}, expected {:.4}",
            mismatch.init_node, mismatch.term_node, mismatch.flow, mismatch.expected
        );
    }
    info!(
        "Compared {} links with known solution, max difference {:.6}",
        solution.len(),
        comparison.max_difference
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let data = read_network_file(&args.network)?;
    let demand = read_trips_file(&args.trips, data.node_count)?;
    let network = Network::from_records(data.node_count, &data.links, demand)?;

    let (network, report) = find_equilibrium(network, &config)?;
    if !report.converged {
        warn!("Iteration limit reached before the target gap");
    }

    if let Some(path) = &args.solution {
        let solution = read_solution_file(path)?;
        compare(&network, &solution)?;
    }

    let output = Output {
        report,
        total_travel_time: network.total_travel_time(),
        links: network.link_flows(),
    };
    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => std::fs::File::create(path)?.write_all(json.as_bytes())?,
        None => println!("{}", json),
    }
    Ok(())
}
