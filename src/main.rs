use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use newman_cluster::cluster::metrics;
use newman_cluster::cluster::weights::Weights;
use newman_cluster::config::Config;
use newman_cluster::data::parquet::{load_transactions, TransactionColumns};
use newman_cluster::graph::algorithms::connected_components;
use newman_cluster::graph::builder::WEIGHT_ATTRIBUTE;
use newman_cluster::registry::ClusterRegistry;
use newman_cluster::storage::{self, VertexIdMap};
use newman_cluster::{viz, ClusterState, CompressedGraph, ExcludedState, GraphSnapshot, Interaction};

const STATE_FILE: &str = "state.json";
const GRAPH_CACHE: &str = "graph.bin";

#[derive(Parser, Debug)]
#[clap(
    name = "newman-cluster",
    about = "Hierarchical Fast Newman clustering of transaction graphs"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Number of worker threads (0 = use all available cores)
    #[clap(long, default_value = "0", global = true)]
    threads: usize,

    /// Verbose logging
    #[clap(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cluster a Parquet transaction table
    Cluster {
        /// Path to input Parquet file
        #[clap(long)]
        input: String,

        /// Output directory for results
        #[clap(long, default_value = "cluster_results")]
        output_dir: PathBuf,

        #[clap(long, default_value = "Fid")]
        source_column: String,

        #[clap(long, default_value = "TargetFid")]
        target_column: String,

        /// Float column used as transaction weight
        #[clap(long)]
        weight_column: Option<String>,

        /// Keep only rows whose LinkType equals this value
        #[clap(long)]
        link_type: Option<String>,

        /// Do not merge pendant links first
        #[clap(long)]
        no_pendants_first: bool,

        /// Minimum cluster size reported in result files
        #[clap(long, default_value = "3")]
        min_cluster_size: usize,

        /// Mark the state as non-interactive
        #[clap(long)]
        non_interactive: bool,

        /// Exclude vertices that have not joined a cluster
        #[clap(long)]
        exclude_single: bool,

        #[clap(long, value_enum, default_value = "show")]
        excluded: ExcludedArg,

        /// Cancel the merge after this many seconds
        #[clap(long)]
        timeout_secs: Option<u64>,

        /// Skip visualizations
        #[clap(long)]
        skip_viz: bool,

        /// Also write shortest paths between the clusters of the cut
        #[clap(long)]
        paths: bool,
    },

    /// Move the cut of a saved clustering and rewrite its outputs
    Inspect {
        /// Directory written by a previous `cluster` run
        #[clap(long, default_value = "cluster_results")]
        output_dir: PathBuf,

        /// Step to cut the forest at
        #[clap(long, conflicts_with = "optimum")]
        step: Option<u32>,

        /// Return to the optimum step
        #[clap(long)]
        optimum: bool,

        #[clap(long)]
        exclude_single: Option<bool>,

        #[clap(long, value_enum)]
        excluded: Option<ExcludedArg>,

        #[clap(long, default_value = "3")]
        min_cluster_size: usize,

        #[clap(long)]
        skip_viz: bool,

        #[clap(long)]
        paths: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExcludedArg {
    Show,
    Hidden,
    Dimmed,
}

impl From<ExcludedArg> for ExcludedState {
    fn from(arg: ExcludedArg) -> Self {
        match arg {
            ExcludedArg::Show => ExcludedState::Show,
            ExcludedArg::Hidden => ExcludedState::Hidden,
            ExcludedArg::Dimmed => ExcludedState::Dimmed,
        }
    }
}

/// Optional outputs of a run
#[derive(Debug, Clone, Copy)]
struct Outputs {
    skip_viz: bool,
    paths: bool,
}

#[derive(Debug)]
struct Progress {
    step: u32,
    total: u32,
    label: String,
    indeterminate: bool,
}

/// Forwards merge progress to the main thread
struct ChannelInteraction<'a> {
    sender: Sender<Progress>,
    cancelled: &'a AtomicBool,
}

impl Interaction for ChannelInteraction<'_> {
    fn set_progress(&self, step: u32, total: u32, label: &str, indeterminate: bool) {
        // The receiver only goes away once the run is over
        let _ = self.sender.send(Progress {
            step,
            total,
            label: label.to_string(),
            indeterminate,
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Cli::parse();

    // Configure logging
    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();

    let config = Config {
        threads: args.threads,
        ..Default::default()
    };
    let num_threads = config.worker_threads();

    log::info!("Using {} worker threads", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;

    match args.command {
        Command::Cluster {
            input,
            output_dir,
            source_column,
            target_column,
            weight_column,
            link_type,
            no_pendants_first,
            min_cluster_size,
            non_interactive,
            exclude_single,
            excluded,
            timeout_secs,
            skip_viz,
            paths,
        } => {
            let config = Config {
                weight_attribute: weight_column.as_ref().map(|_| WEIGHT_ATTRIBUTE.to_string()),
                cluster_pendants_first: !no_pendants_first,
                interactive: !non_interactive,
                exclude_single_vertices: exclude_single,
                excluded_state: excluded.into(),
                min_cluster_size,
                ..config
            };
            let columns = TransactionColumns {
                source: source_column,
                target: target_column,
                weight: weight_column,
                filter: link_type.map(|value| ("LinkType".to_string(), value)),
            };
            let outputs = Outputs { skip_viz, paths };
            run_cluster(&input, &output_dir, &columns, &config, timeout_secs.map(Duration::from_secs), outputs)
        }
        Command::Inspect {
            output_dir,
            step,
            optimum,
            exclude_single,
            excluded,
            min_cluster_size,
            skip_viz,
            paths,
        } => run_inspect(&output_dir, step, optimum, exclude_single, excluded, min_cluster_size, Outputs { skip_viz, paths }),
    }
}

fn run_cluster(
    input: &str,
    output_dir: &Path,
    columns: &TransactionColumns,
    config: &Config,
    timeout: Option<Duration>,
    outputs: Outputs,
) -> Result<()> {
    log::info!("Starting cluster analysis");
    log::info!("Input: {}", input);
    log::info!("Output: {}", output_dir.display());

    std::fs::create_dir_all(output_dir)?;

    // 1. Load data
    let graph = load_transactions(input, columns)?;

    let mut components = connected_components(&graph);
    components.sort_unstable();
    components.dedup();
    log::info!(
        "Loaded graph with {} vertices, {} links in {} components",
        graph.vertex_count(),
        graph.link_count(),
        components.len()
    );

    storage::save_graph_cache(&output_dir.join(GRAPH_CACHE), &graph)?;

    // 2. Merge on a worker thread while the main thread reports progress
    let registry = ClusterRegistry::new();
    let cancelled = AtomicBool::new(false);
    let options = config.merge_options(&graph);
    let deadline = timeout.map(|t| Instant::now() + t);

    let steps = std::thread::scope(|scope| {
        let (sender, receiver) = channel::unbounded();
        let interaction = ChannelInteraction { sender, cancelled: &cancelled };
        let worker = scope.spawn(|| {
            let interaction = interaction;
            registry.recluster(input, &graph, options, config.interactive, &interaction)
        });

        let mut last_logged = Instant::now();
        loop {
            match receiver.recv_timeout(Duration::from_millis(200)) {
                Ok(progress) => {
                    if progress.indeterminate || last_logged.elapsed() >= Duration::from_secs(1) {
                        log::info!("{}: {}/{}", progress.label, progress.step, progress.total);
                        last_logged = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if deadline.map_or(false, |d| Instant::now() >= d) && !cancelled.swap(true, Ordering::Relaxed) {
                log::warn!("Timeout reached, cancelling merge");
            }
        }

        worker.join().map_err(|_| anyhow::anyhow!("Merge worker panicked"))
    })??;

    log::info!("Merged in {} steps", steps);

    // 3. Apply display settings
    let mut state = registry.detach(input).context("Clustering state missing after merge")?;
    state.set_exclude_single_vertices(config.exclude_single_vertices);
    state.set_excluded_state(config.excluded_state);

    // 4. Save results
    write_outputs(&graph, &mut state, config, output_dir, outputs)?;

    log::info!("Analysis complete. Results saved to {}", output_dir.display());

    Ok(())
}

fn run_inspect(
    output_dir: &Path,
    step: Option<u32>,
    optimum: bool,
    exclude_single: Option<bool>,
    excluded: Option<ExcludedArg>,
    min_cluster_size: usize,
    outputs: Outputs,
) -> Result<()> {
    let graph = storage::load_graph_cache(&output_dir.join(GRAPH_CACHE))?;
    let ids = VertexIdMap::identity(graph.vertex_capacity());
    let mut state = storage::load_state(&output_dir.join(STATE_FILE), &ids)?
        .context("No clustering has been computed for this graph")?;

    if state.is_stale(graph.structure_modification_counter()) {
        log::warn!("Graph structure changed since the clustering was computed");
    }

    if optimum {
        state.reset_to_optimum();
    } else if let Some(step) = step {
        state.set_current_step(step)?;
    }
    if let Some(exclude) = exclude_single {
        state.set_exclude_single_vertices(exclude);
    }
    if let Some(excluded) = excluded {
        state.set_excluded_state(excluded.into());
    }
    state.set_modification_counter(state.modification_counter() + 1);

    log::info!(
        "Step {} of {} (optimum {}), {} clusters",
        state.current_step(),
        state.steps(),
        state.optimum_step(),
        state.current_number_of_clusters()
    );

    // Falls back to transaction counts when the graph carries no weights
    let config = Config {
        weight_attribute: Some(WEIGHT_ATTRIBUTE.to_string()),
        min_cluster_size,
        ..Default::default()
    };
    write_outputs(&graph, &mut state, &config, output_dir, outputs)
}

fn write_outputs(
    graph: &CompressedGraph,
    state: &mut ClusterState,
    config: &Config,
    output_dir: &Path,
    outputs: Outputs,
) -> Result<()> {
    let weights = Weights::compute(graph, config.weight_attribute.as_deref());
    let modularity = metrics::current_modularity(graph, &weights, state)?;
    log::info!("Modularity at step {}: {:.4}", state.current_step(), modularity);

    let clusters = metrics::summarize_clusters(graph, state, config.min_cluster_size)?;
    log::info!("Found {} clusters of at least {} vertices", clusters.len(), config.min_cluster_size);

    storage::save_results(&clusters, graph, state, modularity, output_dir)?;

    // Generate visualizations if requested
    if !outputs.skip_viz {
        let overlay = viz::compute_overlay(graph, state)?;
        viz::write_overlay(&overlay, graph, output_dir)?;
    }

    if outputs.paths {
        let paths = metrics::shortest_paths_between_clusters(graph, state)?;
        storage::save_cluster_paths(&paths, graph, output_dir)?;
    }

    storage::save_state(&output_dir.join(STATE_FILE), Some(state))?;

    Ok(())
}
