use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use export_bipartite::assemble;
use export_bipartite::data_load;
use export_bipartite::env_loader;
use export_bipartite::graph_build;
use export_bipartite::models::{FilterParams, Mode};

/// Export a bipartite actor–organization graph to D3 JSON with
/// structural filtering.
#[derive(Parser)]
#[command(name = "export")]
#[command(about = "Export bipartite graph to D3 JSON with structural filtering")]
#[command(version)]
struct Cli {
    /// Which bipartite graph to output: mep, commission, or full
    #[arg(long)]
    mode: String,

    /// Include nodes with no edges (usually not needed for D3)
    #[arg(long)]
    keep_isolates: bool,

    /// Drop org nodes with degree < this (edge-row degree); default drops degree-1 orgs
    #[arg(long, default_value_t = 2)]
    org_min_degree: i64,

    /// Drop actor nodes with degree < this; default keeps all actors
    #[arg(long, default_value_t = 1)]
    actor_min_degree: i64,

    /// Iterative pruning on BOTH sides: keep only nodes with degree >= k; 0 disables
    #[arg(long, default_value_t = 0)]
    bipartite_k_core: i64,

    /// Drop aggregated edges with weight < this; use 2 to remove one-off ties
    #[arg(long, default_value_t = 1)]
    min_edge_weight: i64,

    /// Optional output path override
    #[arg(long)]
    out: Option<PathBuf>,

    /// Optional data directory override (default: DATA_DIR env or ./data)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    let cli = Cli::parse();
    let mode = Mode::from_str(&cli.mode)?;
    let params = FilterParams {
        org_min_degree: cli.org_min_degree,
        actor_min_degree: cli.actor_min_degree,
        bipartite_k_core: cli.bipartite_k_core,
        min_edge_weight: cli.min_edge_weight,
        keep_isolates: cli.keep_isolates,
    };
    let data_dir = data_load::resolve_data_dir(cli.data_dir.as_deref());

    info!("Starting bipartite graph export (mode: {}).", mode.as_str());
    let graph = graph_build::build_graph_for_mode(mode, &params, &data_dir)?;
    info!(
        "Graph built: {} nodes, {} links.",
        graph.nodes.len(),
        graph.links.len()
    );

    let out_path = cli.out.unwrap_or_else(|| {
        env_loader::out_dir().join(format!("bipartite_d3_{}.json", mode.as_str()))
    });
    assemble::save_json(&graph, &out_path)?;
    info!("Export completed successfully.");

    Ok(())
}
