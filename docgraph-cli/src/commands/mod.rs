pub mod analytics;
pub mod deploy;
pub mod prefs;
pub mod project;
pub mod recommend;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use docgraph_core::config::DocGraphConfig;
use docgraph_core::graph::DocGraph;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show what the knowledge graph currently holds
    Status(status::StatusArgs),
    /// Create or update a project from a scanner descriptor (JSON)
    Project(project::ProjectArgs),
    /// Record the outcome of a documentation deployment
    Deploy(deploy::DeployArgs),
    /// Recommend a static site generator
    Recommend(recommend::RecommendArgs),
    /// Per-SSG deployment statistics, ranked
    Stats(analytics::StatsArgs),
    /// Success-rate trends over consecutive windows
    Trends(analytics::TrendsArgs),
    /// Overall deployment health score
    Health(analytics::HealthArgs),
    /// Inspect or change a user's SSG preferences
    Prefs(prefs::PrefsArgs),
}

pub async fn run(cmd: Command, store_dir: &Path) -> anyhow::Result<()> {
    match cmd {
        Command::Status(args) => status::run(args, store_dir).await,
        Command::Project(args) => project::run(args, store_dir).await,
        Command::Deploy(args) => deploy::run(args, store_dir).await,
        Command::Recommend(args) => recommend::run(args, store_dir).await,
        Command::Stats(args) => analytics::run_stats(args, store_dir),
        Command::Trends(args) => analytics::run_trends(args, store_dir),
        Command::Health(args) => analytics::run_health(args, store_dir),
        Command::Prefs(args) => prefs::run(args, store_dir).await,
    }
}

/// Path of the graph file inside `store_dir`, honoring `config.toml`.
pub(crate) fn graph_file(store_dir: &Path) -> anyhow::Result<PathBuf> {
    let config = DocGraphConfig::load_from_dir(store_dir)
        .with_context(|| format!("Cannot load config from {}", store_dir.display()))?;
    Ok(store_dir.join(config.store.file_name))
}

/// Open the graph for writing, creating the storage directory on first use.
pub(crate) fn open_writable(store_dir: &Path) -> anyhow::Result<DocGraph> {
    tracing::debug!(dir = %store_dir.display(), "Opening knowledge graph for writing");
    DocGraph::open(store_dir)
        .with_context(|| format!("Cannot open knowledge graph in {}", store_dir.display()))
}

/// Open an existing graph for queries. Fails when nothing was recorded yet.
pub(crate) fn open_existing(store_dir: &Path) -> anyhow::Result<DocGraph> {
    let file = graph_file(store_dir)?;
    if !file.exists() {
        anyhow::bail!(
            "docgraph is not initialized in {}. Run `docgraph project` first.",
            store_dir.display()
        );
    }
    DocGraph::open_read_only(store_dir)
        .with_context(|| format!("Cannot open knowledge graph in {}", store_dir.display()))
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

pub(crate) fn percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}
