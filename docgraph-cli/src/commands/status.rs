use std::path::Path;

use anyhow::Context;
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs, store_dir: &Path) -> anyhow::Result<()> {
    let graph = super::open_existing(store_dir)?;
    let file = super::graph_file(store_dir)?;

    let stats = graph
        .store()
        .stats()
        .await
        .context("Failed to read store stats")?;

    if args.json {
        return super::print_json(&stats);
    }

    println!("docgraph status for {}", store_dir.display());
    println!();
    println!("  Graph file: {}", file.display());
    println!("  Size:       {}", format_bytes(stats.file_size_bytes));
    println!();

    println!("  Nodes: {} total ({} archived)", stats.total_nodes, stats.archived_nodes);
    let mut kinds: Vec<_> = stats.nodes_by_kind.iter().collect();
    kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (kind, count) in &kinds {
        println!("    {kind:<20} {count:>6}");
    }
    println!();

    println!("  Edges: {} total", stats.total_edges);
    let mut kinds: Vec<_> = stats.edges_by_kind.iter().collect();
    kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (kind, count) in &kinds {
        println!("    {kind:<20} {count:>6}");
    }

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
