use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use docgraph_core::recommend::{Priority, Recommendation, RecommendationRequest, StageStatus};
use docgraph_core::types::NodeId;

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Project node id to recommend for
    #[arg(long, conflicts_with = "path")]
    pub project: Option<String>,

    /// Repository path of an already recorded project
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Ecosystem to assume instead of the detected one
    #[arg(long)]
    pub ecosystem: Option<String>,

    /// What matters most: performance, simplicity or features
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Force a specific SSG; later stages only annotate it
    #[arg(long)]
    pub ssg: Option<String>,

    /// Apply this user's personal deployment history
    #[arg(long)]
    pub user: Option<String>,

    /// Persist the recommendation as a graph edge
    #[arg(long)]
    pub record: bool,

    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: RecommendArgs, store_dir: &Path) -> anyhow::Result<()> {
    let graph = if args.record {
        super::open_writable(store_dir)?
    } else {
        super::open_existing(store_dir)?
    };

    let project_id = match (&args.project, &args.path) {
        (Some(id), _) => Some(NodeId::from(id.as_str())),
        (None, Some(path)) => {
            let project = graph
                .resolver()
                .find_project(path)
                .with_context(|| format!("Cannot resolve path: {}", path.display()))?
                .with_context(|| format!("No project recorded for {}", path.display()))?;
            Some(project.id)
        }
        (None, None) => None,
    };

    let request = RecommendationRequest {
        project_id: project_id.clone(),
        ecosystem: args.ecosystem,
        priority: args.priority,
        ssg: args.ssg,
        user_id: args.user,
    };
    let recommendation = graph.recommend(&request).context("Recommendation failed")?;

    if args.record {
        let project = project_id.context("--record needs --project or --path")?;
        graph
            .record_recommendation(&project, &recommendation)
            .await
            .context("Failed to record recommendation")?;
    }

    if args.json {
        return super::print_json(&recommendation);
    }
    print_recommendation(&recommendation);
    Ok(())
}

fn print_recommendation(rec: &Recommendation) {
    println!(
        "Recommended: {} (confidence {})",
        rec.recommended,
        super::percent(rec.confidence)
    );
    println!();
    println!("  Reasoning:");
    for reason in &rec.reasoning {
        println!("    - {reason}");
    }
    if !rec.alternatives.is_empty() {
        println!();
        println!("  Alternatives:");
        for alt in &rec.alternatives {
            println!("    {:<12} {:>6}  {}", alt.ssg, super::percent(alt.score), alt.reason);
        }
    }
    let degraded: Vec<_> = rec
        .stages
        .iter()
        .filter(|s| s.status == StageStatus::Degraded)
        .collect();
    if !degraded.is_empty() {
        println!();
        for stage in degraded {
            println!("  Warning: {} stage degraded: {}", stage.stage, stage.detail);
        }
    }
}
