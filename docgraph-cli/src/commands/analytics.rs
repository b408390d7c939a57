use std::path::Path;

use anyhow::Context;
use clap::Args;

use docgraph_core::analyze::Scope;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// SSGs to compare (default: every SSG with recorded deployments)
    pub ssgs: Vec<String>,

    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TrendsArgs {
    /// Window length in days
    #[arg(long, default_value_t = 30)]
    pub period_days: u32,

    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run_stats(args: StatsArgs, store_dir: &Path) -> anyhow::Result<()> {
    let graph = super::open_existing(store_dir)?;
    let analytics = graph.analytics();
    let ranked = if args.ssgs.is_empty() {
        analytics.rank_known_ssgs(&Scope::All, &analytics.control())
    } else {
        analytics.compare_ssgs(&args.ssgs, &Scope::All, &analytics.control())
    }
    .context("Failed to compute SSG statistics")?;

    if args.json {
        return super::print_json(&ranked);
    }
    if ranked.is_empty() {
        println!("No deployments recorded yet.");
        return Ok(());
    }

    println!("  {:<14} {:>8} {:>9} {:>8}  Last success", "SSG", "Deploys", "Failures", "Rate");
    for stats in &ranked {
        let last = stats
            .last_success
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d").to_string());
        println!(
            "  {:<14} {:>8} {:>9} {:>8}  {last}",
            stats.ssg,
            stats.total,
            stats.failures,
            super::percent(stats.rate)
        );
    }
    Ok(())
}

pub fn run_trends(args: TrendsArgs, store_dir: &Path) -> anyhow::Result<()> {
    let graph = super::open_existing(store_dir)?;
    let report = graph
        .identify_trends(args.period_days)
        .context("Failed to compute trends")?;

    if args.json {
        return super::print_json(&report);
    }

    println!(
        "Trend over {}-day windows: {}",
        report.period_days,
        report.direction
    );
    for window in &report.windows {
        println!(
            "  {} .. {}  {:>5} deploys  {:>7}",
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
            window.total,
            super::percent(window.rate)
        );
    }
    if !report.by_ssg.is_empty() {
        println!();
        for (ssg, trend) in &report.by_ssg {
            println!("  {ssg:<14} {}", trend.direction);
        }
    }
    Ok(())
}

pub fn run_health(args: HealthArgs, store_dir: &Path) -> anyhow::Result<()> {
    let graph = super::open_existing(store_dir)?;
    let report = graph.health_report().context("Failed to compute health")?;

    if args.json {
        return super::print_json(&report);
    }

    println!("Deployment health: {}/100", report.score);
    println!();
    println!("  Success rate:   {}", super::percent(report.success_rate));
    println!("  Recent trend:   {}", super::percent(report.active_trend));
    println!("  Frequency:      {}", super::percent(report.frequency));
    println!("  SSG diversity:  {}", super::percent(report.diversity));
    println!(
        "  {} deployments across {} active projects (last {} days)",
        report.total_deployments, report.active_projects, report.window_days
    );
    Ok(())
}
