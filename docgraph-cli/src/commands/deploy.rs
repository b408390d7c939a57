use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;

use docgraph_core::events::DeploymentMetadata;
use docgraph_core::types::NodeId;

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Project node id (e.g. `project:…`)
    #[arg(long)]
    pub project: String,

    /// Static site generator that was deployed
    #[arg(long)]
    pub ssg: String,

    /// The deployment failed
    #[arg(long)]
    pub failed: bool,

    /// When the deployment happened (RFC 3339, default: now)
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Build duration in milliseconds
    #[arg(long)]
    pub build_time_ms: Option<u64>,

    /// Error message of a failed deployment
    #[arg(long)]
    pub error: Option<String>,

    /// URL the site was deployed to
    #[arg(long)]
    pub url: Option<String>,

    /// Caller-supplied token; repeated submissions are recorded once
    #[arg(long)]
    pub token: Option<String>,

    /// Extra metadata as key=value (repeatable)
    #[arg(long = "meta", value_parser = parse_key_value)]
    pub meta: Vec<(String, String)>,
}

pub async fn run(args: DeployArgs, store_dir: &Path) -> anyhow::Result<()> {
    let graph = super::open_writable(store_dir)?;
    let metadata = DeploymentMetadata {
        timestamp: args.at,
        build_time_ms: args.build_time_ms,
        error_message: args.error,
        deployment_url: args.url,
        extra: args
            .meta
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect::<BTreeMap<_, _>>(),
    };
    let project = NodeId::from(args.project.as_str());
    let edge = graph
        .record_deployment(&project, &args.ssg, !args.failed, metadata, args.token.as_deref())
        .await
        .with_context(|| format!("Failed to record deployment for {project}"))?;

    let outcome = if args.failed { "failed" } else { "succeeded" };
    println!("Recorded {outcome} deployment {} -> {}", edge.source, edge.target);
    Ok(())
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_pairs_split_on_first_equals() {
        assert_eq!(
            parse_key_value("branch=main=x").unwrap(),
            ("branch".to_string(), "main=x".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=v").is_err());
    }
}
