use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub action: PrefsAction,
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Record that a user deployed with an SSG
    Track {
        #[arg(long)]
        user: String,
        #[arg(long)]
        ssg: String,
        /// The deployment failed
        #[arg(long)]
        failed: bool,
        /// When it happened (RFC 3339, default: now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        project_type: Option<String>,
    },
    /// Show a user's preferences and per-SSG success rates
    Show {
        #[arg(long)]
        user: String,
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a user's preferred SSG list
    Set {
        #[arg(long)]
        user: String,
        /// Preferred SSGs, most preferred first
        #[arg(long, value_delimiter = ',')]
        preferred: Vec<String>,
        /// Allow personal history to override recommendations
        #[arg(long)]
        auto_apply: Option<bool>,
    },
}

pub async fn run(args: PrefsArgs, store_dir: &Path) -> anyhow::Result<()> {
    match args.action {
        PrefsAction::Track {
            user,
            ssg,
            failed,
            at,
            project_type,
        } => {
            let graph = super::open_writable(store_dir)?;
            graph
                .preferences()
                .track_ssg_usage(&user, &ssg, !failed, at, project_type.as_deref())
                .await
                .with_context(|| format!("Failed to track usage for {user}"))?;
            println!("Tracked {ssg} for {user}");
            Ok(())
        }
        PrefsAction::Show { user, json } => {
            let graph = super::open_existing(store_dir)?;
            let prefs = graph.preferences();
            let Some(record) = prefs.user_record(&user) else {
                anyhow::bail!("No preferences recorded for user {user}");
            };
            let stats = prefs.personal_stats(&user, Utc::now());
            if json {
                return super::print_json(&serde_json::json!({
                    "user_id": record.user_id,
                    "preferred_ssgs": record.preferred_ssgs,
                    "auto_apply": record.auto_apply,
                    "stats": stats,
                }));
            }
            println!("Preferences for {user}");
            println!();
            let preferred = if record.preferred_ssgs.is_empty() {
                "(none)".to_string()
            } else {
                record.preferred_ssgs.join(", ")
            };
            println!("  Preferred:  {preferred}");
            println!("  Auto-apply: {}", record.auto_apply);
            if !stats.is_empty() {
                println!();
                for s in stats.values() {
                    println!(
                        "  {:<14} {:>3}/{:<3} {:>7}  last {}",
                        s.ssg,
                        s.successes,
                        s.uses,
                        super::percent(s.rate),
                        s.last_used.format("%Y-%m-%d")
                    );
                }
            }
            Ok(())
        }
        PrefsAction::Set {
            user,
            preferred,
            auto_apply,
        } => {
            let graph = super::open_writable(store_dir)?;
            graph
                .preferences()
                .set_preferences(&user, &preferred, auto_apply)
                .await
                .with_context(|| format!("Failed to update preferences for {user}"))?;
            println!("Updated preferences for {user}");
            Ok(())
        }
    }
}
