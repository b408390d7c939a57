use std::path::PathBuf;

use clap::Parser;
use docgraph_core::error::{DocGraphError, StoreError};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "docgraph",
    version,
    about = "Track documentation deployments and recommend static site generators"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Storage directory holding the knowledge graph
    #[arg(long, env = "DOCGRAPH_STORE_DIR", default_value = ".docgraph", global = true)]
    store_dir: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into an exit code.
///
///   0: success
///   1: general/unknown error
///   2: configuration error
///   3: storage directory not initialized
///   4: storage error (corruption, failed write, unsupported version)
///   5: another process holds the writer lock
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let typed = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<DocGraphError>());
    match typed {
        Some(DocGraphError::Config(_)) => return 2,
        Some(DocGraphError::Store(StoreError::LockContention { .. })) => return 5,
        Some(DocGraphError::Store(
            StoreError::Corruption { .. }
            | StoreError::UnsupportedVersion { .. }
            | StoreError::Write { .. }
            | StoreError::Io(_)
            | StoreError::Serialization(_),
        )) => return 4,
        _ => {}
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("not initialized") {
        3
    } else if lower.contains("config") {
        2
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, &cli.store_dir)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_not_initialized() {
        let err = anyhow::anyhow!("docgraph is not initialized in /foo. Run `docgraph project` first.");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_config() {
        let err: anyhow::Error =
            DocGraphError::Config(docgraph_core::error::ConfigError::Parse("bad toml".into())).into();
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_lock_contention_through_context() {
        let err = Err::<(), _>(DocGraphError::Store(StoreError::LockContention {
            path: PathBuf::from("/x/.docgraph.lock"),
        }))
        .context("Cannot open store")
        .unwrap_err();
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_corruption() {
        let err: anyhow::Error = DocGraphError::Store(StoreError::Corruption {
            path: PathBuf::from("/x/knowledge-graph.json"),
            reason: "bad json".into(),
        })
        .into();
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
