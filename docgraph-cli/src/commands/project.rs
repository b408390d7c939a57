use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use docgraph_core::resolve::ProjectDescriptor;

#[derive(Args, Debug)]
pub struct ProjectArgs {
    /// Scanner descriptor as JSON (`-` reads stdin)
    pub descriptor: PathBuf,

    /// Emit the resulting project node as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ProjectArgs, store_dir: &Path) -> anyhow::Result<()> {
    let raw = if args.descriptor.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Cannot read descriptor from stdin")?
    } else {
        std::fs::read_to_string(&args.descriptor)
            .with_context(|| format!("Cannot read descriptor: {}", args.descriptor.display()))?
    };
    let descriptor: ProjectDescriptor =
        serde_json::from_str(&raw).context("Descriptor is not a valid project JSON document")?;

    let graph = super::open_writable(store_dir)?;
    let resolved = graph
        .resolver()
        .resolve(&descriptor)
        .await
        .context("Failed to record project")?;

    if args.json {
        return super::print_json(&resolved.node);
    }

    let verb = if resolved.created { "Created" } else { "Updated" };
    println!("{verb} {}", resolved.node.id);
    if !resolved.changed_fields.is_empty() {
        println!("  Changed: {}", resolved.changed_fields.join(", "));
    }
    Ok(())
}
