// Integration test utilities and fixtures for docgraph.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use docgraph_core::events::DeploymentMetadata;
use docgraph_core::graph::DocGraph;
use docgraph_core::resolve::ProjectDescriptor;
use docgraph_core::types::NodeId;

/// A knowledge graph persisted in a temporary directory.
#[derive(Debug)]
pub struct TestGraph {
    pub dir: tempfile::TempDir,
    pub graph: DocGraph,
}

impl TestGraph {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let graph = DocGraph::open(dir.path()).expect("open graph");
        Self { dir, graph }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Close the writer and open the same directory again, as a fresh
    /// process would.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self { dir, graph } = self;
        drop(graph);
        let graph = DocGraph::open(dir.path()).expect("reopen graph");
        Self { dir, graph }
    }
}

impl Default for TestGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed reference instant so time-dependent results are reproducible.
pub fn reference_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).expect("valid timestamp")
}

pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// A scanner descriptor with one language per entry and an optional ecosystem.
pub fn descriptor(path: &str, ecosystem: Option<&str>, languages: &[(&str, u64)]) -> ProjectDescriptor {
    let mut d = ProjectDescriptor::new(path);
    d.ecosystem = ecosystem.map(str::to_string);
    for (lang, files) in languages {
        d.languages.insert((*lang).to_string(), *files);
    }
    d.total_files = languages.iter().map(|(_, n)| n).sum();
    d
}

/// Record `successes` then `failures` deployments one minute apart,
/// starting at `start`.
pub async fn seed_deployments(
    graph: &DocGraph,
    project: &NodeId,
    ssg: &str,
    successes: usize,
    failures: usize,
    start: DateTime<Utc>,
) -> anyhow::Result<()> {
    let outcomes = std::iter::repeat_n(true, successes).chain(std::iter::repeat_n(false, failures));
    for (i, success) in outcomes.enumerate() {
        let metadata = DeploymentMetadata {
            timestamp: Some(start + Duration::minutes(i64::try_from(i)?)),
            ..DeploymentMetadata::default()
        };
        graph
            .record_deployment(project, ssg, success, metadata, None)
            .await?;
    }
    Ok(())
}
