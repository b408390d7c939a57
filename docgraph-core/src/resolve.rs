// Entity resolution: map repeated repository observations onto one canonical
// project node, merging new data into it with a bounded audit trail.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::ResolverSection;
use crate::contracts::keys;
use crate::error::ValidationError;
use crate::store::GraphStore;
use crate::store::schema::{AnalysisRecord, AuditEntry, LinkRecord, ProjectRecord, PropertyRecord};
use crate::types::{Edge, EdgeKind, Node, NodeKind, Properties};

/// What the repository scanner reports about a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDescriptor {
    pub path: PathBuf,
    /// Externally supplied analysis id; preferred over the path as match key.
    pub analysis_id: Option<String>,
    pub name: Option<String>,
    /// Language → file count.
    pub languages: BTreeMap<String, u64>,
    pub dependencies: Vec<String>,
    pub frameworks: Vec<String>,
    pub ecosystem: Option<String>,
    pub project_type: Option<String>,
    pub complexity: Option<String>,
    pub total_files: u64,
    pub has_tests: bool,
    pub has_ci: bool,
    pub has_docs: bool,
}

impl ProjectDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Most frequent language; ties go to the alphabetically first name.
    pub fn primary_language(&self) -> Option<String> {
        self.languages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(lang, _)| lang.to_lowercase())
    }
}

/// Result of resolving one observation.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub node: Node,
    /// The observation created a new project node.
    pub created: bool,
    /// Properties whose value changed in this merge.
    pub changed_fields: Vec<String>,
}

/// Absolute, lexically normalized path and its case-folded match key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    pub display: String,
    pub key: String,
}

/// Normalize a path without touching the filesystem beyond resolving the
/// working directory for relative input.
pub fn canonicalize_path(path: &Path) -> Result<CanonicalPath, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidValue {
        field: keys::PATH.into(),
        reason,
    };
    if path.as_os_str().is_empty() {
        return Err(invalid("path must not be empty".into()));
    }
    let absolute = std::path::absolute(path).map_err(|e| invalid(e.to_string()))?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    let mut display = normalized.to_string_lossy().replace('\\', "/");
    while display.len() > 1 && display.ends_with('/') {
        display.pop();
    }
    let key = display.to_lowercase();
    Ok(CanonicalPath { display, key })
}

#[derive(Debug, Clone)]
pub struct EntityResolver {
    store: Arc<dyn GraphStore>,
    config: ResolverSection,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn GraphStore>, config: ResolverSection) -> Self {
        Self { store, config }
    }

    /// Find the project node an observation of `path` would resolve to.
    pub fn find_project(&self, path: &Path) -> crate::error::Result<Option<Node>> {
        let canonical = canonicalize_path(path)?;
        let mut lookup = Properties::new();
        lookup.insert(keys::PATH_KEY.into(), canonical.key.into());
        Ok(self
            .store
            .snapshot()
            .node_by_natural_key(NodeKind::Project, &lookup)
            .cloned())
    }

    /// Find-or-create the canonical project node for a descriptor and merge
    /// the observation into it.
    #[instrument(skip_all, fields(path = %descriptor.path.display()))]
    pub async fn resolve(&self, descriptor: &ProjectDescriptor) -> crate::error::Result<ResolvedProject> {
        let canonical = canonicalize_path(&descriptor.path)?;
        let now = Utc::now();
        let incoming = record_from_descriptor(descriptor, &canonical, now);

        let mut lookup = Properties::new();
        if let Some(id) = &descriptor.analysis_id {
            lookup.insert(keys::ANALYSIS_ID.into(), id.clone().into());
        }
        lookup.insert(keys::PATH_KEY.into(), canonical.key.clone().into());
        // Lookup and merge run under the writer lock so concurrent
        // observations of one project all land in the merged record.
        let limit = self.config.audit_history_limit;
        let mut changed_fields = Vec::new();
        let changes = &mut changed_fields;
        let outcome = self
            .store
            .upsert_node_with(
                NodeKind::Project,
                lookup,
                Box::new(move |existing: Option<&Node>| -> crate::error::Result<Properties> {
                    let Some(node) = existing else {
                        return Ok(incoming.to_properties()?);
                    };
                    let current = ProjectRecord::from_properties(&node.properties).ok_or_else(|| {
                        ValidationError::InvalidValue {
                            field: node.id.to_string(),
                            reason: "stored project properties are malformed".into(),
                        }
                    })?;
                    let (merged, fields) = merge_project(current, incoming, now, limit);
                    *changes = fields;
                    // Namespaced extras on the stored node survive the merge.
                    let mut properties = node.properties.clone();
                    properties.extend(merged.to_properties()?);
                    Ok(properties)
                }),
            )
            .await?;

        let node = outcome.node;
        if outcome.created {
            info!(project = %node.id, path = %canonical.display, "Created project");
        } else if changed_fields.is_empty() {
            debug!(project = %node.id, "Re-observed project without changes");
        } else {
            info!(project = %node.id, fields = ?changed_fields, "Merged project observation");
        }
        let resolved = ResolvedProject {
            node,
            created: outcome.created,
            changed_fields,
        };

        if let Some(analysis_id) = &descriptor.analysis_id {
            self.link_analysis(&resolved.node, analysis_id, descriptor, &canonical, now)
                .await?;
        }
        Ok(resolved)
    }

    /// Record the analysis run as its own node, once per analysis id.
    async fn link_analysis(
        &self,
        project: &Node,
        analysis_id: &str,
        descriptor: &ProjectDescriptor,
        canonical: &CanonicalPath,
        now: DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let record = AnalysisRecord {
            analysis_id: analysis_id.to_string(),
            path: canonical.display.clone(),
            timestamp: now,
            languages: sorted_languages(descriptor),
            total_files: descriptor.total_files,
        };
        let mut lookup = Properties::new();
        lookup.insert(keys::ANALYSIS_ID.into(), analysis_id.into());
        let analysis = match self
            .store
            .snapshot()
            .node_by_natural_key(NodeKind::Analysis, &lookup)
            .cloned()
        {
            Some(node) => node,
            None => {
                self.store
                    .find_or_create_node(NodeKind::Analysis, record.to_properties()?)
                    .await?
                    .node
            }
        };

        let target = analysis.id.clone();
        let link = LinkRecord { timestamp: now }.to_properties()?;
        self.store
            .add_edge_dedup(
                EdgeKind::ProjectAnalyzedBy,
                &project.id,
                &analysis.id,
                link,
                &move |e: &Edge| e.target == target,
            )
            .await?;
        Ok(())
    }
}

fn sorted_languages(descriptor: &ProjectDescriptor) -> Vec<String> {
    descriptor
        .languages
        .keys()
        .map(|l| l.to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn normalized_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn record_from_descriptor(
    descriptor: &ProjectDescriptor,
    canonical: &CanonicalPath,
    now: DateTime<Utc>,
) -> ProjectRecord {
    let name = descriptor.name.clone().unwrap_or_else(|| {
        Path::new(&canonical.display)
            .file_name()
            .map_or_else(|| canonical.display.clone(), |n| n.to_string_lossy().into_owned())
    });
    ProjectRecord {
        path: canonical.display.clone(),
        path_key: canonical.key.clone(),
        analysis_id: descriptor.analysis_id.clone(),
        name,
        languages: sorted_languages(descriptor),
        primary_language: descriptor.primary_language(),
        frameworks: normalized_list(&descriptor.frameworks),
        dependencies: normalized_list(&descriptor.dependencies),
        ecosystem: descriptor.ecosystem.as_ref().map(|e| e.trim().to_lowercase()),
        project_type: descriptor.project_type.clone(),
        complexity: descriptor.complexity.clone(),
        total_files: descriptor.total_files,
        has_tests: descriptor.has_tests,
        has_ci: descriptor.has_ci,
        has_docs: descriptor.has_docs,
        analysis_count: 1,
        last_analyzed: Some(now),
        history: Vec::new(),
    }
}

/// Tracks overwrites while merging one observation.
struct Merger {
    now: DateTime<Utc>,
    history: Vec<AuditEntry>,
    changed: Vec<String>,
}

impl Merger {
    /// Last-write-wins with an audit entry for the replaced value.
    fn scalar<T>(&mut self, field: &str, current: &mut T, incoming: T)
    where
        T: PartialEq + Serialize,
    {
        if *current != incoming {
            self.history.push(AuditEntry {
                field: field.to_string(),
                old_value: serde_json::to_value(&*current).unwrap_or(serde_json::Value::Null),
                timestamp: self.now,
            });
            self.changed.push(field.to_string());
            *current = incoming;
        }
    }

    /// Absent incoming values never clear a stored one. Filling an empty
    /// slot is a change but not an overwrite.
    fn optional<T>(&mut self, field: &str, current: &mut Option<T>, incoming: Option<T>)
    where
        T: PartialEq + Serialize,
    {
        let Some(value) = incoming else {
            return;
        };
        match current {
            Some(existing) => self.scalar(field, existing, value),
            None => {
                *current = Some(value);
                self.changed.push(field.to_string());
            }
        }
    }

    fn union(&mut self, field: &str, current: &mut Vec<String>, incoming: Vec<String>) {
        let mut merged: BTreeSet<String> = current.drain(..).collect();
        let before = merged.len();
        merged.extend(incoming);
        if merged.len() != before {
            self.changed.push(field.to_string());
        }
        current.extend(merged);
    }
}

/// Merge an observation into a stored project.
///
/// Lists take the set union, `total_files` the max, scalars the incoming
/// value. Each overwritten scalar appends `{field, old_value, timestamp}` to
/// the node's history, which keeps only the newest `audit_limit` entries.
pub fn merge_project(
    mut current: ProjectRecord,
    incoming: ProjectRecord,
    now: DateTime<Utc>,
    audit_limit: usize,
) -> (ProjectRecord, Vec<String>) {
    let mut m = Merger {
        now,
        history: std::mem::take(&mut current.history),
        changed: Vec::new(),
    };

    // Re-submitting the same analysis is not a new analysis run.
    let same_analysis = incoming.analysis_id.is_some() && incoming.analysis_id == current.analysis_id;

    m.scalar(keys::PATH, &mut current.path, incoming.path);
    current.path_key = incoming.path_key;
    m.scalar(keys::NAME, &mut current.name, incoming.name);
    m.optional(keys::ANALYSIS_ID, &mut current.analysis_id, incoming.analysis_id);
    m.optional(keys::PRIMARY_LANGUAGE, &mut current.primary_language, incoming.primary_language);
    m.optional(keys::ECOSYSTEM, &mut current.ecosystem, incoming.ecosystem);
    m.optional(keys::PROJECT_TYPE, &mut current.project_type, incoming.project_type);
    m.optional(keys::COMPLEXITY, &mut current.complexity, incoming.complexity);
    m.scalar(keys::HAS_TESTS, &mut current.has_tests, incoming.has_tests);
    m.scalar(keys::HAS_CI, &mut current.has_ci, incoming.has_ci);
    m.scalar(keys::HAS_DOCS, &mut current.has_docs, incoming.has_docs);

    m.union(keys::LANGUAGES, &mut current.languages, incoming.languages);
    m.union(keys::FRAMEWORKS, &mut current.frameworks, incoming.frameworks);
    m.union(keys::DEPENDENCIES, &mut current.dependencies, incoming.dependencies);

    if incoming.total_files > current.total_files {
        current.total_files = incoming.total_files;
        m.changed.push(keys::TOTAL_FILES.to_string());
    }

    if !same_analysis {
        current.analysis_count += 1;
        current.last_analyzed = Some(now);
    }

    let overflow = m.history.len().saturating_sub(audit_limit);
    m.history.drain(..overflow);
    current.history = m.history;
    (current, m.changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonGraphStore;
    use crate::types::NodeFilter;

    fn resolver() -> EntityResolver {
        EntityResolver::new(Arc::new(JsonGraphStore::in_memory()), ResolverSection::default())
    }

    fn descriptor(path: &str) -> ProjectDescriptor {
        let mut d = ProjectDescriptor::new(path);
        d.languages.insert("python".into(), 12);
        d.languages.insert("shell".into(), 2);
        d.ecosystem = Some("python".into());
        d.total_files = 40;
        d
    }

    fn record(d: &ProjectDescriptor) -> ProjectRecord {
        let canonical = canonicalize_path(&d.path).unwrap();
        record_from_descriptor(d, &canonical, Utc::now())
    }

    #[test]
    fn paths_normalize_and_case_fold() {
        let a = canonicalize_path(Path::new("/Repos/Demo/./src/../")).unwrap();
        assert_eq!(a.display, "/Repos/Demo");
        assert_eq!(a.key, "/repos/demo");
        assert_eq!(canonicalize_path(Path::new("/")).unwrap().display, "/");
        assert!(canonicalize_path(Path::new("")).is_err());
    }

    #[test]
    fn primary_language_breaks_ties_alphabetically() {
        let mut d = ProjectDescriptor::new("/x");
        d.languages.insert("Rust".into(), 5);
        d.languages.insert("Go".into(), 5);
        d.languages.insert("C".into(), 1);
        assert_eq!(d.primary_language().as_deref(), Some("go"));
    }

    #[test]
    fn merge_unions_lists_and_keeps_max_counters() {
        let old = record(&descriptor("/r"));
        let mut next_desc = descriptor("/r");
        next_desc.languages.clear();
        next_desc.languages.insert("rust".into(), 50);
        next_desc.total_files = 10;
        let (merged, changed) = merge_project(old, record(&next_desc), Utc::now(), 20);

        assert_eq!(merged.languages, vec!["python", "rust", "shell"]);
        assert_eq!(merged.total_files, 40);
        assert_eq!(merged.primary_language.as_deref(), Some("rust"));
        assert!(changed.contains(&"languages".to_string()));
        assert!(!changed.contains(&"total_files".to_string()));
    }

    #[test]
    fn overwrites_are_audited_and_bounded() {
        let mut current = record(&descriptor("/r"));
        for i in 0..30 {
            let mut d = descriptor("/r");
            d.complexity = Some(format!("level-{i}"));
            current = merge_project(current, record(&d), Utc::now(), 20).0;
        }
        assert_eq!(current.history.len(), 20);
        let last = current.history.last().unwrap();
        assert_eq!(last.field, "complexity");
        assert_eq!(last.old_value, serde_json::json!("level-28"));
        assert_eq!(current.complexity.as_deref(), Some("level-29"));
    }

    #[test]
    fn absent_values_do_not_clear_stored_ones() {
        let current = record(&descriptor("/r"));
        let mut d = descriptor("/r");
        d.ecosystem = None;
        let (merged, changed) = merge_project(current, record(&d), Utc::now(), 20);
        assert_eq!(merged.ecosystem.as_deref(), Some("python"));
        assert!(merged.history.is_empty());
        assert!(!changed.contains(&"ecosystem".to_string()));
    }

    #[tokio::test]
    async fn identical_observations_produce_one_node() {
        let resolver = resolver();
        let d = descriptor("/work/Demo");
        let first = resolver.resolve(&d).await.unwrap();
        let second = resolver.resolve(&d).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.node.id, second.node.id);
        assert!(second.node.updated_at >= first.node.updated_at);
        assert!(second.changed_fields.is_empty());

        let projects = resolver
            .store
            .find_nodes(&NodeFilter::of_kind(NodeKind::Project))
            .await
            .unwrap();
        assert_eq!(projects.len(), 1);
    }

    #[tokio::test]
    async fn path_case_differences_resolve_to_the_same_project() {
        let resolver = resolver();
        let a = resolver.resolve(&descriptor("/Work/Demo")).await.unwrap();
        let b = resolver.resolve(&descriptor("/work/demo/")).await.unwrap();
        assert_eq!(a.node.id, b.node.id);

        let stored = ProjectRecord::from_properties(&b.node.properties).unwrap();
        assert_eq!(stored.path, "/work/demo");
        assert_eq!(stored.history[0].field, "path");
        assert!(resolver.find_project(Path::new("/WORK/DEMO")).unwrap().is_some());
    }

    #[tokio::test]
    async fn analysis_ids_link_once() {
        let resolver = resolver();
        let mut d = descriptor("/r");
        d.analysis_id = Some("analysis-42".into());
        let first = resolver.resolve(&d).await.unwrap();
        resolver.resolve(&d).await.unwrap();

        let snap = resolver.store.snapshot();
        assert_eq!(
            snap.find_nodes(&NodeFilter::of_kind(NodeKind::Analysis)).len(),
            1
        );
        assert_eq!(
            snap.edges_from(EdgeKind::ProjectAnalyzedBy, &first.node.id).count(),
            1
        );
        let stored = ProjectRecord::from_properties(&snap.node(&first.node.id).unwrap().properties).unwrap();
        assert_eq!(stored.analysis_count, 1);
    }

    #[tokio::test]
    async fn analysis_id_matches_even_when_path_moves() {
        let resolver = resolver();
        let mut d = descriptor("/old/location");
        d.analysis_id = Some("a-1".into());
        let first = resolver.resolve(&d).await.unwrap();

        d.path = PathBuf::from("/new/location");
        let moved = resolver.resolve(&d).await.unwrap();
        assert_eq!(first.node.id, moved.node.id);
        assert_eq!(moved.node.str_property("path"), Some("/new/location"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolves_of_one_path_merge_every_observation() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGraphStore::open(dir.path(), &crate::config::StoreSection::default()).unwrap();
        let resolver = EntityResolver::new(Arc::new(store), ResolverSection::default());

        let mut handles = Vec::new();
        for i in 0..12 {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                let mut d = ProjectDescriptor::new("/repo");
                d.languages.insert(format!("lang{i}"), 1);
                resolver.resolve(&d).await.unwrap()
            }));
        }
        let mut created = 0;
        for h in handles {
            if h.await.unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);

        let snap = resolver.store.snapshot();
        let projects = snap.find_nodes(&NodeFilter::of_kind(NodeKind::Project));
        assert_eq!(projects.len(), 1);
        let stored = ProjectRecord::from_properties(&projects[0].properties).unwrap();
        assert_eq!(stored.languages.len(), 12);
        assert_eq!(stored.analysis_count, 12);
    }
}
