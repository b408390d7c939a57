// Producer and query facade: one store shared by every component.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::{AnalyticsEngine, HealthReport, Scope, SimilarProject, SsgStatistics, TrendReport};
use crate::config::DocGraphConfig;
use crate::error::{DocGraphError, StoreError, ValidationError};
use crate::events::{DeploymentMetadata, EventTracker, ensure_configuration};
use crate::preferences::PreferenceManager;
use crate::recommend::{KNOWN_SSGS, Recommendation, RecommendationEngine, RecommendationRequest};
use crate::resolve::{EntityResolver, ProjectDescriptor};
use crate::store::schema::{PropertyRecord, RecommendedRecord};
use crate::store::{GraphStore, JsonGraphStore};
use crate::types::{Edge, EdgeKind, Node, NodeId, NodeKind};

/// What the graph knows about a repository path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project: Option<Node>,
    pub similar_projects: Vec<SimilarProject>,
    /// Deployments of the project, oldest first.
    pub history: Vec<Edge>,
}

/// The knowledge graph with its components wired to one store.
#[derive(Debug, Clone)]
pub struct DocGraph {
    config: DocGraphConfig,
    store: Arc<dyn GraphStore>,
    resolver: EntityResolver,
    events: EventTracker,
    analytics: AnalyticsEngine,
    preferences: PreferenceManager,
    recommender: RecommendationEngine,
}

impl DocGraph {
    pub fn new(store: Arc<dyn GraphStore>, config: DocGraphConfig) -> Self {
        let analytics = AnalyticsEngine::new(Arc::clone(&store), config.analytics.clone());
        let preferences = PreferenceManager::new(Arc::clone(&store), config.preferences.clone());
        let recommender = RecommendationEngine::new(
            Arc::clone(&store),
            analytics.clone(),
            preferences.clone(),
            config.recommendation.clone(),
        );
        Self {
            resolver: EntityResolver::new(Arc::clone(&store), config.resolver.clone()),
            events: EventTracker::new(Arc::clone(&store), config.events.clone()),
            analytics,
            preferences,
            recommender,
            store,
            config,
        }
    }

    /// Open the writable graph in `dir`, reading `dir/config.toml` if present.
    pub fn open(dir: &Path) -> crate::error::Result<Self> {
        let config = DocGraphConfig::load_from_dir(dir)?;
        let store = JsonGraphStore::open(dir, &config.store)?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// Open `dir` for queries only; no writer lock is taken.
    pub fn open_read_only(dir: &Path) -> crate::error::Result<Self> {
        let config = DocGraphConfig::load_from_dir(dir)?;
        let store = JsonGraphStore::open_read_only(dir, &config.store)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(JsonGraphStore::in_memory()), DocGraphConfig::default())
    }

    pub fn config(&self) -> &DocGraphConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn events(&self) -> &EventTracker {
        &self.events
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub fn preferences(&self) -> &PreferenceManager {
        &self.preferences
    }

    pub fn recommender(&self) -> &RecommendationEngine {
        &self.recommender
    }

    // ── Producer API ───────────────────────────────────────────────

    pub async fn create_or_update_project(&self, descriptor: &ProjectDescriptor) -> crate::error::Result<Node> {
        Ok(self.resolver.resolve(descriptor).await?.node)
    }

    pub async fn record_deployment(
        &self,
        project_id: &NodeId,
        ssg: &str,
        success: bool,
        metadata: DeploymentMetadata,
        idempotency_token: Option<&str>,
    ) -> crate::error::Result<Edge> {
        self.events
            .record_deployment(project_id, ssg, success, metadata, idempotency_token)
            .await
    }

    /// Every SSG the graph or the heuristics know, ranked by evidence from
    /// the project's similar set. Unavailable analytics yield an empty list.
    pub fn get_deployment_recommendations(&self, project_id: &NodeId) -> crate::error::Result<Vec<SsgStatistics>> {
        self.require_project(project_id)?;
        let scope = Scope::Projects(
            self.analytics
                .similar_projects(project_id)
                .into_iter()
                .map(|s| s.project)
                .collect(),
        );
        let mut ssgs: BTreeSet<String> = crate::analyze::known_ssgs(&self.store.snapshot())
            .into_iter()
            .collect();
        ssgs.extend(KNOWN_SSGS.iter().map(|s| (*s).to_string()));
        let ssgs: Vec<String> = ssgs.into_iter().collect();

        match self.analytics.compare_ssgs(&ssgs, &scope, &self.analytics.control()) {
            Ok(ranked) => Ok(ranked),
            Err(DocGraphError::Analyze(e)) => {
                warn!(error = %e, project = %project_id, "Deployment ranking unavailable");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_project_context(&self, path: &Path) -> crate::error::Result<ProjectContext> {
        let Some(project) = self.resolver.find_project(path)? else {
            return Ok(ProjectContext {
                project: None,
                similar_projects: Vec::new(),
                history: Vec::new(),
            });
        };
        let similar_projects = self
            .analytics
            .similar_projects(&project.id)
            .into_iter()
            .filter(|s| s.project != project.id)
            .collect();
        let history = self.events.deployment_history(&project.id);
        Ok(ProjectContext {
            project: Some(project),
            similar_projects,
            history,
        })
    }

    pub fn recommend(&self, request: &RecommendationRequest) -> crate::error::Result<Recommendation> {
        self.recommender.recommend(request)
    }

    /// Persist an issued recommendation as a `project_recommended` edge.
    pub async fn record_recommendation(
        &self,
        project_id: &NodeId,
        recommendation: &Recommendation,
    ) -> crate::error::Result<Edge> {
        self.require_project(project_id)?;
        let configuration = ensure_configuration(self.store.as_ref(), &recommendation.recommended).await?;
        let record = RecommendedRecord {
            ssg: recommendation.recommended.clone(),
            confidence: recommendation.confidence,
            timestamp: Utc::now(),
        };
        let edge = self
            .store
            .add_edge(
                EdgeKind::ProjectRecommended,
                project_id,
                &configuration.id,
                record.to_properties()?,
            )
            .await?;
        info!(project = %project_id, ssg = %record.ssg, "Recorded recommendation");
        Ok(edge)
    }

    // ── Analytics ──────────────────────────────────────────────────

    pub fn ssg_statistics(&self, ssg: &str) -> crate::error::Result<SsgStatistics> {
        self.analytics
            .ssg_statistics(ssg, &Scope::All, &self.analytics.control())
    }

    pub fn health_report(&self) -> crate::error::Result<HealthReport> {
        self.analytics.health_report(&self.analytics.control())
    }

    pub fn identify_trends(&self, period_days: u32) -> crate::error::Result<TrendReport> {
        self.analytics
            .identify_trends(period_days, &self.analytics.control())
    }

    fn require_project(&self, project_id: &NodeId) -> crate::error::Result<()> {
        match self.store.snapshot().node(project_id) {
            Some(node) if node.kind == NodeKind::Project => Ok(()),
            Some(node) => Err(ValidationError::InvalidValue {
                field: project_id.to_string(),
                reason: format!("expected a project node, found {}", node.kind),
            }
            .into()),
            None => Err(StoreError::NodeNotFound(project_id.clone()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: &str, lang: &str) -> ProjectDescriptor {
        let mut d = ProjectDescriptor::new(path);
        d.ecosystem = Some(lang.into());
        d.languages.insert(lang.into(), 3);
        d
    }

    #[tokio::test]
    async fn context_lists_similar_projects_and_history() {
        let graph = DocGraph::in_memory();
        let a = graph.create_or_update_project(&descriptor("/a", "python")).await.unwrap();
        let b = graph.create_or_update_project(&descriptor("/b", "python")).await.unwrap();
        graph.create_or_update_project(&descriptor("/c", "go")).await.unwrap();
        graph
            .record_deployment(&a.id, "mkdocs", true, DeploymentMetadata::default(), None)
            .await
            .unwrap();

        let ctx = graph.get_project_context(Path::new("/A")).unwrap();
        assert_eq!(ctx.project.map(|p| p.id), Some(a.id));
        assert_eq!(ctx.similar_projects.len(), 1);
        assert_eq!(ctx.similar_projects[0].project, b.id);
        assert_eq!(ctx.history.len(), 1);

        let empty = graph.get_project_context(Path::new("/nowhere")).unwrap();
        assert!(empty.project.is_none());
    }

    #[tokio::test]
    async fn ranking_covers_known_and_heuristic_ssgs() {
        let graph = DocGraph::in_memory();
        let p = graph.create_or_update_project(&descriptor("/p", "go")).await.unwrap();
        for _ in 0..2 {
            graph
                .record_deployment(&p.id, "Zola", true, DeploymentMetadata::default(), None)
                .await
                .unwrap();
        }
        let ranked = graph.get_deployment_recommendations(&p.id).unwrap();
        assert_eq!(ranked[0].ssg, "zola");
        assert_eq!(ranked.len(), KNOWN_SSGS.len() + 1);
        assert!(graph.get_deployment_recommendations(&NodeId::from("project:x")).is_err());
    }

    #[tokio::test]
    async fn recommendations_can_be_recorded() {
        let graph = DocGraph::in_memory();
        let p = graph.create_or_update_project(&descriptor("/p", "python")).await.unwrap();
        let rec = graph
            .recommend(&RecommendationRequest {
                project_id: Some(p.id.clone()),
                ..Default::default()
            })
            .unwrap();
        let edge = graph.record_recommendation(&p.id, &rec).await.unwrap();
        assert_eq!(edge.kind, EdgeKind::ProjectRecommended);
        assert_eq!(edge.target.as_str(), "configuration:mkdocs");
    }

    #[tokio::test]
    async fn reopening_a_directory_preserves_the_graph() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let graph = DocGraph::open(dir.path()).unwrap();
            let p = graph.create_or_update_project(&descriptor("/p", "ruby")).await.unwrap();
            graph
                .record_deployment(&p.id, "jekyll", true, DeploymentMetadata::default(), Some("t"))
                .await
                .unwrap();
            p.id
        };
        let graph = DocGraph::open_read_only(dir.path()).unwrap();
        assert_eq!(graph.events().deployment_history(&id).len(), 1);
        assert_eq!(graph.ssg_statistics("jekyll").unwrap().successes, 1);
    }
}
