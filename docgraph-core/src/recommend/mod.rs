// Staged SSG recommendation pipeline.
//
// Stage 1 (heuristic) always produces a candidate. Stages 2-4 refine it and
// each reports whether it applied, made no change, was skipped or degraded.
// Output depends only on the committed snapshot, the request and `now`.

pub mod heuristics;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::analyze::{AnalyticsEngine, ScanControl, Scope, SsgStatistics, known_ssgs, similar_projects};
use crate::config::RecommendationSection;
use crate::contracts::normalize_ssg;
use crate::error::{StoreError, ValidationError};
use crate::preferences::PreferenceManager;
use crate::store::GraphStore;
use crate::store::schema::{ProjectRecord, PropertyRecord};
use crate::types::{NodeId, NodeKind};

pub use heuristics::{KNOWN_SSGS, Priority};

/// Inputs to one recommendation. Every field is optional; an empty request
/// falls back to the general-purpose default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationRequest {
    pub project_id: Option<NodeId>,
    /// Explicit ecosystem, replacing the detected one in Stage 1.
    pub ecosystem: Option<String>,
    pub priority: Option<Priority>,
    /// Explicit SSG choice; locks the candidate against later stages.
    pub ssg: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Applied,
    NoChange,
    Skipped,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAlternative {
    pub ssg: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended: String,
    pub confidence: f64,
    /// Most decision-relevant first.
    pub reasoning: Vec<String>,
    /// Top two competitors, best first.
    pub alternatives: Vec<ScoredAlternative>,
    pub stages: Vec<StageReport>,
}

/// Mutable pipeline state threaded through the stages.
struct Draft {
    candidate: String,
    confidence: f64,
    locked: bool,
    /// Reason of the stage that last chose the candidate.
    decisive: String,
    reasons: Vec<String>,
    stages: Vec<StageReport>,
    /// Competitors with their heuristic score and reason.
    competitors: BTreeMap<String, (f64, String)>,
}

impl Draft {
    fn stage(&mut self, stage: &str, status: StageStatus, detail: impl Into<String>) {
        self.stages.push(StageReport {
            stage: stage.to_string(),
            status,
            detail: detail.into(),
        });
    }

    /// Replace the candidate, keeping the displaced one as a competitor.
    fn switch_to(&mut self, ssg: &str, confidence: f64, reason: String) {
        if self.candidate != ssg {
            let displaced = std::mem::replace(&mut self.candidate, ssg.to_string());
            let previous_reason = std::mem::take(&mut self.decisive);
            self.competitors
                .entry(displaced)
                .or_insert((self.confidence, previous_reason.clone()));
            if !previous_reason.is_empty() {
                self.reasons.push(previous_reason);
            }
        } else if !self.decisive.is_empty() {
            self.reasons.push(std::mem::take(&mut self.decisive));
        }
        self.competitors.remove(ssg);
        self.confidence = confidence;
        self.decisive = reason;
    }
}

#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    store: Arc<dyn GraphStore>,
    analytics: AnalyticsEngine,
    preferences: PreferenceManager,
    config: RecommendationSection,
}

impl RecommendationEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        analytics: AnalyticsEngine,
        preferences: PreferenceManager,
        config: RecommendationSection,
    ) -> Self {
        Self {
            store,
            analytics,
            preferences,
            config,
        }
    }

    pub fn recommend(&self, request: &RecommendationRequest) -> crate::error::Result<Recommendation> {
        self.recommend_at(request, Utc::now(), &self.analytics.control())
    }

    /// Run the pipeline as of `now`.
    #[instrument(skip_all, fields(project = ?request.project_id))]
    pub fn recommend_at(
        &self,
        request: &RecommendationRequest,
        now: DateTime<Utc>,
        control: &ScanControl,
    ) -> crate::error::Result<Recommendation> {
        let snapshot = self.store.snapshot();
        let project = match &request.project_id {
            Some(id) => {
                let node = snapshot
                    .node(id)
                    .ok_or_else(|| StoreError::NodeNotFound(id.clone()))?;
                if node.kind != NodeKind::Project {
                    return Err(ValidationError::InvalidValue {
                        field: id.to_string(),
                        reason: format!("expected a project node, found {}", node.kind),
                    }
                    .into());
                }
                ProjectRecord::from_properties(&node.properties)
            }
            None => None,
        };

        let mut draft = Self::stage_heuristic(project.as_ref(), request.ecosystem.as_deref());
        Self::stage_explicit(&mut draft, request)?;
        let scope = match &request.project_id {
            Some(id) => Scope::Projects(
                similar_projects(&snapshot, id)
                    .into_iter()
                    .map(|s| s.project)
                    .collect(),
            ),
            None => Scope::All,
        };
        let mut pool: BTreeSet<String> = known_ssgs(&snapshot).into_iter().collect();
        pool.extend(draft.competitors.keys().cloned());
        pool.insert(draft.candidate.clone());
        let history = self.stage_history(&mut draft, &scope, &pool, control);
        self.stage_personal(&mut draft, request.user_id.as_deref(), &pool, now);

        let recommendation = finish(draft, history.as_ref(), self.config.min_switch_samples);
        info!(
            recommended = %recommendation.recommended,
            confidence = recommendation.confidence,
            "Recommendation ready"
        );
        Ok(recommendation)
    }

    fn stage_heuristic(project: Option<&ProjectRecord>, ecosystem: Option<&str>) -> Draft {
        let baseline = heuristics::baseline(project, ecosystem);
        let mut competitors = BTreeMap::new();
        for (ssg, score) in baseline.alternatives.iter().zip(heuristics::ALTERNATIVE_SCORES) {
            competitors.insert(
                (*ssg).to_string(),
                (score, format!("Heuristic alternative to {}", baseline.ssg)),
            );
        }
        let mut draft = Draft {
            candidate: baseline.ssg.to_string(),
            confidence: baseline.confidence,
            locked: false,
            decisive: baseline.reason.clone(),
            reasons: Vec::new(),
            stages: Vec::new(),
            competitors,
        };
        draft.stage("heuristic", StageStatus::Applied, baseline.reason);
        draft
    }

    fn stage_explicit(draft: &mut Draft, request: &RecommendationRequest) -> crate::error::Result<()> {
        const STAGE: &str = "explicit_preference";
        if let Some(ssg) = &request.ssg {
            let ssg = normalize_ssg(ssg);
            if ssg.is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "ssg".into(),
                    reason: "must not be empty".into(),
                }
                .into());
            }
            let reason = format!("Explicit preference for {ssg}");
            draft.switch_to(&ssg, heuristics::EXPLICIT_SSG_CONFIDENCE, reason.clone());
            draft.locked = true;
            draft.stage(STAGE, StageStatus::Applied, reason);
        } else if let Some(priority) = request.priority {
            let ssg = priority.ssg();
            if draft.candidate == ssg {
                draft.stage(
                    STAGE,
                    StageStatus::NoChange,
                    format!("Priority '{priority}' agrees with {ssg}"),
                );
                draft.reasons.push(format!("Priority '{priority}' agrees with {ssg}"));
            } else {
                let reason = format!("Priority '{priority}' favors {ssg}");
                let confidence = draft.confidence.max(heuristics::PRIORITY_CONFIDENCE);
                draft.switch_to(ssg, confidence, reason.clone());
                draft.stage(STAGE, StageStatus::Applied, reason);
            }
        } else if let Some(ecosystem) = &request.ecosystem {
            draft.stage(
                STAGE,
                StageStatus::Applied,
                format!("Explicit ecosystem '{}' used for the baseline", ecosystem.trim()),
            );
        } else {
            draft.stage(STAGE, StageStatus::Skipped, "No explicit preference supplied");
        }
        Ok(())
    }

    /// Stage 3. Returns the statistics it used so the alternatives can be
    /// scored from the same evidence.
    fn stage_history(
        &self,
        draft: &mut Draft,
        scope: &Scope,
        pool: &BTreeSet<String>,
        control: &ScanControl,
    ) -> Option<BTreeMap<String, SsgStatistics>> {
        const STAGE: &str = "historical_evidence";
        let names: Vec<String> = pool.iter().cloned().collect();
        let ranked = match self.analytics.compare_ssgs(&names, scope, control) {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "Historical evidence unavailable; continuing without it");
                draft.confidence = (draft.confidence - self.config.degraded_penalty).max(0.0);
                let detail = format!("Historical evidence unavailable ({e}); confidence reduced");
                draft.reasons.push(detail.clone());
                draft.stage(STAGE, StageStatus::Degraded, detail);
                return None;
            }
        };
        let stats: BTreeMap<String, SsgStatistics> =
            ranked.iter().map(|s| (s.ssg.clone(), s.clone())).collect();
        let c = &self.config;

        let current = stats
            .get(&draft.candidate)
            .cloned()
            .unwrap_or_else(|| SsgStatistics::empty(&draft.candidate));

        if !draft.locked {
            // `ranked` is already best-first, so the first qualifier wins.
            // A candidate without history competes with a rate of zero.
            let challenger = ranked.iter().find(|alt| {
                alt.ssg != current.ssg
                    && alt.sample_size >= c.min_switch_samples
                    && alt.rate - current.rate > c.switch_margin
            });
            if let Some(alt) = challenger {
                let baseline = if current.has_history() {
                    format!(
                        "{}/{} ({:.0}%)",
                        current.successes,
                        current.total,
                        current.rate * 100.0
                    )
                } else {
                    format!("no recorded {} deployments", current.ssg)
                };
                let reason = format!(
                    "Switched from {} to {}: {} succeeded in {}/{} similar deployments ({:.0}%) vs {}",
                    current.ssg,
                    alt.ssg,
                    alt.ssg,
                    alt.successes,
                    alt.total,
                    alt.rate * 100.0,
                    baseline
                );
                let confidence = (alt.rate + c.switch_confidence_bonus).min(c.switch_confidence_cap);
                draft.switch_to(&alt.ssg, confidence, reason.clone());
                draft.stage(STAGE, StageStatus::Applied, reason);
                return Some(stats);
            }
        }

        if current.rate >= c.high_success_rate && current.sample_size >= c.min_boost_samples {
            let reason = format!(
                "{} succeeded in {}/{} similar deployments ({:.0}%)",
                current.ssg,
                current.successes,
                current.total,
                current.rate * 100.0
            );
            draft.confidence = (draft.confidence + c.confidence_boost).min(c.confidence_boost_cap);
            draft.reasons.push(reason.clone());
            draft.stage(STAGE, StageStatus::Applied, reason);
        } else if current.has_history()
            && current.rate < c.low_success_rate
            && current.sample_size >= c.min_penalty_samples
        {
            let reason = format!(
                "{} succeeded in only {}/{} similar deployments ({:.0}%)",
                current.ssg,
                current.successes,
                current.total,
                current.rate * 100.0
            );
            draft.confidence = (draft.confidence - c.confidence_penalty).max(c.confidence_floor);
            draft.reasons.push(reason.clone());
            draft.stage(STAGE, StageStatus::Applied, reason);
        } else if let Some(best) = ranked.iter().find(|s| s.has_history()) {
            let detail = if current.has_history() {
                format!(
                    "Historical evidence for {} is inconclusive ({}/{} deployments)",
                    current.ssg, current.successes, current.total
                )
            } else {
                format!(
                    "No recorded {} deployments for similar projects; best alternative {} has {}/{} ({:.0}%)",
                    current.ssg,
                    best.ssg,
                    best.successes,
                    best.total,
                    best.rate * 100.0
                )
            };
            draft.reasons.push(detail.clone());
            draft.stage(STAGE, StageStatus::NoChange, detail);
        } else {
            let detail = "No deployment history for similar projects".to_string();
            draft.reasons.push(detail.clone());
            draft.stage(STAGE, StageStatus::NoChange, detail);
        }
        Some(stats)
    }

    fn stage_personal(
        &self,
        draft: &mut Draft,
        user_id: Option<&str>,
        pool: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) {
        const STAGE: &str = "personal_preference";
        let Some(user_id) = user_id.filter(|u| !u.trim().is_empty()) else {
            draft.stage(STAGE, StageStatus::Skipped, "No user supplied");
            return;
        };
        if draft.locked {
            let detail = "Skipped: explicit SSG choice takes precedence".to_string();
            draft.reasons.push(detail.clone());
            draft.stage(STAGE, StageStatus::Skipped, detail);
            return;
        }

        let alternatives: Vec<String> = pool.iter().filter(|s| **s != draft.candidate).cloned().collect();
        let adjustment =
            self.preferences
                .apply_preferences_to_recommendation(user_id, &draft.candidate, &alternatives, now);
        match (adjustment.adjustment_reason, adjustment.personal_rate) {
            (Some(reason), Some(rate)) => {
                let floor = self.config.confidence_floor;
                let cap = self.preferences.override_confidence_cap().max(floor);
                let confidence = rate.clamp(floor, cap);
                draft.switch_to(&adjustment.recommended, confidence, reason.clone());
                draft.stage(STAGE, StageStatus::Applied, reason);
            }
            _ => {
                draft.stage(
                    STAGE,
                    StageStatus::NoChange,
                    format!("Personal history does not override {}", draft.candidate),
                );
            }
        }
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Assemble the output: decisive reason first, then the remaining trail, and
/// the two best competitors. Competitors with enough history are scored by
/// their success rate, the rest by their heuristic score.
fn finish(
    draft: Draft,
    history: Option<&BTreeMap<String, SsgStatistics>>,
    min_samples: u64,
) -> Recommendation {
    let Draft {
        candidate,
        confidence,
        decisive,
        reasons,
        stages,
        mut competitors,
        ..
    } = draft;

    if let Some(history) = history {
        for (ssg, stats) in history {
            if *ssg == candidate || stats.sample_size < min_samples {
                continue;
            }
            let reason = format!(
                "{}/{} successful deployments across similar projects",
                stats.successes, stats.total
            );
            competitors.insert(ssg.clone(), (stats.rate, reason));
        }
    }
    competitors.remove(&candidate);

    let mut alternatives: Vec<ScoredAlternative> = competitors
        .into_iter()
        .map(|(ssg, (score, reason))| ScoredAlternative {
            ssg,
            score: round3(score),
            reason,
        })
        .collect();
    alternatives.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.ssg.cmp(&b.ssg)));
    alternatives.truncate(2);

    let mut reasoning = Vec::with_capacity(reasons.len() + 1);
    if !decisive.is_empty() {
        reasoning.push(decisive);
    }
    for reason in reasons {
        if !reasoning.contains(&reason) {
            reasoning.push(reason);
        }
    }
    for stage in stages.iter().filter(|s| s.status == StageStatus::Skipped) {
        let note = format!("{} skipped: {}", stage.stage, stage.detail);
        if !reasoning.iter().any(|r| r.ends_with(&stage.detail)) {
            reasoning.push(note);
        }
    }

    Recommendation {
        recommended: candidate,
        confidence: round3(confidence.clamp(0.0, 1.0)),
        reasoning,
        alternatives,
        stages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DocGraphConfig;
    use crate::events::{DeploymentMetadata, EventTracker};
    use crate::resolve::{EntityResolver, ProjectDescriptor};
    use crate::store::JsonGraphStore;
    use chrono::Duration;

    struct Fixture {
        engine: RecommendationEngine,
        resolver: EntityResolver,
        tracker: EventTracker,
        preferences: PreferenceManager,
    }

    fn fixture() -> Fixture {
        let config = DocGraphConfig::default();
        let store: Arc<dyn GraphStore> = Arc::new(JsonGraphStore::in_memory());
        let analytics = AnalyticsEngine::new(Arc::clone(&store), config.analytics.clone());
        let preferences = PreferenceManager::new(Arc::clone(&store), config.preferences.clone());
        Fixture {
            engine: RecommendationEngine::new(
                Arc::clone(&store),
                analytics,
                preferences.clone(),
                config.recommendation.clone(),
            ),
            resolver: EntityResolver::new(Arc::clone(&store), config.resolver.clone()),
            tracker: EventTracker::new(store, config.events.clone()),
            preferences,
        }
    }

    async fn project(f: &Fixture, path: &str, ecosystem: &str) -> NodeId {
        let mut d = ProjectDescriptor::new(path);
        d.ecosystem = Some(ecosystem.into());
        d.languages.insert(ecosystem.into(), 10);
        f.resolver.resolve(&d).await.unwrap().node.id
    }

    async fn deploy(f: &Fixture, project: &NodeId, ssg: &str, successes: usize, failures: usize) {
        let base = Utc::now() - Duration::days(3);
        let outcomes = std::iter::repeat_n(true, successes).chain(std::iter::repeat_n(false, failures));
        for (i, ok) in outcomes.enumerate() {
            let meta = DeploymentMetadata {
                timestamp: Some(base + Duration::minutes(i64::try_from(i).unwrap())),
                ..Default::default()
            };
            f.tracker.record_deployment(project, ssg, ok, meta, None).await.unwrap();
        }
    }

    fn request(project: &NodeId) -> RecommendationRequest {
        RecommendationRequest {
            project_id: Some(project.clone()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn python_without_history_gets_mkdocs() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        let rec = f.engine.recommend(&request(&id)).unwrap();
        assert_eq!(rec.recommended, "mkdocs");
        assert!((rec.confidence - 0.85).abs() < 1e-9);
        assert!(rec.reasoning.iter().any(|r| r == "Python ecosystem detected"));
        assert_eq!(rec.alternatives.len(), 2);
        assert_eq!(rec.stages.len(), 4);
    }

    #[tokio::test]
    async fn failing_candidate_switches_to_proven_alternative() {
        let f = fixture();
        let id = project(&f, "/js", "javascript").await;
        deploy(&f, &id, "docusaurus", 0, 3).await;
        deploy(&f, &id, "hugo", 3, 0).await;

        let rec = f.engine.recommend(&request(&id)).unwrap();
        assert_eq!(rec.recommended, "hugo");
        assert!(rec.reasoning[0].starts_with("Switched from docusaurus to hugo"));
        assert!((rec.confidence - 0.95).abs() < 1e-9);
        assert!(rec.alternatives.iter().any(|a| a.ssg == "docusaurus"));
    }

    #[tokio::test]
    async fn strong_alternative_history_overrides_weak_candidate() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        deploy(&f, &id, "mkdocs", 1, 4).await;
        deploy(&f, &id, "hugo", 9, 1).await;
        let rec = f.engine.recommend(&request(&id)).unwrap();
        assert_eq!(rec.recommended, "hugo");
        assert!(rec.confidence >= 0.85);
    }

    #[tokio::test]
    async fn untried_candidate_yields_to_proven_alternative() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        deploy(&f, &id, "hugo", 5, 0).await;
        let rec = f.engine.recommend(&request(&id)).unwrap();
        assert_eq!(rec.recommended, "hugo");
        assert!((rec.confidence - 0.95).abs() < 1e-9);
        assert!(rec.reasoning[0].starts_with("Switched from mkdocs to hugo"));
        assert!(rec.reasoning[0].ends_with("vs no recorded mkdocs deployments"));
        assert!(rec.alternatives.iter().any(|a| a.ssg == "mkdocs"));
    }

    #[tokio::test]
    async fn thin_alternative_evidence_is_reported_without_switching() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        deploy(&f, &id, "hugo", 2, 0).await;
        let rec = f.engine.recommend(&request(&id)).unwrap();
        assert_eq!(rec.recommended, "mkdocs");
        assert_eq!(rec.stages[2].status, StageStatus::NoChange);
        assert!(
            rec.reasoning
                .iter()
                .any(|r| r.contains("best alternative hugo has 2/2 (100%)"))
        );
    }

    #[tokio::test]
    async fn good_history_boosts_and_bad_history_penalizes() {
        let f = fixture();
        let good = project(&f, "/good", "go").await;
        deploy(&f, &good, "hugo", 4, 0).await;
        let rec = f.engine.recommend(&request(&good)).unwrap();
        assert_eq!(rec.recommended, "hugo");
        assert!((rec.confidence - 0.95).abs() < 1e-9);

        let f = fixture();
        let bad = project(&f, "/bad", "ruby").await;
        deploy(&f, &bad, "jekyll", 0, 2).await;
        let rec = f.engine.recommend(&request(&bad)).unwrap();
        assert_eq!(rec.recommended, "jekyll");
        assert!((rec.confidence - 0.70).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unrelated_projects_do_not_count_as_evidence() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        let other = project(&f, "/go", "go").await;
        deploy(&f, &other, "mkdocs", 0, 3).await;
        deploy(&f, &other, "hugo", 3, 0).await;
        let rec = f.engine.recommend(&request(&id)).unwrap();
        assert_eq!(rec.recommended, "mkdocs");
        assert!((rec.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn explicit_ssg_locks_the_candidate() {
        let f = fixture();
        let id = project(&f, "/js", "javascript").await;
        deploy(&f, &id, "docusaurus", 0, 3).await;
        deploy(&f, &id, "hugo", 3, 0).await;
        let rec = f
            .engine
            .recommend(&RecommendationRequest {
                ssg: Some("Docusaurus".into()),
                user_id: Some("alice".into()),
                ..request(&id)
            })
            .unwrap();
        assert_eq!(rec.recommended, "docusaurus");
        assert_eq!(rec.reasoning[0], "Explicit preference for docusaurus");
        assert_eq!(rec.stages[3].status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn priority_replaces_the_baseline() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        let rec = f
            .engine
            .recommend(&RecommendationRequest {
                priority: Some(Priority::Performance),
                ..request(&id)
            })
            .unwrap();
        assert_eq!(rec.recommended, "hugo");
        assert!(rec.alternatives.iter().any(|a| a.ssg == "mkdocs"));
    }

    #[tokio::test]
    async fn personal_history_can_override_last() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        for _ in 0..4 {
            f.preferences
                .track_ssg_usage("alice", "docusaurus", true, None, None)
                .await
                .unwrap();
        }
        let rec = f
            .engine
            .recommend(&RecommendationRequest {
                user_id: Some("alice".into()),
                ..request(&id)
            })
            .unwrap();
        assert_eq!(rec.recommended, "docusaurus");
        assert!(rec.reasoning[0].starts_with("Personal history favors docusaurus"));
        assert!((rec.confidence - 0.90).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unavailable_history_degrades_but_still_recommends() {
        let f = fixture();
        let id = project(&f, "/py", "python").await;
        let control = ScanControl::new();
        control.token().cancel();
        let rec = f.engine.recommend_at(&request(&id), Utc::now(), &control).unwrap();
        assert_eq!(rec.recommended, "mkdocs");
        assert!((rec.confidence - 0.80).abs() < 1e-9);
        assert_eq!(rec.stages[2].status, StageStatus::Degraded);
        assert!(rec.reasoning.iter().any(|r| r.contains("Historical evidence unavailable")));
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_output() {
        let f = fixture();
        let id = project(&f, "/js", "typescript").await;
        deploy(&f, &id, "docusaurus", 2, 1).await;
        deploy(&f, &id, "eleventy", 1, 1).await;
        let now = Utc::now();
        let control = ScanControl::new();
        let a = f.engine.recommend_at(&request(&id), now, &control).unwrap();
        let b = f.engine.recommend_at(&request(&id), now, &control).unwrap();
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
    }

    #[tokio::test]
    async fn missing_project_is_an_error() {
        let f = fixture();
        let err = f
            .engine
            .recommend(&request(&NodeId::from("project:nope")))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::DocGraphError::Store(StoreError::NodeNotFound(_))
        ));
    }
}
