// Per-user SSG usage history and preference-based overrides.
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::PreferencesSection;
use crate::contracts::{keys, normalize_ssg};
use crate::error::ValidationError;
use crate::events::{checked_ssg, ensure_configuration};
use crate::store::GraphStore;
use crate::store::schema::{LinkRecord, PropertyRecord, UsageEvent, UserRecord};
use crate::types::{Edge, EdgeKind, Node, NodeKind, Properties};

/// One user's record with a single SSG inside the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalStats {
    pub ssg: String,
    pub uses: u64,
    pub successes: u64,
    pub rate: f64,
    pub last_used: DateTime<Utc>,
}

/// Outcome of applying a user's history to a candidate SSG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceAdjustment {
    pub recommended: String,
    /// Set only when the candidate was overridden.
    pub adjustment_reason: Option<String>,
    /// The user's success rate with the chosen SSG, when overridden.
    pub personal_rate: Option<f64>,
}

impl PreferenceAdjustment {
    fn unchanged(candidate: &str) -> Self {
        Self {
            recommended: candidate.to_string(),
            adjustment_reason: None,
            personal_rate: None,
        }
    }

    pub fn is_override(&self) -> bool {
        self.adjustment_reason.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PreferenceManager {
    store: Arc<dyn GraphStore>,
    config: PreferencesSection,
}

impl PreferenceManager {
    pub fn new(store: Arc<dyn GraphStore>, config: PreferencesSection) -> Self {
        Self { store, config }
    }

    /// Upper bound on the confidence of a preference override.
    pub fn override_confidence_cap(&self) -> f64 {
        self.config.override_confidence_cap
    }

    pub fn user_record(&self, user_id: &str) -> Option<UserRecord> {
        let snapshot = self.store.snapshot();
        let node = user_node(&snapshot, user_id.trim())?;
        UserRecord::from_properties(&node.properties)
    }

    /// Append a usage event to the user's node, creating the user and the
    /// `user_prefers` link on first use of an SSG.
    #[instrument(skip_all, fields(user = %user_id, ssg = %ssg))]
    pub async fn track_ssg_usage(
        &self,
        user_id: &str,
        ssg: &str,
        success: bool,
        timestamp: Option<DateTime<Utc>>,
        project_type: Option<&str>,
    ) -> crate::error::Result<Node> {
        let ssg = checked_ssg(ssg)?;
        let event = UsageEvent {
            ssg: ssg.clone(),
            success,
            timestamp: timestamp.unwrap_or_else(Utc::now),
            project_type: project_type.map(str::to_string),
        };
        let user = self
            .modify_user(user_id, move |record| record.usage.push(event))
            .await?;

        let configuration = ensure_configuration(self.store.as_ref(), &ssg).await?;
        let target = configuration.id.clone();
        let link = LinkRecord {
            timestamp: Utc::now(),
        }
        .to_properties()?;
        let outcome = self
            .store
            .add_edge_dedup(
                EdgeKind::UserPrefers,
                &user.id,
                &configuration.id,
                link,
                &move |e: &Edge| e.target == target,
            )
            .await?;
        if outcome.was_inserted() {
            info!("Linked user to new SSG");
        }
        Ok(user)
    }

    /// Replace the user's explicit preference list and, optionally, the
    /// auto-apply switch.
    pub async fn set_preferences(
        &self,
        user_id: &str,
        preferred_ssgs: &[String],
        auto_apply: Option<bool>,
    ) -> crate::error::Result<Node> {
        let mut preferred = Vec::new();
        for ssg in preferred_ssgs {
            let ssg = checked_ssg(ssg)?;
            if !preferred.contains(&ssg) {
                preferred.push(ssg);
            }
        }
        self.modify_user(user_id, move |record| {
            record.preferred_ssgs = preferred;
            if let Some(auto_apply) = auto_apply {
                record.auto_apply = auto_apply;
            }
        })
        .await
    }

    /// Per-SSG personal statistics over usage inside the retention window.
    pub fn personal_stats(&self, user_id: &str, now: DateTime<Utc>) -> BTreeMap<String, PersonalStats> {
        let Some(record) = self.user_record(user_id) else {
            return BTreeMap::new();
        };
        let cutoff = now - Duration::days(i64::from(self.config.usage_retention_days));
        let mut out: BTreeMap<String, PersonalStats> = BTreeMap::new();
        for event in record.usage.iter().filter(|e| e.timestamp >= cutoff) {
            let stats = out.entry(event.ssg.clone()).or_insert_with(|| PersonalStats {
                ssg: event.ssg.clone(),
                uses: 0,
                successes: 0,
                rate: 0.0,
                last_used: event.timestamp,
            });
            stats.uses += 1;
            if event.success {
                stats.successes += 1;
            }
            stats.last_used = stats.last_used.max(event.timestamp);
        }
        for stats in out.values_mut() {
            stats.rate = stats.successes as f64 / stats.uses as f64;
        }
        out
    }

    /// Override `candidate` with an alternative the user has succeeded with
    /// at least `min_successful_uses` times and whose personal success rate
    /// beats the candidate's by `min_rate_margin`. Among several, the higher
    /// rate wins, then the higher usage count, then an explicitly preferred
    /// SSG, then the name.
    pub fn apply_preferences_to_recommendation(
        &self,
        user_id: &str,
        candidate: &str,
        alternatives: &[String],
        now: DateTime<Utc>,
    ) -> PreferenceAdjustment {
        let candidate = normalize_ssg(candidate);
        let Some(record) = self.user_record(user_id) else {
            return PreferenceAdjustment::unchanged(&candidate);
        };
        if !record.auto_apply {
            debug!(user = user_id, "Preference overrides disabled");
            return PreferenceAdjustment::unchanged(&candidate);
        }

        let stats = self.personal_stats(user_id, now);
        let candidate_rate = stats.get(&candidate).map_or(0.0, |s| s.rate);
        let preferred = |ssg: &str| record.preferred_ssgs.iter().any(|p| p == ssg);

        let best = alternatives
            .iter()
            .map(|a| normalize_ssg(a))
            .filter(|a| *a != candidate)
            .filter_map(|a| stats.get(&a))
            .filter(|s| {
                s.successes >= u64::from(self.config.min_successful_uses)
                    && s.rate - candidate_rate >= self.config.min_rate_margin - 1e-9
            })
            .min_by(|a, b| {
                b.rate
                    .total_cmp(&a.rate)
                    .then_with(|| b.uses.cmp(&a.uses))
                    .then_with(|| preferred(&b.ssg).cmp(&preferred(&a.ssg)))
                    .then_with(|| a.ssg.cmp(&b.ssg))
            });

        match best {
            Some(winner) => {
                let reason = format!(
                    "Personal history favors {}: {}/{} successful ({:.0}%) vs {} at {:.0}%",
                    winner.ssg,
                    winner.successes,
                    winner.uses,
                    winner.rate * 100.0,
                    candidate,
                    candidate_rate * 100.0
                );
                info!(user = user_id, from = %candidate, to = %winner.ssg, "Applied personal preference");
                PreferenceAdjustment {
                    recommended: winner.ssg.clone(),
                    adjustment_reason: Some(reason),
                    personal_rate: Some(winner.rate),
                }
            }
            None => PreferenceAdjustment::unchanged(&candidate),
        }
    }

    /// Read-modify-write the user's record, creating the node if needed.
    /// Namespaced extras on the node are preserved.
    async fn modify_user<F>(&self, user_id: &str, edit: F) -> crate::error::Result<Node>
    where
        F: FnOnce(&mut UserRecord) + Send + 'static,
    {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: keys::USER_ID.into(),
                reason: "must not be empty".into(),
            }
            .into());
        }

        let mut lookup = Properties::new();
        lookup.insert(keys::USER_ID.into(), user_id.into());
        let user_id = user_id.to_string();
        let outcome = self
            .store
            .upsert_node_with(
                NodeKind::User,
                lookup,
                Box::new(move |existing: Option<&Node>| -> crate::error::Result<Properties> {
                    let mut properties = existing.map(|n| n.properties.clone()).unwrap_or_default();
                    let mut record = match existing {
                        Some(node) => UserRecord::from_properties(&node.properties).ok_or_else(|| {
                            ValidationError::InvalidValue {
                                field: node.id.to_string(),
                                reason: "stored user properties are malformed".into(),
                            }
                        })?,
                        None => UserRecord {
                            user_id,
                            usage: Vec::new(),
                            preferred_ssgs: Vec::new(),
                            auto_apply: true,
                        },
                    };
                    edit(&mut record);
                    // Namespaced extras on the node are kept.
                    properties.extend(record.to_properties()?);
                    Ok(properties)
                }),
            )
            .await?;
        Ok(outcome.node)
    }
}

fn user_node<'a>(snapshot: &'a crate::store::GraphSnapshot, user_id: &str) -> Option<&'a Node> {
    let mut lookup = Properties::new();
    lookup.insert(keys::USER_ID.into(), user_id.into());
    snapshot.node_by_natural_key(NodeKind::User, &lookup)
}
