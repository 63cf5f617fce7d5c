//! Application state: the metric store, the achievement registry, and the
//! cross-component operations that need both.
//!
//! The referential rules live here because AppState is the only place that
//! sees both components:
//!   - achievement create/update checks the referenced metrics exist
//!   - metric deletion cascades DELETED status onto gated achievements
//!
//! Startup optionally seeds both stores from a TOML config (ENGINE_CONFIG_PATH).

use std::collections::HashMap;
use tracing::{error, info, instrument};

use crate::config::load_engine_config_from_env;
use crate::domain::{Achievement, AchievementStatus, AchievementTrigger, MetricType};
use crate::error::ApiError;
use crate::registry::{AchievementFields, AchievementRegistry};
use crate::store::{MetricFields, MetricStore};

#[derive(Clone, Default)]
pub struct AppState {
    pub metrics: MetricStore,
    pub achievements: AchievementRegistry,
}

impl AppState {
    /// Build empty stores and apply the optional seed config.
    #[instrument(level = "info", skip_all)]
    pub async fn new() -> Self {
        let state = Self {
            metrics: MetricStore::new(),
            achievements: AchievementRegistry::new(),
        };

        if let Some(cfg) = load_engine_config_from_env() {
            state.seed_from_config(cfg).await;
        }
        state
    }

    async fn seed_from_config(&self, cfg: crate::config::EngineConfig) {
        // Metrics first; achievements reference them by name.
        let mut id_by_name = HashMap::<String, String>::new();
        for mc in cfg.metrics {
            let fields = MetricFields {
                name: mc.name.clone(),
                description: mc.description,
                metric_type: MetricType::Number,
                units: mc.units,
                default_increment_value: mc.default_increment_value,
            };
            match self.metrics.create_metric(fields).await {
                Ok(m) => {
                    id_by_name.insert(mc.name, m.id);
                }
                Err(e) => {
                    error!(target: "gamify_backend", name = %mc.name, error = %e, "Skipping seed metric");
                }
            }
        }

        let mut seeded = 0usize;
        for ac in cfg.achievements {
            let Some(metric_id) = id_by_name.get(&ac.metric).cloned() else {
                error!(target: "gamify_backend", name = %ac.name, metric = %ac.metric, "Skipping seed achievement: unknown metric name");
                continue;
            };
            let reward_metric_id = match &ac.reward_metric {
                Some(name) => match id_by_name.get(name) {
                    Some(id) => Some(id.clone()),
                    None => {
                        error!(target: "gamify_backend", name = %ac.name, reward_metric = %name, "Skipping seed achievement: unknown reward metric name");
                        continue;
                    }
                },
                None => None,
            };
            let fields = AchievementFields {
                name: ac.name.clone(),
                description: ac.description,
                badge_url: ac.badge_url,
                trigger: AchievementTrigger::Metric,
                metric_id,
                metric_count: ac.metric_count,
                reward_metric_id,
                reward_increment_value: ac.reward_increment_value,
                status: AchievementStatus::Active,
            };
            match self.achievements.create_achievement(fields).await {
                Ok(_) => seeded += 1,
                Err(e) => {
                    error!(target: "gamify_backend", name = %ac.name, error = %e, "Skipping seed achievement");
                }
            }
        }
        info!(target: "gamify_backend", metrics = id_by_name.len(), achievements = seeded, "Seed config applied");
    }

    /// Create an achievement after checking the referenced metrics exist.
    /// Ids are already well-formed at this point, so missing metrics surface
    /// as 404, distinguished from malformed-id 400.
    #[instrument(level = "debug", skip(self, fields), fields(name = %fields.name))]
    pub async fn create_achievement(
        &self,
        fields: AchievementFields,
    ) -> Result<Achievement, ApiError> {
        // Field-level validation (reward pairing, self-reward) decides 400
        // before any existence lookup gets a chance to answer 404.
        AchievementRegistry::validate_fields(&fields)?;
        self.check_achievement_refs(&fields).await?;
        self.achievements.create_achievement(fields).await
    }

    #[instrument(level = "debug", skip(self, fields), fields(%id))]
    pub async fn update_achievement(
        &self,
        id: &str,
        fields: AchievementFields,
    ) -> Result<(), ApiError> {
        // Existence of the achievement itself first: the update target not
        // being there is the contract's 404 regardless of body content. Field
        // validation then ranks above the referential lookups, as on create.
        self.achievements.get_achievement(id).await?;
        AchievementRegistry::validate_fields(&fields)?;
        self.check_achievement_refs(&fields).await?;
        self.achievements.update_achievement(id, fields).await
    }

    async fn check_achievement_refs(&self, fields: &AchievementFields) -> Result<(), ApiError> {
        if !self.metrics.metric_exists(&fields.metric_id).await {
            return Err(ApiError::NotFound(format!(
                "metric {} not found",
                fields.metric_id
            )));
        }
        if let Some(reward) = &fields.reward_metric_id {
            if !self.metrics.metric_exists(reward).await {
                return Err(ApiError::NotFound(format!("metric {} not found", reward)));
            }
        }
        Ok(())
    }

    /// Delete a metric and cascade DELETED status onto achievements gated on
    /// it, so they drop out of evaluation but stay readable.
    #[instrument(level = "debug", skip(self), fields(%metric_id))]
    pub async fn delete_metric(&self, metric_id: &str) -> Result<(), ApiError> {
        self.metrics.delete_metric(metric_id).await?;
        self.achievements.mark_deleted_for_metric(metric_id).await;
        Ok(())
    }
}
