//! Achievement registry: achievement definitions plus per-user unlock records.
//!
//! This module owns:
//!   - the achievement table, indexed by id and by trigger metric so the
//!     evaluator can fetch candidates in one lookup per touched metric
//!   - unlock records keyed (user, achievement), inserted at most once
//!
//! Referential checks against the metric store (does the trigger metric
//! exist?) live in `AppState`, which owns both components.

use std::{collections::HashMap, sync::Arc};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::domain::{Achievement, AchievementStatus, AchievementTrigger, UserAchievement};
use crate::error::ApiError;
use crate::util::{new_id, require_finite};

/// Validated fields for creating or replacing an achievement definition.
#[derive(Clone, Debug)]
pub struct AchievementFields {
    pub name: String,
    pub description: String,
    pub badge_url: String,
    pub trigger: AchievementTrigger,
    pub metric_id: String,
    pub metric_count: f64,
    pub reward_metric_id: Option<String>,
    pub reward_increment_value: Option<f64>,
    pub status: AchievementStatus,
}

#[derive(Default)]
struct AchievementTable {
    by_id: HashMap<String, Achievement>,
    /// Listing order is stable insertion order.
    order: Vec<String>,
    /// trigger metric id -> achievement ids gated on it.
    by_metric: HashMap<String, Vec<String>>,
}

#[derive(Default)]
struct UnlockTable {
    /// user id -> achievement id -> unlock record.
    by_user: HashMap<String, HashMap<String, UserAchievement>>,
}

#[derive(Clone, Default)]
pub struct AchievementRegistry {
    achievements: Arc<RwLock<AchievementTable>>,
    unlocks: Arc<RwLock<UnlockTable>>,
}

impl AchievementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn validate_fields(fields: &AchievementFields) -> Result<(), ApiError> {
        if fields.name.trim().is_empty() {
            return Err(ApiError::Validation("achievement name must not be empty".into()));
        }
        require_finite("metricCount", fields.metric_count)?;
        match (&fields.reward_metric_id, fields.reward_increment_value) {
            (Some(_), None) => {
                return Err(ApiError::Validation(
                    "rewardIncrementValue is required when rewardMetricId is set".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(ApiError::Validation(
                    "rewardMetricId is required when rewardIncrementValue is set".into(),
                ))
            }
            (Some(reward), Some(v)) => {
                require_finite("rewardIncrementValue", v)?;
                // A self-rewarding achievement would re-trigger its own metric
                // forever; rejected at definition time.
                if *reward == fields.metric_id {
                    return Err(ApiError::Validation(
                        "rewardMetricId must differ from the trigger metricId".into(),
                    ));
                }
            }
            (None, None) => {}
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self, fields), fields(name = %fields.name))]
    pub async fn create_achievement(
        &self,
        fields: AchievementFields,
    ) -> Result<Achievement, ApiError> {
        Self::validate_fields(&fields)?;
        let achievement = Achievement {
            id: new_id(),
            name: fields.name,
            description: fields.description,
            badge_url: fields.badge_url,
            trigger: fields.trigger,
            metric_id: fields.metric_id,
            metric_count: fields.metric_count,
            reward_metric_id: fields.reward_metric_id,
            reward_increment_value: fields.reward_increment_value,
            status: fields.status,
        };
        let mut table = self.achievements.write().await;
        table.order.push(achievement.id.clone());
        table
            .by_metric
            .entry(achievement.metric_id.clone())
            .or_default()
            .push(achievement.id.clone());
        table.by_id.insert(achievement.id.clone(), achievement.clone());
        info!(target: "engine", id = %achievement.id, name = %achievement.name, metric = %achievement.metric_id, "Achievement created");
        Ok(achievement)
    }

    pub async fn get_achievement(&self, id: &str) -> Result<Achievement, ApiError> {
        let table = self.achievements.read().await;
        table
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("achievement {} not found", id)))
    }

    pub async fn list_achievements(&self) -> Vec<Achievement> {
        let table = self.achievements.read().await;
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect()
    }

    #[instrument(level = "debug", skip(self, fields), fields(%id))]
    pub async fn update_achievement(
        &self,
        id: &str,
        fields: AchievementFields,
    ) -> Result<(), ApiError> {
        Self::validate_fields(&fields)?;
        let mut table = self.achievements.write().await;
        if !table.by_id.contains_key(id) {
            return Err(ApiError::NotFound(format!("achievement {} not found", id)));
        }
        // Re-index if the trigger metric changed.
        let old_metric = table.by_id[id].metric_id.clone();
        if old_metric != fields.metric_id {
            if let Some(ids) = table.by_metric.get_mut(&old_metric) {
                ids.retain(|a| a != id);
            }
            table
                .by_metric
                .entry(fields.metric_id.clone())
                .or_default()
                .push(id.to_string());
        }
        let achievement = table.by_id.get_mut(id).ok_or_else(|| {
            ApiError::Internal(format!("achievement index out of sync for {}", id))
        })?;
        achievement.name = fields.name;
        achievement.description = fields.description;
        achievement.badge_url = fields.badge_url;
        achievement.trigger = fields.trigger;
        achievement.metric_id = fields.metric_id;
        achievement.metric_count = fields.metric_count;
        achievement.reward_metric_id = fields.reward_metric_id;
        achievement.reward_increment_value = fields.reward_increment_value;
        achievement.status = fields.status;
        Ok(())
    }

    /// Soft delete: the definition stays readable with status INACTIVE.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn soft_delete_achievement(&self, id: &str) -> Result<(), ApiError> {
        let mut table = self.achievements.write().await;
        let achievement = table
            .by_id
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("achievement {} not found", id)))?;
        achievement.status = AchievementStatus::Inactive;
        info!(target: "engine", %id, "Achievement soft-deleted (INACTIVE)");
        Ok(())
    }

    /// Cascade from metric deletion: every achievement gated on the metric is
    /// marked DELETED and stops being evaluated. Returns how many were hit.
    #[instrument(level = "debug", skip(self), fields(%metric_id))]
    pub async fn mark_deleted_for_metric(&self, metric_id: &str) -> usize {
        let mut table = self.achievements.write().await;
        let ids = table.by_metric.get(metric_id).cloned().unwrap_or_default();
        let mut hit = 0;
        for id in &ids {
            if let Some(a) = table.by_id.get_mut(id) {
                a.status = AchievementStatus::Deleted;
                hit += 1;
            }
        }
        if hit > 0 {
            info!(target: "engine", %metric_id, count = hit, "Achievements marked DELETED after metric removal");
        }
        hit
    }

    /// Achievements gated on the given metric that are still evaluated
    /// (ACTIVE). One lookup per touched metric per evaluation pass.
    pub async fn candidates_for_metric(&self, metric_id: &str) -> Vec<Achievement> {
        let table = self.achievements.read().await;
        table
            .by_metric
            .get(metric_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| table.by_id.get(id))
                    .filter(|a| a.status == AchievementStatus::Active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_unlocked(&self, user_id: &str, achievement_id: &str) -> bool {
        let table = self.unlocks.read().await;
        table
            .by_user
            .get(user_id)
            .map(|m| m.contains_key(achievement_id))
            .unwrap_or(false)
    }

    /// Idempotent insert-if-absent under one write lock. Returns the new
    /// record when this call created the unlock, None when it already
    /// existed. The None path is the guard against duplicate rewards.
    #[instrument(level = "debug", skip(self), fields(%user_id, %achievement_id))]
    pub async fn record_unlock(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> Option<UserAchievement> {
        let mut table = self.unlocks.write().await;
        let user_unlocks = table.by_user.entry(user_id.to_string()).or_default();
        if user_unlocks.contains_key(achievement_id) {
            return None;
        }
        let record = UserAchievement {
            user_id: user_id.to_string(),
            achievement_id: achievement_id.to_string(),
            unlocked_at: Utc::now(),
        };
        user_unlocks.insert(achievement_id.to_string(), record.clone());
        info!(target: "engine", %user_id, %achievement_id, "Unlock recorded");
        Some(record)
    }

    pub async fn list_user_achievements(&self, user_id: &str) -> Vec<UserAchievement> {
        let table = self.unlocks.read().await;
        let mut records: Vec<UserAchievement> = table
            .by_user
            .get(user_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.unlocked_at.cmp(&b.unlocked_at));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(metric_id: &str) -> AchievementFields {
        AchievementFields {
            name: "Points Master".into(),
            description: "Awarded for reaching 1000 points".into(),
            badge_url: "https://example.com/badge.png".into(),
            trigger: AchievementTrigger::Metric,
            metric_id: metric_id.to_string(),
            metric_count: 1000.0,
            reward_metric_id: None,
            reward_increment_value: None,
            status: AchievementStatus::Active,
        }
    }

    #[tokio::test]
    async fn reward_fields_are_required_together() {
        let registry = AchievementRegistry::new();
        let metric = new_id();

        let mut f = fields(&metric);
        f.reward_metric_id = Some(new_id());
        let err = registry.create_achievement(f).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut f = fields(&metric);
        f.reward_increment_value = Some(50.0);
        let err = registry.create_achievement(f).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn self_reward_is_rejected() {
        let registry = AchievementRegistry::new();
        let metric = new_id();
        let mut f = fields(&metric);
        f.reward_metric_id = Some(metric.clone());
        f.reward_increment_value = Some(10.0);
        let err = registry.create_achievement(f).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn candidates_skip_non_active() {
        let registry = AchievementRegistry::new();
        let metric = new_id();
        let a = registry.create_achievement(fields(&metric)).await.unwrap();
        let b = registry.create_achievement(fields(&metric)).await.unwrap();
        registry.soft_delete_achievement(&b.id).await.unwrap();

        let candidates = registry.candidates_for_metric(&metric).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, a.id);

        // Soft-deleted definitions stay readable.
        let fetched = registry.get_achievement(&b.id).await.unwrap();
        assert_eq!(fetched.status, AchievementStatus::Inactive);
    }

    #[tokio::test]
    async fn unlock_is_idempotent() {
        let registry = AchievementRegistry::new();
        let user = new_id();
        let achievement = new_id();
        assert!(registry.record_unlock(&user, &achievement).await.is_some());
        assert!(registry.record_unlock(&user, &achievement).await.is_none());
        assert!(registry.is_unlocked(&user, &achievement).await);
        assert_eq!(registry.list_user_achievements(&user).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_unlocks_record_exactly_once() {
        let registry = AchievementRegistry::new();
        let user = new_id();
        let achievement = new_id();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let registry = registry.clone();
            let user = user.clone();
            let achievement = achievement.clone();
            handles.push(tokio::spawn(async move {
                registry.record_unlock(&user, &achievement).await.is_some()
            }));
        }
        let mut newly = 0;
        for h in handles {
            if h.await.unwrap() {
                newly += 1;
            }
        }
        assert_eq!(newly, 1);
        assert_eq!(registry.list_user_achievements(&user).await.len(), 1);
    }

    #[tokio::test]
    async fn metric_removal_marks_deleted() {
        let registry = AchievementRegistry::new();
        let metric = new_id();
        let a = registry.create_achievement(fields(&metric)).await.unwrap();
        assert_eq!(registry.mark_deleted_for_metric(&metric).await, 1);
        let fetched = registry.get_achievement(&a.id).await.unwrap();
        assert_eq!(fetched.status, AchievementStatus::Deleted);
        assert!(registry.candidates_for_metric(&metric).await.is_empty());
    }

    #[tokio::test]
    async fn update_reindexes_trigger_metric() {
        let registry = AchievementRegistry::new();
        let old_metric = new_id();
        let new_metric = new_id();
        let a = registry.create_achievement(fields(&old_metric)).await.unwrap();

        let mut f = fields(&new_metric);
        f.metric_count = 20.0;
        registry.update_achievement(&a.id, f).await.unwrap();

        assert!(registry.candidates_for_metric(&old_metric).await.is_empty());
        let candidates = registry.candidates_for_metric(&new_metric).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].metric_count, 20.0);
    }
}
