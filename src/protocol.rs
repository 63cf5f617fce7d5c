//! Public request/response DTOs for the HTTP endpoints (serde ready).
//!
//! Request bodies are deliberately loose: required fields are `Option` and
//! numeric fields arrive as raw JSON values, so a missing field or a string
//! where a number belongs surfaces as our own 400 with a message, not as a
//! framework body-rejection. Each body type carries a `validate()` that
//! produces the typed fields the stores accept.
//!
//! Wire naming follows the original API: camelCase fields and `_id` on
//! responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    Achievement, AchievementStatus, AchievementTrigger, Metric, MetricType, UserAchievement,
    UserMetric,
};
use crate::error::ApiError;
use crate::logic::{TriggerEntry, Unlock};
use crate::registry::AchievementFields;
use crate::store::{MetricFields, ValueUpdate};
use crate::util::{require_number, require_well_formed_id};

fn missing(field: &str) -> ApiError {
    ApiError::Validation(format!("{} is required", field))
}

//
// Metrics
//

#[derive(Debug, Deserialize)]
pub struct CreateMetricBody {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub units: Option<String>,
    #[serde(rename = "defaultIncrementValue")]
    pub default_increment_value: Option<Value>,
}

impl CreateMetricBody {
    pub fn validate(self) -> Result<MetricFields, ApiError> {
        let name = self.name.ok_or_else(|| missing("name"))?;
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
        let raw_type = self.metric_type.ok_or_else(|| missing("type"))?;
        let metric_type = MetricType::parse(&raw_type)
            .ok_or_else(|| ApiError::Validation(format!("unrecognized metric type: {}", raw_type)))?;
        let default_increment_value = require_number(
            "defaultIncrementValue",
            &self.default_increment_value.ok_or_else(|| missing("defaultIncrementValue"))?,
        )?;
        Ok(MetricFields {
            name,
            description: self.description.unwrap_or_default(),
            metric_type,
            units: self.units.unwrap_or_default(),
            default_increment_value,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMetricBody {
    #[serde(rename = "metricId")]
    pub metric_id: Option<String>,
    #[serde(flatten)]
    pub fields: CreateMetricBody,
}

impl UpdateMetricBody {
    pub fn validate(self) -> Result<(String, MetricFields), ApiError> {
        let metric_id = self.metric_id.ok_or_else(|| missing("metricId"))?;
        require_well_formed_id("metricId", &metric_id)?;
        let fields = self.fields.validate()?;
        Ok((metric_id, fields))
    }
}

#[derive(Debug, Serialize)]
pub struct MetricOut {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub units: String,
    #[serde(rename = "defaultIncrementValue")]
    pub default_increment_value: f64,
}

pub fn metric_to_out(m: &Metric) -> MetricOut {
    MetricOut {
        id: m.id.clone(),
        name: m.name.clone(),
        description: m.description.clone(),
        metric_type: m.metric_type.clone(),
        units: m.units.clone(),
        default_increment_value: m.default_increment_value,
    }
}

//
// Achievements
//

#[derive(Debug, Deserialize)]
pub struct CreateAchievementBody {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "badgeUrl")]
    pub badge_url: Option<String>,
    pub trigger: Option<String>,
    #[serde(rename = "metricId")]
    pub metric_id: Option<String>,
    #[serde(rename = "metricCount")]
    pub metric_count: Option<Value>,
    #[serde(rename = "rewardMetricId")]
    pub reward_metric_id: Option<String>,
    #[serde(rename = "rewardIncrementValue")]
    pub reward_increment_value: Option<Value>,
    pub status: Option<String>,
}

impl CreateAchievementBody {
    pub fn validate(self) -> Result<AchievementFields, ApiError> {
        let name = self.name.ok_or_else(|| missing("name"))?;
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
        let raw_trigger = self.trigger.ok_or_else(|| missing("trigger"))?;
        let trigger = AchievementTrigger::parse(&raw_trigger).ok_or_else(|| {
            ApiError::Validation(format!("unrecognized trigger: {}", raw_trigger))
        })?;
        // Id shape before existence: malformed ids must short-circuit to 400
        // without a store lookup.
        let metric_id = self.metric_id.ok_or_else(|| missing("metricId"))?;
        require_well_formed_id("metricId", &metric_id)?;
        let metric_count =
            require_number("metricCount", &self.metric_count.ok_or_else(|| missing("metricCount"))?)?;
        if let Some(reward) = &self.reward_metric_id {
            require_well_formed_id("rewardMetricId", reward)?;
        }
        let reward_increment_value = self
            .reward_increment_value
            .as_ref()
            .map(|v| require_number("rewardIncrementValue", v))
            .transpose()?;
        let status = match self.status {
            Some(raw) => AchievementStatus::parse(&raw)
                .ok_or_else(|| ApiError::Validation(format!("unrecognized status: {}", raw)))?,
            None => AchievementStatus::Active,
        };
        Ok(AchievementFields {
            name,
            description: self.description.unwrap_or_default(),
            badge_url: self.badge_url.unwrap_or_default(),
            trigger,
            metric_id,
            metric_count,
            reward_metric_id: self.reward_metric_id,
            reward_increment_value,
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAchievementBody {
    #[serde(rename = "achievementId")]
    pub achievement_id: Option<String>,
    #[serde(flatten)]
    pub fields: CreateAchievementBody,
}

impl UpdateAchievementBody {
    pub fn validate(self) -> Result<(String, AchievementFields), ApiError> {
        let achievement_id = self.achievement_id.ok_or_else(|| missing("achievementId"))?;
        require_well_formed_id("achievementId", &achievement_id)?;
        let fields = self.fields.validate()?;
        Ok((achievement_id, fields))
    }
}

#[derive(Debug, Serialize)]
pub struct AchievementOut {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "badgeUrl")]
    pub badge_url: String,
    pub trigger: AchievementTrigger,
    #[serde(rename = "metricId")]
    pub metric_id: String,
    #[serde(rename = "metricCount")]
    pub metric_count: f64,
    #[serde(rename = "rewardMetricId", skip_serializing_if = "Option::is_none")]
    pub reward_metric_id: Option<String>,
    #[serde(rename = "rewardIncrementValue", skip_serializing_if = "Option::is_none")]
    pub reward_increment_value: Option<f64>,
    pub status: AchievementStatus,
}

pub fn achievement_to_out(a: &Achievement) -> AchievementOut {
    AchievementOut {
        id: a.id.clone(),
        name: a.name.clone(),
        description: a.description.clone(),
        badge_url: a.badge_url.clone(),
        trigger: a.trigger.clone(),
        metric_id: a.metric_id.clone(),
        metric_count: a.metric_count,
        reward_metric_id: a.reward_metric_id.clone(),
        reward_increment_value: a.reward_increment_value,
        status: a.status,
    }
}

//
// User metrics
//

#[derive(Debug, Deserialize)]
pub struct CreateUserMetricBody {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "metricId")]
    pub metric_id: Option<String>,
    pub value: Option<Value>,
    // Accepted for wire compatibility; the server always stamps its own time.
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<String>,
}

impl CreateUserMetricBody {
    pub fn validate(self) -> Result<(String, String, f64), ApiError> {
        let user_id = self.user_id.ok_or_else(|| missing("userId"))?;
        require_well_formed_id("userId", &user_id)?;
        let metric_id = self.metric_id.ok_or_else(|| missing("metricId"))?;
        require_well_formed_id("metricId", &metric_id)?;
        let value = require_number("value", &self.value.ok_or_else(|| missing("value"))?)?;
        Ok((user_id, metric_id, value))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserMetricBody {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: CreateUserMetricBody,
}

impl UpdateUserMetricBody {
    pub fn validate(self) -> Result<(String, String, String, f64), ApiError> {
        let id = self.id.ok_or_else(|| missing("_id"))?;
        require_well_formed_id("_id", &id)?;
        let (user_id, metric_id, value) = self.fields.validate()?;
        Ok((id, user_id, metric_id, value))
    }
}

#[derive(Debug, Serialize)]
pub struct UserMetricOut {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "metricId")]
    pub metric_id: String,
    pub value: f64,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
}

pub fn user_metric_to_out(um: &UserMetric) -> UserMetricOut {
    UserMetricOut {
        id: um.id.clone(),
        user_id: um.user_id.clone(),
        metric_id: um.metric_id.clone(),
        value: um.value,
        last_updated: um.last_updated.to_rfc3339(),
    }
}

//
// User achievements
//

#[derive(Debug, Serialize)]
pub struct UserAchievementOut {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "achievementId")]
    pub achievement_id: String,
    #[serde(rename = "unlockedAt")]
    pub unlocked_at: String,
}

pub fn user_achievement_to_out(ua: &UserAchievement) -> UserAchievementOut {
    UserAchievementOut {
        user_id: ua.user_id.clone(),
        achievement_id: ua.achievement_id.clone(),
        unlocked_at: ua.unlocked_at.to_rfc3339(),
    }
}

//
// Trigger
//

#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub metrics: Option<Vec<TriggerMetricBody>>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerMetricBody {
    #[serde(rename = "metricId")]
    pub metric_id: Option<String>,
    #[serde(rename = "incrementValue")]
    pub increment_value: Option<Value>,
    pub value: Option<Value>,
}

impl TriggerBody {
    /// Shape validation only; id well-formedness and metric resolution are
    /// the evaluator's responsibility.
    pub fn validate(self) -> Result<(String, Vec<TriggerEntry>), ApiError> {
        let user_id = self.user_id.ok_or_else(|| missing("userId"))?;
        let metrics = self.metrics.ok_or_else(|| missing("metrics"))?;
        let mut entries = Vec::with_capacity(metrics.len());
        for m in metrics {
            let metric_id = m.metric_id.ok_or_else(|| missing("metrics[].metricId"))?;
            let update = match (m.increment_value, m.value) {
                (Some(_), Some(_)) => {
                    return Err(ApiError::Validation(
                        "a metric entry cannot set both incrementValue and value".into(),
                    ))
                }
                (Some(inc), None) => Some(ValueUpdate::Increment(require_number(
                    "metrics[].incrementValue",
                    &inc,
                )?)),
                (None, Some(v)) => Some(ValueUpdate::Absolute(require_number("metrics[].value", &v)?)),
                (None, None) => None,
            };
            entries.push(TriggerEntry { metric_id, update });
        }
        Ok((user_id, entries))
    }
}

#[derive(Debug, Serialize)]
pub struct UnlockedAchievementOut {
    #[serde(rename = "achievementId")]
    pub achievement_id: String,
    #[serde(rename = "achievementName")]
    pub achievement_name: String,
    pub description: String,
    #[serde(rename = "badgeUrl")]
    pub badge_url: String,
    #[serde(rename = "unlockedAt")]
    pub unlocked_at: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerOut {
    #[serde(rename = "achievementsUnlocked")]
    pub achievements_unlocked: Vec<UnlockedAchievementOut>,
}

pub fn trigger_to_out(unlocks: &[Unlock]) -> TriggerOut {
    TriggerOut {
        achievements_unlocked: unlocks
            .iter()
            .map(|u| UnlockedAchievementOut {
                achievement_id: u.achievement.id.clone(),
                achievement_name: u.achievement.name.clone(),
                description: u.achievement.description.clone(),
                badge_url: u.achievement.badge_url.clone(),
                unlocked_at: u.record.unlocked_at.to_rfc3339(),
            })
            .collect(),
    }
}

//
// Misc
//

/// `{status: true}` responses used by the update/delete endpoints.
#[derive(Debug, Serialize)]
pub struct StatusOut {
    pub status: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
