//! Domain models for the gamification engine: metric and achievement
//! definitions, per-user metric values, and per-user unlock records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value type of a metric. Only numeric counters exist today; the enum keeps
/// the wire format open for future kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
  Number,
}

impl MetricType {
  /// Parse the wire spelling ("Number"). Unrecognized spellings are a
  /// validation failure at the boundary, not a deserialization panic.
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "Number" => Some(MetricType::Number),
      _ => None,
    }
  }
}

/// What causes an achievement to be evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementTrigger {
  Metric,
}

impl AchievementTrigger {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "metric" => Some(AchievementTrigger::Metric),
      _ => None,
    }
  }
}

/// Lifecycle status of an achievement definition.
/// INACTIVE comes from a soft delete or an explicit status update; DELETED is
/// set when the trigger metric itself is removed. Only ACTIVE achievements are
/// evaluated by the trigger engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AchievementStatus {
  Active,
  Inactive,
  Deleted,
}

impl AchievementStatus {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "ACTIVE" => Some(AchievementStatus::Active),
      "INACTIVE" => Some(AchievementStatus::Inactive),
      "DELETED" => Some(AchievementStatus::Deleted),
      _ => None,
    }
  }
}

/// A named counter definition (e.g. "XP", unit "points").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metric {
  pub id: String,
  pub name: String,
  pub description: String,
  pub metric_type: MetricType,
  pub units: String,
  /// Applied when a trigger entry names this metric without an explicit
  /// increment or absolute value.
  pub default_increment_value: f64,
}

/// Current value of a metric for one user. At most one per (user, metric)
/// pair; created lazily with value 0 on first trigger touch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserMetric {
  pub id: String,
  pub user_id: String,
  pub metric_id: String,
  pub value: f64,
  pub last_updated: DateTime<Utc>,
}

/// A rule that unlocks for a user once the gating metric reaches
/// `metric_count`, optionally granting a reward increment to another metric.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Achievement {
  pub id: String,
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

/// Unlock record: one per (user, achievement), never removed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserAchievement {
  pub user_id: String,
  pub achievement_id: String,
  pub unlocked_at: DateTime<Utc>,
}
