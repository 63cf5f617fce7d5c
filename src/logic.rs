//! Trigger evaluator: the orchestration behind POST /gamification/trigger/metric.
//!
//! A call carries one user and a batch of metric updates. Each update is
//! applied atomically, then every ACTIVE achievement gated on the touched
//! metric is checked against its threshold. Newly unlocked achievements with a
//! configured reward enqueue a synthetic increment for the reward metric, so
//! cascaded unlocks resolve within the same call.
//!
//! Guards:
//!   - the whole seed batch is resolved against the metric store before any
//!     delta is applied, so an unknown metric fails the call with no partial
//!     application
//!   - `record_unlock` is insert-if-absent, so re-crossing a threshold never
//!     duplicates an unlock or re-applies a reward
//!   - the queue is capped at MAX_TRIGGER_STEPS entries per call; reward
//!     cycles that survive definition-time validation hit the cap instead of
//!     looping forever

use std::collections::VecDeque;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{Achievement, UserAchievement};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::ValueUpdate;
use crate::util::require_well_formed_id;

/// Upper bound on processed queue entries per trigger call. Generous: a
/// legitimate batch processes its entries plus one reward per unlocked
/// achievement, so real traffic stays far below this.
pub const MAX_TRIGGER_STEPS: usize = 1000;

/// One pending metric update. `update: None` means "use the metric's default
/// increment value".
#[derive(Clone, Debug)]
pub struct TriggerEntry {
  pub metric_id: String,
  pub update: Option<ValueUpdate>,
}

/// An achievement newly unlocked during one evaluation pass, in unlock order.
#[derive(Clone, Debug)]
pub struct Unlock {
  pub achievement: Achievement,
  pub record: UserAchievement,
}

/// Apply a batch of metric updates for one user and evaluate achievements,
/// cascading reward increments until the queue drains.
#[instrument(level = "info", skip(state, entries), fields(%user_id, batch = entries.len()))]
pub async fn process_metric_trigger(
  state: &AppState,
  user_id: &str,
  entries: Vec<TriggerEntry>,
) -> Result<Vec<Unlock>, ApiError> {
  require_well_formed_id("userId", user_id)?;
  if entries.is_empty() {
    return Err(ApiError::Validation("metrics must contain at least one entry".into()));
  }
  for e in &entries {
    require_well_formed_id("metricId", &e.metric_id)?;
  }
  // Resolve the whole seed batch before touching any value: an unknown
  // metric fails the call with no partial application.
  for e in &entries {
    if !state.metrics.metric_exists(&e.metric_id).await {
      return Err(ApiError::NotFound(format!("metric {} not found", e.metric_id)));
    }
  }

  let mut queue: VecDeque<TriggerEntry> = entries.into();
  let mut unlocked: Vec<Unlock> = Vec::new();
  let mut steps = 0usize;

  while let Some(entry) = queue.pop_front() {
    steps += 1;
    if steps > MAX_TRIGGER_STEPS {
      error!(target: "trigger", %user_id, steps, "Trigger cascade exceeded step cap; aborting");
      return Err(ApiError::Internal(
        "trigger cascade exceeded step limit; check reward configuration for cycles".into(),
      ));
    }

    // Rewards come from validated achievements, but the metric may have been
    // deleted since; that is a configuration integrity failure.
    let metric = state.metrics.get_metric(&entry.metric_id).await?;
    let update = entry
      .update
      .unwrap_or(ValueUpdate::Increment(metric.default_increment_value));
    let new_value = state.metrics.apply_delta(user_id, &metric.id, update).await?;
    debug!(target: "trigger", %user_id, metric = %metric.id, value = new_value, "Metric updated");

    for candidate in state.achievements.candidates_for_metric(&metric.id).await {
      if new_value < candidate.metric_count {
        continue;
      }
      // Insert-if-absent: None means some earlier pass (or a concurrent
      // call) already unlocked it, so no reward is applied here.
      let Some(record) = state.achievements.record_unlock(user_id, &candidate.id).await else {
        continue;
      };
      info!(target: "trigger", %user_id, achievement = %candidate.id, name = %candidate.name, value = new_value, threshold = candidate.metric_count, "Achievement unlocked");
      if let (Some(reward_metric), Some(reward_value)) = (
        candidate.reward_metric_id.clone(),
        candidate.reward_increment_value,
      ) {
        debug!(target: "trigger", %user_id, achievement = %candidate.id, reward_metric = %reward_metric, reward_value, "Reward enqueued");
        queue.push_back(TriggerEntry {
          metric_id: reward_metric,
          update: Some(ValueUpdate::Increment(reward_value)),
        });
      }
      unlocked.push(Unlock { achievement: candidate, record });
    }
  }

  if unlocked.is_empty() {
    debug!(target: "trigger", %user_id, steps, "Trigger pass complete; nothing unlocked");
  } else {
    info!(target: "trigger", %user_id, steps, unlocked = unlocked.len(), "Trigger pass complete");
  }
  if steps > MAX_TRIGGER_STEPS / 2 {
    warn!(target: "trigger", %user_id, steps, "Trigger pass consumed more than half the step cap");
  }
  Ok(unlocked)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{AchievementStatus, AchievementTrigger, MetricType};
  use crate::registry::AchievementFields;
  use crate::store::MetricFields;
  use crate::util::new_id;

  async fn make_metric(state: &AppState, name: &str, default_increment: f64) -> String {
    state
      .metrics
      .create_metric(MetricFields {
        name: name.into(),
        description: String::new(),
        metric_type: MetricType::Number,
        units: "points".into(),
        default_increment_value: default_increment,
      })
      .await
      .unwrap()
      .id
  }

  async fn make_achievement(
    state: &AppState,
    name: &str,
    metric_id: &str,
    threshold: f64,
    reward: Option<(&str, f64)>,
  ) -> String {
    state
      .create_achievement(AchievementFields {
        name: name.into(),
        description: String::new(),
        badge_url: String::new(),
        trigger: AchievementTrigger::Metric,
        metric_id: metric_id.into(),
        metric_count: threshold,
        reward_metric_id: reward.map(|(m, _)| m.to_string()),
        reward_increment_value: reward.map(|(_, v)| v),
        status: AchievementStatus::Active,
      })
      .await
      .unwrap()
      .id
  }

  fn increment(metric_id: &str, v: f64) -> TriggerEntry {
    TriggerEntry { metric_id: metric_id.into(), update: Some(ValueUpdate::Increment(v)) }
  }

  fn absolute(metric_id: &str, v: f64) -> TriggerEntry {
    TriggerEntry { metric_id: metric_id.into(), update: Some(ValueUpdate::Absolute(v)) }
  }

  async fn user_value(state: &AppState, user: &str, metric: &str) -> f64 {
    state
      .metrics
      .list_user_metrics(user)
      .await
      .into_iter()
      .find(|um| um.metric_id == metric)
      .map(|um| um.value)
      .unwrap_or(0.0)
  }

  #[tokio::test]
  async fn threshold_is_greater_or_equal() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let diamonds = make_metric(&state, "Diamonds", 1.0).await;
    let hero =
      make_achievement(&state, "XP Hero", &xp, 500.0, Some((diamonds.as_str(), 50.0))).await;
    let user = new_id();

    // Landing exactly on the threshold unlocks and applies the reward.
    let unlocked = process_metric_trigger(&state, &user, vec![absolute(&xp, 500.0)])
      .await
      .unwrap();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].achievement.id, hero);
    assert_eq!(user_value(&state, &user, &diamonds).await, 50.0);
  }

  #[tokio::test]
  async fn overshoot_still_unlocks() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let a = make_achievement(&state, "Fiver", &xp, 5.0, None).await;
    let user = new_id();

    let unlocked = process_metric_trigger(&state, &user, vec![increment(&xp, 10.0)])
      .await
      .unwrap();
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].achievement.id, a);
  }

  #[tokio::test]
  async fn retrigger_does_not_duplicate_or_reapply_reward() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let diamonds = make_metric(&state, "Diamonds", 1.0).await;
    make_achievement(&state, "XP Hero", &xp, 100.0, Some((diamonds.as_str(), 50.0))).await;
    let user = new_id();

    let first = process_metric_trigger(&state, &user, vec![increment(&xp, 100.0)])
      .await
      .unwrap();
    assert_eq!(first.len(), 1);

    let second = process_metric_trigger(&state, &user, vec![increment(&xp, 100.0)])
      .await
      .unwrap();
    assert!(second.is_empty());
    assert_eq!(user_value(&state, &user, &diamonds).await, 50.0);
    assert_eq!(user_value(&state, &user, &xp).await, 200.0);
  }

  #[tokio::test]
  async fn reward_cascades_into_further_unlocks() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let diamonds = make_metric(&state, "Diamonds", 1.0).await;
    let gems = make_metric(&state, "Gems", 1.0).await;
    let a = make_achievement(&state, "XP Hero", &xp, 1000.0, Some((diamonds.as_str(), 100.0))).await;
    let b =
      make_achievement(&state, "Diamond Collector", &diamonds, 100.0, Some((gems.as_str(), 10.0)))
        .await;
    let c = make_achievement(&state, "Gem Starter", &gems, 10.0, None).await;
    let user = new_id();

    let unlocked = process_metric_trigger(&state, &user, vec![absolute(&xp, 1000.0)])
      .await
      .unwrap();
    let ids: Vec<&str> = unlocked.iter().map(|u| u.achievement.id.as_str()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str(), c.as_str()]);
    assert_eq!(user_value(&state, &user, &diamonds).await, 100.0);
    assert_eq!(user_value(&state, &user, &gems).await, 10.0);
  }

  #[tokio::test]
  async fn missing_update_uses_default_increment() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 7.0).await;
    let user = new_id();

    process_metric_trigger(
      &state,
      &user,
      vec![TriggerEntry { metric_id: xp.clone(), update: None }],
    )
    .await
    .unwrap();
    assert_eq!(user_value(&state, &user, &xp).await, 7.0);
  }

  #[tokio::test]
  async fn duplicate_batch_entries_apply_in_order() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let a = make_achievement(&state, "Fifteen", &xp, 15.0, None).await;
    let user = new_id();

    let unlocked = process_metric_trigger(
      &state,
      &user,
      vec![increment(&xp, 10.0), increment(&xp, 10.0)],
    )
    .await
    .unwrap();
    assert_eq!(user_value(&state, &user, &xp).await, 20.0);
    // Unlocked once, on the second entry crossing the threshold.
    assert_eq!(unlocked.len(), 1);
    assert_eq!(unlocked[0].achievement.id, a);
  }

  #[tokio::test]
  async fn unknown_metric_fails_whole_batch() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let user = new_id();

    let err = process_metric_trigger(
      &state,
      &user,
      vec![increment(&xp, 10.0), increment(&new_id(), 10.0)],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    // First entry was not applied either.
    assert!(state.metrics.list_user_metrics(&user).await.is_empty());
  }

  #[tokio::test]
  async fn malformed_ids_fail_validation_before_lookup() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;

    let err = process_metric_trigger(&state, "not-a-user-id", vec![increment(&xp, 1.0)])
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = process_metric_trigger(&state, &new_id(), vec![increment("bogus", 1.0)])
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = process_metric_trigger(&state, &new_id(), vec![]).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
  }

  #[tokio::test]
  async fn inactive_achievements_are_not_evaluated() {
    let state = AppState::default();
    let xp = make_metric(&state, "XP", 1.0).await;
    let a = make_achievement(&state, "Fiver", &xp, 5.0, None).await;
    state.achievements.soft_delete_achievement(&a).await.unwrap();
    let user = new_id();

    let unlocked = process_metric_trigger(&state, &user, vec![increment(&xp, 10.0)])
      .await
      .unwrap();
    assert!(unlocked.is_empty());
  }

  #[tokio::test]
  async fn step_cap_bounds_one_call() {
    let state = AppState::default();
    let a_metric = make_metric(&state, "A", 1.0).await;
    let b_metric = make_metric(&state, "B", 1.0).await;

    // A batch larger than the cap trips the guard.
    let mut entries = Vec::new();
    for _ in 0..(MAX_TRIGGER_STEPS + 1) {
      entries.push(increment(&a_metric, 1.0));
    }
    let user = new_id();
    let err = process_metric_trigger(&state, &user, entries).await.unwrap_err();
    assert!(matches!(err, ApiError::Internal(_)));

    // Sanity: a two-achievement reward pair does terminate.
    make_achievement(&state, "A1", &a_metric, 1.0, Some((b_metric.as_str(), 1.0))).await;
    make_achievement(&state, "B1", &b_metric, 1.0, Some((a_metric.as_str(), 1.0))).await;
    let unlocked = process_metric_trigger(&state, &new_id(), vec![increment(&a_metric, 1.0)])
      .await
      .unwrap();
    assert_eq!(unlocked.len(), 2);
  }
}
