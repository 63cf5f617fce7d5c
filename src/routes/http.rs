//! HTTP endpoint handlers. These are thin wrappers that validate the wire
//! payload, forward to the stores or the trigger evaluator, and shape the
//! response. Failures propagate as `ApiError` and map to 400/404/409/500.

use std::sync::Arc;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::logic::process_metric_trigger;
use crate::protocol::*;
use crate::state::AppState;
use crate::util::require_well_formed_id;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

//
// Metric definitions
//

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_metric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateMetricBody>,
) -> Result<impl IntoResponse, ApiError> {
  let fields = body.validate()?;
  let metric = state.metrics.create_metric(fields).await?;
  Ok((StatusCode::CREATED, Json(metric_to_out(&metric))))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_metrics(
  State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
  let metrics = state.metrics.list_metrics().await;
  let out: Vec<MetricOut> = metrics.iter().map(metric_to_out).collect();
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%metric_id))]
pub async fn http_get_metric(
  State(state): State<Arc<AppState>>,
  Path(metric_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  require_well_formed_id("metricId", &metric_id)?;
  let metric = state.metrics.get_metric(&metric_id).await?;
  Ok(Json(metric_to_out(&metric)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_metric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<UpdateMetricBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (metric_id, fields) = body.validate()?;
  state.metrics.update_metric(&metric_id, fields).await?;
  Ok(Json(StatusOut { status: true }))
}

#[instrument(level = "info", skip(state), fields(%metric_id))]
pub async fn http_delete_metric(
  State(state): State<Arc<AppState>>,
  Path(metric_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  require_well_formed_id("metricId", &metric_id)?;
  state.delete_metric(&metric_id).await?;
  Ok(Json(StatusOut { status: true }))
}

//
// Achievement definitions
//

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_achievement(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateAchievementBody>,
) -> Result<impl IntoResponse, ApiError> {
  let fields = body.validate()?;
  let achievement = state.create_achievement(fields).await?;
  Ok((StatusCode::CREATED, Json(achievement_to_out(&achievement))))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_achievements(
  State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
  let achievements = state.achievements.list_achievements().await;
  let out: Vec<AchievementOut> = achievements.iter().map(achievement_to_out).collect();
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%achievement_id))]
pub async fn http_get_achievement(
  State(state): State<Arc<AppState>>,
  Path(achievement_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  require_well_formed_id("achievementId", &achievement_id)?;
  let achievement = state.achievements.get_achievement(&achievement_id).await?;
  Ok(Json(achievement_to_out(&achievement)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_achievement(
  State(state): State<Arc<AppState>>,
  Json(body): Json<UpdateAchievementBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (achievement_id, fields) = body.validate()?;
  state.update_achievement(&achievement_id, fields).await?;
  Ok(Json(StatusOut { status: true }))
}

#[instrument(level = "info", skip(state), fields(%achievement_id))]
pub async fn http_delete_achievement(
  State(state): State<Arc<AppState>>,
  Path(achievement_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  require_well_formed_id("achievementId", &achievement_id)?;
  state.achievements.soft_delete_achievement(&achievement_id).await?;
  Ok(Json(StatusOut { status: true }))
}

//
// User metrics
//

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_user_metric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateUserMetricBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (user_id, metric_id, value) = body.validate()?;
  let um = state.metrics.create_user_metric(&user_id, &metric_id, value).await?;
  Ok((StatusCode::CREATED, Json(user_metric_to_out(&um))))
}

#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn http_list_user_metrics(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  require_well_formed_id("userId", &user_id)?;
  let rows = state.metrics.list_user_metrics(&user_id).await;
  let out: Vec<UserMetricOut> = rows.iter().map(user_metric_to_out).collect();
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_user_metric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<UpdateUserMetricBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (id, user_id, metric_id, value) = body.validate()?;
  state.metrics.update_user_metric(&id, &user_id, &metric_id, value).await?;
  Ok(Json(StatusOut { status: true }))
}

//
// User achievements
//

#[instrument(level = "info", skip(state), fields(%user_id))]
pub async fn http_list_user_achievements(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  require_well_formed_id("userId", &user_id)?;
  let records = state.achievements.list_user_achievements(&user_id).await;
  let out: Vec<UserAchievementOut> = records.iter().map(user_achievement_to_out).collect();
  Ok(Json(out))
}

//
// Trigger
//

#[instrument(level = "info", skip(state, body))]
pub async fn http_trigger_metric(
  State(state): State<Arc<AppState>>,
  Json(body): Json<TriggerBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (user_id, entries) = body.validate()?;
  let unlocks = process_metric_trigger(&state, &user_id, entries).await?;
  info!(target: "trigger", %user_id, unlocked = unlocks.len(), "HTTP metric trigger evaluated");
  Ok(Json(trigger_to_out(&unlocks)))
}
