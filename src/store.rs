//! Metric store: canonical metric definitions plus per-user metric values.
//!
//! This module owns:
//!   - the metric definition table (insertion-ordered listing)
//!   - the user metric table, indexed by row id, by user, and by
//!     (user, metric) pair so the one-row-per-pair invariant is enforceable
//!
//! `apply_delta` is the hot path used by the trigger evaluator: a single
//! write-lock acquisition covers the whole read-modify-write, so concurrent
//! triggers on the same (user, metric) cannot lose updates.

use std::{collections::HashMap, sync::Arc};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::domain::{Metric, MetricType, UserMetric};
use crate::error::ApiError;
use crate::util::{new_id, require_finite};

/// Validated fields for creating or replacing a metric definition.
#[derive(Clone, Debug)]
pub struct MetricFields {
    pub name: String,
    pub description: String,
    pub metric_type: MetricType,
    pub units: String,
    pub default_increment_value: f64,
}

/// How a user metric value should change.
#[derive(Clone, Copy, Debug)]
pub enum ValueUpdate {
    /// new = old + delta
    Increment(f64),
    /// new = given value
    Absolute(f64),
}

#[derive(Default)]
struct MetricTable {
    by_id: HashMap<String, Metric>,
    /// Listing order is stable insertion order.
    order: Vec<String>,
}

#[derive(Default)]
struct UserMetricTable {
    by_id: HashMap<String, UserMetric>,
    /// (user id, metric id) -> user metric row id. At most one row per pair.
    by_pair: HashMap<(String, String), String>,
    by_user: HashMap<String, Vec<String>>,
}

impl UserMetricTable {
    fn insert(&mut self, um: UserMetric) {
        let key = (um.user_id.clone(), um.metric_id.clone());
        self.by_pair.insert(key, um.id.clone());
        self.by_user
            .entry(um.user_id.clone())
            .or_default()
            .push(um.id.clone());
        self.by_id.insert(um.id.clone(), um);
    }
}

#[derive(Clone, Default)]
pub struct MetricStore {
    metrics: Arc<RwLock<MetricTable>>,
    user_metrics: Arc<RwLock<UserMetricTable>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(fields: &MetricFields) -> Result<(), ApiError> {
        if fields.name.trim().is_empty() {
            return Err(ApiError::Validation("metric name must not be empty".into()));
        }
        require_finite("defaultIncrementValue", fields.default_increment_value)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, fields), fields(name = %fields.name))]
    pub async fn create_metric(&self, fields: MetricFields) -> Result<Metric, ApiError> {
        Self::validate(&fields)?;
        let metric = Metric {
            id: new_id(),
            name: fields.name,
            description: fields.description,
            metric_type: fields.metric_type,
            units: fields.units,
            default_increment_value: fields.default_increment_value,
        };
        let mut table = self.metrics.write().await;
        table.order.push(metric.id.clone());
        table.by_id.insert(metric.id.clone(), metric.clone());
        info!(target: "engine", id = %metric.id, name = %metric.name, "Metric created");
        Ok(metric)
    }

    /// Lookup by well-formed id; callers reject malformed ids before this.
    pub async fn get_metric(&self, id: &str) -> Result<Metric, ApiError> {
        let table = self.metrics.read().await;
        table
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("metric {} not found", id)))
    }

    pub async fn metric_exists(&self, id: &str) -> bool {
        self.metrics.read().await.by_id.contains_key(id)
    }

    pub async fn list_metrics(&self) -> Vec<Metric> {
        let table = self.metrics.read().await;
        table
            .order
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect()
    }

    #[instrument(level = "debug", skip(self, fields), fields(%id))]
    pub async fn update_metric(&self, id: &str, fields: MetricFields) -> Result<(), ApiError> {
        Self::validate(&fields)?;
        let mut table = self.metrics.write().await;
        let metric = table
            .by_id
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("metric {} not found", id)))?;
        metric.name = fields.name;
        metric.description = fields.description;
        metric.metric_type = fields.metric_type;
        metric.units = fields.units;
        metric.default_increment_value = fields.default_increment_value;
        Ok(())
    }

    /// Remove the metric definition. Achievement cascade is handled by the
    /// caller (AppState), which owns both components.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn delete_metric(&self, id: &str) -> Result<(), ApiError> {
        let mut table = self.metrics.write().await;
        if table.by_id.remove(id).is_none() {
            return Err(ApiError::NotFound(format!("metric {} not found", id)));
        }
        table.order.retain(|m| m != id);
        info!(target: "engine", %id, "Metric deleted");
        Ok(())
    }

    /// Administrative creation of a user metric row with an explicit value.
    /// The lazy path used by triggers is `apply_delta`.
    #[instrument(level = "debug", skip(self), fields(%user_id, %metric_id))]
    pub async fn create_user_metric(
        &self,
        user_id: &str,
        metric_id: &str,
        value: f64,
    ) -> Result<UserMetric, ApiError> {
        if !self.metric_exists(metric_id).await {
            return Err(ApiError::NotFound(format!("metric {} not found", metric_id)));
        }
        let mut table = self.user_metrics.write().await;
        let key = (user_id.to_string(), metric_id.to_string());
        if table.by_pair.contains_key(&key) {
            return Err(ApiError::Conflict(format!(
                "user metric for user {} and metric {} already exists",
                user_id, metric_id
            )));
        }
        let um = UserMetric {
            id: new_id(),
            user_id: user_id.to_string(),
            metric_id: metric_id.to_string(),
            value,
            last_updated: Utc::now(),
        };
        table.insert(um.clone());
        Ok(um)
    }

    /// Atomic read-modify-write of one user's metric value. Creates the row
    /// lazily at 0 on first touch. Returns the post-update value.
    #[instrument(level = "debug", skip(self, update), fields(%user_id, %metric_id))]
    pub async fn apply_delta(
        &self,
        user_id: &str,
        metric_id: &str,
        update: ValueUpdate,
    ) -> Result<f64, ApiError> {
        if !self.metric_exists(metric_id).await {
            return Err(ApiError::NotFound(format!("metric {} not found", metric_id)));
        }
        // Single write-lock scope: the read-modify-write below cannot
        // interleave with a concurrent update of the same row.
        let mut table = self.user_metrics.write().await;
        let key = (user_id.to_string(), metric_id.to_string());
        let row_id = match table.by_pair.get(&key) {
            Some(id) => id.clone(),
            None => {
                let um = UserMetric {
                    id: new_id(),
                    user_id: user_id.to_string(),
                    metric_id: metric_id.to_string(),
                    value: 0.0,
                    last_updated: Utc::now(),
                };
                let id = um.id.clone();
                table.insert(um);
                id
            }
        };
        let row = table.by_id.get_mut(&row_id).ok_or_else(|| {
            ApiError::Internal(format!("user metric index out of sync for row {}", row_id))
        })?;
        row.value = match update {
            ValueUpdate::Increment(delta) => row.value + delta,
            ValueUpdate::Absolute(v) => v,
        };
        row.last_updated = Utc::now();
        let new_value = row.value;
        debug!(target: "engine", %user_id, %metric_id, value = new_value, "User metric updated");
        Ok(new_value)
    }

    pub async fn list_user_metrics(&self, user_id: &str) -> Vec<UserMetric> {
        let table = self.user_metrics.read().await;
        table
            .by_user
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| table.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Administrative overwrite of an existing row's value by row id.
    /// Bypasses achievement evaluation. The (user, metric) key of a row is
    /// immutable; a mismatching body is a validation failure.
    #[instrument(level = "debug", skip(self), fields(%row_id))]
    pub async fn update_user_metric(
        &self,
        row_id: &str,
        user_id: &str,
        metric_id: &str,
        value: f64,
    ) -> Result<(), ApiError> {
        let mut table = self.user_metrics.write().await;
        let row = table
            .by_id
            .get_mut(row_id)
            .ok_or_else(|| ApiError::NotFound(format!("user metric {} not found", row_id)))?;
        if row.user_id != user_id || row.metric_id != metric_id {
            return Err(ApiError::Validation(
                "userId/metricId of an existing user metric cannot be changed".into(),
            ));
        }
        row.value = value;
        row.last_updated = Utc::now();
        Ok(())
    }
}
