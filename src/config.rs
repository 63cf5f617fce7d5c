//! Loading the optional engine seed configuration from TOML.
//!
//! `ENGINE_CONFIG_PATH` may point to a file declaring metrics and achievements
//! to create at startup, so a deployment can ship a ready-made rule set
//! without driving the admin API first. Achievements reference metrics by
//! name (ids are generated at startup). See `EngineConfig` for the schema.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct EngineConfig {
  #[serde(default)]
  pub metrics: Vec<MetricCfg>,
  #[serde(default)]
  pub achievements: Vec<AchievementCfg>,
}

/// Metric entry accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct MetricCfg {
  pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default = "default_units")] pub units: String,
  #[serde(default = "default_increment")] pub default_increment_value: f64,
}

/// Achievement entry accepted in TOML configuration.
/// `metric` and `reward_metric` name entries from `[[metrics]]`.
#[derive(Clone, Debug, Deserialize)]
pub struct AchievementCfg {
  pub name: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub badge_url: String,
  pub metric: String,
  pub metric_count: f64,
  #[serde(default)] pub reward_metric: Option<String>,
  #[serde(default)] pub reward_increment_value: Option<f64>,
}

fn default_units() -> String {
  "points".into()
}

fn default_increment() -> f64 {
  1.0
}

/// Attempt to load `EngineConfig` from ENGINE_CONFIG_PATH. On any parsing/IO
/// error, returns None and the service starts with empty stores.
pub fn load_engine_config_from_env() -> Option<EngineConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<EngineConfig>(&s) {
      Ok(cfg) => {
        info!(target: "gamify_backend", %path, "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "gamify_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "gamify_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
