//! Runtime configuration.
//!
//! One struct, defaults matching the external OpenROAD flow, every knob
//! overridable through `SILICA_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-turn iteration cap for the agent loop.
pub const DEFAULT_MAX_ITERATIONS: usize = 40;
/// Default wall-clock budget for a single turn.
pub const DEFAULT_TURN_BUDGET: Duration = Duration::from_secs(600);
/// Default hard timeout for tool subprocesses.
pub const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(120);
/// Default hard timeout for a synthesis job.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(1800);
/// A running job with no progress for this long is reported as stuck.
pub const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(300);

/// Tool filter applied to new sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultFilter {
    #[default]
    All,
    Essential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root directory holding the SQLite database and `workspace/`.
    pub data_root: PathBuf,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Provider endpoint base URL.
    pub llm_base_url: String,
    /// Provider credential. Opaque to the core.
    pub llm_api_key: String,
    pub max_iterations: usize,
    #[serde(with = "duration_secs")]
    pub turn_budget: Duration,
    #[serde(with = "duration_secs")]
    pub subprocess_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub synthesis_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub stuck_threshold: Duration,
    /// Container image running the synthesis flow.
    pub synthesis_image: String,
    /// Command executed inside the container.
    pub synthesis_command: String,
    /// Ordered stage names matched against synthesis stdout for progress
    /// detection. Configuration, not a constant: log conventions drift
    /// between flow releases.
    pub stage_names: Vec<String>,
    pub default_filter: DefaultFilter,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".silica"),
            model: "claude-sonnet-4-20250514".to_string(),
            llm_base_url: "https://api.anthropic.com".to_string(),
            llm_api_key: String::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            turn_budget: DEFAULT_TURN_BUDGET,
            subprocess_timeout: DEFAULT_SUBPROCESS_TIMEOUT,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            stuck_threshold: DEFAULT_STUCK_THRESHOLD,
            synthesis_image: "openroad/orfs:latest".to_string(),
            synthesis_command: "make -B DESIGN_CONFIG=/workspace/config.mk".to_string(),
            stage_names: vec![
                "synth".to_string(),
                "floorplan".to_string(),
                "place".to_string(),
                "cts".to_string(),
                "route".to_string(),
                "final".to_string(),
            ],
            default_filter: DefaultFilter::All,
        }
    }
}

impl CoreConfig {
    /// Build a config from defaults plus `SILICA_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(root) = std::env::var("SILICA_DATA_ROOT") {
            cfg.data_root = PathBuf::from(root);
        }
        if let Ok(model) = std::env::var("SILICA_MODEL") {
            cfg.model = model;
        }
        if let Ok(url) = std::env::var("SILICA_LLM_BASE_URL") {
            cfg.llm_base_url = url;
        }
        if let Ok(key) = std::env::var("SILICA_LLM_API_KEY")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
        {
            cfg.llm_api_key = key;
        }
        if let Some(n) = env_usize("SILICA_MAX_ITERATIONS") {
            cfg.max_iterations = n;
        }
        if let Some(secs) = env_usize("SILICA_TURN_BUDGET_SECS") {
            cfg.turn_budget = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_usize("SILICA_SUBPROCESS_TIMEOUT_SECS") {
            cfg.subprocess_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_usize("SILICA_SYNTHESIS_TIMEOUT_SECS") {
            cfg.synthesis_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(secs) = env_usize("SILICA_STUCK_THRESHOLD_SECS") {
            cfg.stuck_threshold = Duration::from_secs(secs as u64);
        }
        if let Ok(image) = std::env::var("SILICA_SYNTHESIS_IMAGE") {
            cfg.synthesis_image = image;
        }
        if let Ok(stages) = std::env::var("SILICA_STAGE_NAMES") {
            let names: Vec<String> = stages
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !names.is_empty() {
                cfg.stage_names = names;
            }
        }
        if let Ok(filter) = std::env::var("SILICA_DEFAULT_FILTER") {
            if filter.eq_ignore_ascii_case("essential") {
                cfg.default_filter = DefaultFilter::Essential;
            }
        }

        cfg
    }

    /// SQLite database file under the data root.
    pub fn db_path(&self) -> PathBuf {
        self.data_root.join("silica.db")
    }

    /// Parent directory of all session workspaces.
    pub fn workspace_root(&self) -> PathBuf {
        self.data_root.join("workspace")
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

mod duration_secs {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_derive_from_data_root() {
        let mut cfg = CoreConfig::default();
        cfg.data_root = PathBuf::from("/data/silica");
        assert_eq!(cfg.db_path(), PathBuf::from("/data/silica/silica.db"));
        assert_eq!(
            cfg.workspace_root(),
            PathBuf::from("/data/silica/workspace")
        );
    }

    #[test]
    fn default_stage_order_is_flow_order() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.stage_names.first().map(String::as_str), Some("synth"));
        assert_eq!(cfg.stage_names.last().map(String::as_str), Some("final"));
    }
}
