//! Runner configuration: `pagegen.toml` tuning plus agent connection
//! parameters collected from the environment once at startup.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Literal fallback used when no credential is configured. Calls made with
/// it fail authentication downstream; the runner itself still starts.
pub const PLACEHOLDER_API_KEY: &str = "put-your-key-here";

const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn/api/anthropic";
const DEFAULT_MODEL: &str = "glm-4.7";

/// Batch tuning (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause between consecutive processed items, in milliseconds.
    pub inter_item_delay_ms: u64,

    /// Truncate generator stdout/stderr transcripts beyond this many bytes.
    pub generator_output_limit_bytes: usize,

    /// Per-item deadline in seconds. Absent means the wait is unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_timeout_secs: Option<u64>,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Command to launch the generative agent CLI (e.g. `["claude"]`).
    pub command: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string()],
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 2000,
            generator_output_limit_bytes: 100_000,
            generation_timeout_secs: None,
            agent: AgentConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.generator_output_limit_bytes == 0 {
            return Err(anyhow!("generator_output_limit_bytes must be > 0"));
        }
        if self.generation_timeout_secs == Some(0) {
            return Err(anyhow!(
                "generation_timeout_secs must be > 0 (omit it for an unbounded wait)"
            ));
        }
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `BatchConfig::default()`.
pub fn load_config(path: &Path) -> Result<BatchConfig> {
    if !path.exists() {
        let cfg = BatchConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: BatchConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &BatchConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Connection parameters for the generative agent.
///
/// Resolved from the environment exactly once at startup and passed by value
/// into the generation client constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub auth_token: String,
    pub model: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let auth_token = env::var("GLM_API_KEY").unwrap_or_else(|_| {
            warn!("GLM_API_KEY is not set, falling back to a placeholder credential");
            PLACEHOLDER_API_KEY.to_string()
        });
        Self {
            base_url: env::var("GLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            auth_token,
            model: env::var("GLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        }
    }
}
