use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Top-level stepgraph configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
    /// JSONL run logging (disabled when the section is absent).
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step budget applied to graphs created without `max_steps`.
    #[serde(default = "default_max_steps")]
    pub default_max_steps: usize,
    /// Timeout for tools that do not declare their own.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    /// Capacity of the step event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_steps: default_max_steps(),
            tool_timeout_secs: default_tool_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_max_steps() -> usize { 20 }
fn default_tool_timeout() -> u64 { 30 }
fn default_event_capacity() -> usize { 256 }

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database path for the sqlite backend (supports `~/`).
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// Resolve the database path (expand ~).
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

fn default_store_path() -> String { "stepgraph.db".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

/// JSONL runtime logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable runtime logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files.
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Logging level: 1 = run summary only, 2 = per-step, 3 = per-step with state (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_log_dir(),
            level: 2,
        }
    }
}

impl LogConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        expand_home(&self.dir)
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_dir() -> String { "logs".to_string() }
fn default_log_level() -> u8 { 2 }

impl AppConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))
    }

    /// Load the config if the file exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Gateway settings, defaulted when the section is absent.
    pub fn gateway_or_default(&self) -> GatewayConfig {
        self.gateway.clone().unwrap_or_default()
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
