//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Logging level configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Directory holding workflow snapshots and the session store
    pub state_dir: Option<PathBuf>,
    /// Directory with YAML workflow definitions
    pub workflows_dir: Option<PathBuf>,
    /// Session count kept after a cleanup pass
    pub max_sessions: usize,
    /// Idle hours after which an inactive session is evicted
    pub session_timeout_hours: u32,
    /// Conversation entries kept per session
    pub max_history_messages: usize,
    /// Log entries kept by the progress reporter
    pub progress_log_capacity: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            state_dir: None,
            workflows_dir: None,
            max_sessions: 10,
            session_timeout_hours: 24,
            max_history_messages: 50,
            progress_log_capacity: 500,
        }
    }
}

impl Configuration {
    /// Load configuration from file, defaults when the file is missing
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Configuration = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Configuration::default())
        }
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the XDG config file path
    pub fn default_config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir().ok_or("Could not determine config directory")?;
        Ok(config_dir.join("specloop").join("config.toml"))
    }

    /// Resolved state directory (`~/.specloop` unless configured)
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".specloop")
        })
    }

    /// Resolved workflow definitions directory
    pub fn resolved_workflows_dir(&self) -> PathBuf {
        self.workflows_dir
            .clone()
            .unwrap_or_else(|| self.resolved_state_dir().join("workflows"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_sessions == 0 || self.max_sessions > 100 {
            errors.push("max_sessions must be between 1 and 100".to_string());
        }

        if self.session_timeout_hours == 0 || self.session_timeout_hours > 720 {
            errors.push("session_timeout_hours must be between 1 and 720 (30 days)".to_string());
        }

        if self.max_history_messages == 0 || self.max_history_messages > 1000 {
            errors.push("max_history_messages must be between 1 and 1000".to_string());
        }

        if self.progress_log_capacity == 0 {
            errors.push("progress_log_capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
