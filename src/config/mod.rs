use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolKind;
use crate::serial::interface::{BAUD_RATE, READ_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings fixed for the lifetime of one logging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `None` picks the first port the OS reports
    pub port_name: Option<String>,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// How long to wait for the sentinel before re-requesting
    pub response_timeout_ms: u64,
    pub protocol: ProtocolKind,
    /// Grid size; defaults to the protocol's usual controller
    pub rows: Option<usize>,
    pub cols: Option<usize>,
    /// Directory for the CSV log; no CSV is written when unset
    pub log_dir: Option<PathBuf>,
    pub sink_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: BAUD_RATE,
            read_timeout_ms: READ_TIMEOUT.as_millis() as u64,
            poll_interval_ms: 50,
            response_timeout_ms: 1000,
            protocol: ProtocolKind::Dense,
            rows: None,
            cols: None,
            log_dir: None,
            sink_queue_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// 20x20 row-scan controller
    pub fn dense(port_name: &str) -> Self {
        Self {
            port_name: Some(port_name.to_string()),
            protocol: ProtocolKind::Dense,
            ..Self::default()
        }
    }

    /// 48x48 active-point controller
    pub fn sparse(port_name: &str) -> Self {
        Self {
            port_name: Some(port_name.to_string()),
            protocol: ProtocolKind::Sparse,
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded session config from {}", path.display());
        Ok(config)
    }

    /// `(rows, cols)` after applying protocol defaults
    pub fn grid(&self) -> (usize, usize) {
        let (rows, cols) = self.protocol.default_grid();
        (self.rows.unwrap_or(rows), self.cols.unwrap_or(cols))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let (rows, cols) = self.grid();
        if rows == 0 || cols == 0 {
            return Err(ConfigError::Invalid(format!("grid {}x{} has no cells", rows, cols)));
        }

        // Sizes, indices and coordinates all travel as single bytes.
        let (max_rows, max_cols) = match self.protocol {
            ProtocolKind::Dense => (255, 256),
            ProtocolKind::Sparse => (256, 256),
        };
        if rows > max_rows || cols > max_cols {
            return Err(ConfigError::Invalid(format!(
                "{} protocol supports at most {}x{}, got {}x{}",
                self.protocol.as_str(),
                max_rows,
                max_cols,
                rows,
                cols
            )));
        }

        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be non-zero".to_string()));
        }
        if self.read_timeout_ms == 0 || self.poll_interval_ms == 0 || self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts and poll interval must be non-zero".to_string()));
        }
        if self.sink_queue_capacity == 0 {
            return Err(ConfigError::Invalid("sink_queue_capacity must be non-zero".to_string()));
        }
        Ok(())
    }
}
