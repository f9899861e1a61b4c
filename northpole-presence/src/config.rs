//! Session configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::player::Vec2;

/// Presence session configuration.
///
/// Intervals are stored in milliseconds so the struct reads naturally from
/// JSON; use the `Duration` accessors in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Mesh room to join
    pub room: String,
    /// Name shown above the local avatar
    pub display_name: String,
    /// Emoji avatar
    pub avatar_glyph: String,
    /// Minimum gap between throttled `move` broadcasts
    pub move_interval_ms: u64,
    /// Lifetime of a chat bubble
    pub utterance_ttl_ms: u64,
    /// Period of the utterance expiry sweep
    pub sweep_interval_ms: u64,
    /// Delay before the first self-announcement after startup
    pub announce_delay_ms: u64,
    /// Evict remote players silent for this long (None = only on leave)
    pub idle_timeout_ms: Option<u64>,
    /// Chat lines kept in the log; the oldest are dropped first
    pub max_chat_log: usize,
    pub spawn_x: f32,
    pub spawn_y: f32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            room: "christmas_world_lobby".to_string(),
            display_name: "SnowExplorer".to_string(),
            avatar_glyph: "🎅".to_string(),
            move_interval_ms: 50,
            utterance_ttl_ms: 5000,
            sweep_interval_ms: 500,
            announce_delay_ms: 1000,
            idle_timeout_ms: None,
            max_chat_log: crate::reconciler::DEFAULT_CHAT_LOG,
            spawn_x: 1000.0,
            spawn_y: 1000.0,
        }
    }
}

impl PresenceConfig {
    /// Default configuration with a custom display name and avatar.
    pub fn for_player(display_name: impl Into<String>, avatar_glyph: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_glyph: avatar_glyph.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room.is_empty() {
            return Err(ConfigError::Invalid("room must not be empty".into()));
        }
        if self.display_name.is_empty() {
            return Err(ConfigError::Invalid("display_name must not be empty".into()));
        }
        let intervals = [
            ("move_interval_ms", self.move_interval_ms),
            ("utterance_ttl_ms", self.utterance_ttl_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.max_chat_log == 0 {
            return Err(ConfigError::Invalid("max_chat_log must be positive".into()));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("idle_timeout_ms must be positive".into()));
        }
        if !self.spawn_x.is_finite() || !self.spawn_y.is_finite() {
            return Err(ConfigError::Invalid("spawn position must be finite".into()));
        }
        Ok(())
    }

    pub fn move_interval(&self) -> Duration {
        Duration::from_millis(self.move_interval_ms)
    }

    pub fn utterance_ttl(&self) -> Duration {
        Duration::from_millis(self.utterance_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn announce_delay(&self) -> Duration {
        Duration::from_millis(self.announce_delay_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn spawn_point(&self) -> Vec2 {
        Vec2::new(self.spawn_x, self.spawn_y)
    }
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(String),
    #[error("Config parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
