use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::BridgeError;
use crate::protocol::PositionConvention;
use crate::types::ConnectMode;

pub const CONFIG_ENV: &str = "SNAKE_BRIDGE_CONFIG";

/// Which gamepad buttons restart the game after game over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartButtons {
    Disabled,
    /// Any of the four face buttons (0..=3).
    #[default]
    AnyAction,
    Single(usize),
}

impl RestartButtons {
    pub fn matches(&self, button: usize) -> bool {
        match *self {
            RestartButtons::Disabled => false,
            RestartButtons::AnyAction => button < 4,
            RestartButtons::Single(b) => b == button,
        }
    }

    pub fn enabled(&self) -> bool {
        *self != RestartButtons::Disabled
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub connect_mode: ConnectMode,
    pub position_convention: PositionConvention,
    pub speed_buttons: bool,
    pub restart_buttons: RestartButtons,
    pub boost: bool,
    pub min_command_interval_ms: u64,
    pub key_repeat_ms: u64,
    pub key_boost_hold_ms: u64,
    pub dead_zone: f32,
    pub boost_threshold: f32,
    pub frame_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            connect_mode: ConnectMode::Toggle,
            position_convention: PositionConvention::OneBased,
            speed_buttons: false,
            restart_buttons: RestartButtons::AnyAction,
            boost: true,
            min_command_interval_ms: 100,
            key_repeat_ms: 50,
            key_boost_hold_ms: 300,
            dead_zone: 0.20,
            boost_threshold: 0.70,
            frame_ms: 16,
        }
    }
}

impl BridgeConfig {
    /// Reads the file named by `SNAKE_BRIDGE_CONFIG`, or defaults when unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.baud_rate == 0 {
            return Err(BridgeError::Config("baud_rate must be > 0".into()));
        }
        if self.min_command_interval_ms == 0 || self.key_repeat_ms == 0 || self.frame_ms == 0 {
            return Err(BridgeError::Config(
                "intervals and periods must be > 0 ms".into(),
            ));
        }
        for (name, v) in [
            ("dead_zone", self.dead_zone),
            ("boost_threshold", self.boost_threshold),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(BridgeError::Config(format!("{name} must be in (0, 1], got {v}")));
            }
        }
        Ok(())
    }

    pub fn min_command_interval(&self) -> Duration {
        Duration::from_millis(self.min_command_interval_ms)
    }

    pub fn key_repeat(&self) -> Duration {
        Duration::from_millis(self.key_repeat_ms)
    }

    pub fn key_boost_hold(&self) -> Duration {
        Duration::from_millis(self.key_boost_hold_ms)
    }

    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }
}
