// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub device: DeviceSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub night: Option<NightSettings>,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    pub host: String,
    #[serde(default = "default_device_port")]
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_pause_at_night")]
    pub pause_at_night: bool,
}

/// Local wall-clock window during which polling pauses, e.g. start
/// "21:30", end "06:00". A window crossing midnight is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct NightSettings {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_device_port() -> u16 {
    23
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    5
}

fn default_pause_at_night() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_server_port() -> u16 {
    8220
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            pause_at_night: default_pause_at_night(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_server_port(),
        }
    }
}

impl NightSettings {
    pub fn window(&self) -> Result<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.start, "%H:%M")
            .with_context(|| format!("Invalid night.start: {}", self.start))?;
        let end = NaiveTime::parse_from_str(&self.end, "%H:%M")
            .with_context(|| format!("Invalid night.end: {}", self.end))?;
        Ok((start, end))
    }
}

impl BridgeConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device.host.is_empty() {
            bail!("device.host must be set");
        }
        if self.device.port == 0 {
            bail!("device.port must be non-zero");
        }
        if self.device.timeout_secs == 0 {
            bail!("device.timeout_secs must be at least 1");
        }
        if self.poll.interval_secs == 0 {
            bail!("poll.interval_secs must be at least 1");
        }
        if let Some(night) = &self.night {
            night.window()?;
        }
        Ok(())
    }
}
