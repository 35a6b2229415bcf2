//! Configuration management for StageOSC
//!
//! Handles loading and validation of the optional YAML configuration file.
//! Every field has a default, so running without a file is equivalent to an
//! empty one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::bridge::DeckLayout;
use crate::stagelinq::ListenerConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub identity: IdentityConfig,
    pub osc: OscConfig,
    pub decks: DecksConfig,
}

/// Discovery window timing
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// How long to listen for devices after startup
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Interval between our own presence announcements
    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,
}

/// How we present ourselves to devices
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IdentityConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_software_name")]
    pub software_name: String,
    #[serde(default = "default_software_version")]
    pub software_version: String,
}

/// OSC destination
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OscConfig {
    #[serde(default = "default_osc_host")]
    pub host: String,
    #[serde(default = "default_osc_port")]
    pub port: u16,
}

/// Deck layout
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DecksConfig {
    #[serde(default = "default_deck_count")]
    pub count: usize,
    /// Explicit StateMap paths; defaults to artist and song name per deck
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_paths: Option<Vec<String>>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            announce_interval_ms: default_announce_interval_ms(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            software_name: default_software_name(),
            software_version: default_software_version(),
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: default_osc_host(),
            port: default_osc_port(),
        }
    }
}

impl Default for DecksConfig {
    fn default() -> Self {
        Self {
            count: default_deck_count(),
            state_paths: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without validating
    pub fn parse(yaml: &str) -> Result<Self> {
        // An empty file deserialises as YAML null
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.discovery.timeout_ms == 0 {
            anyhow::bail!("discovery.timeout_ms must be greater than 0");
        }
        if self.discovery.announce_interval_ms == 0 {
            anyhow::bail!("discovery.announce_interval_ms must be greater than 0");
        }

        if self.identity.name.is_empty() {
            anyhow::bail!("identity.name cannot be empty");
        }

        if self.osc.host.is_empty() {
            anyhow::bail!("osc.host cannot be empty");
        }
        if self.osc.port == 0 {
            anyhow::bail!("osc.port cannot be 0");
        }

        if self.decks.count == 0 {
            anyhow::bail!("decks.count must be at least 1");
        }
        if let Some(paths) = &self.decks.state_paths {
            if paths.is_empty() {
                anyhow::bail!("decks.state_paths cannot be an empty list");
            }
            if let Some(idx) = paths.iter().position(|p| p.is_empty()) {
                anyhow::bail!("decks.state_paths[{}] cannot be empty", idx);
            }
        }

        Ok(())
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery.timeout_ms)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.discovery.announce_interval_ms)
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            name: self.identity.name.clone(),
            software_name: self.identity.software_name.clone(),
            software_version: self.identity.software_version.clone(),
        }
    }

    pub fn deck_layout(&self) -> DeckLayout {
        match &self.decks.state_paths {
            Some(paths) => DeckLayout::with_state_paths(self.decks.count, paths.clone()),
            None => DeckLayout::new(self.decks.count),
        }
    }
}

fn default_timeout_ms() -> u64 { 5000 }
fn default_announce_interval_ms() -> u64 { 1000 }
fn default_name() -> String { "StageOSC".to_string() }
fn default_software_name() -> String { "StagelinQ to OSC Bridge".to_string() }
fn default_software_version() -> String { "0.0.1".to_string() }
fn default_osc_host() -> String { "127.0.0.1".to_string() }
fn default_osc_port() -> u16 { 57200 }
fn default_deck_count() -> usize { 4 }
