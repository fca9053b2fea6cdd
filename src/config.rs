//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section and field has a default, so a partial file (or none at all)
//! still yields a usable table.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

use crate::storage::DEFAULT_STATE_FILE;
use crate::types::{Points, DEFAULT_DEALER_POINTS};

/// Default config file path.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub defaults: DefaultsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Keep the table in `state_file`. When false the table lives in
    /// memory only and is gone on exit.
    pub persist: bool,
    pub state_file: String,
    pub dealer_starting_points: Points,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persist: true,
            state_file: DEFAULT_STATE_FILE.to_string(),
            dealer_starting_points: DEFAULT_DEALER_POINTS,
        }
    }
}

/// Values applied when a caller leaves an argument out.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    pub starting_points: Points,
    pub loan_amount: Points,
    /// Percent.
    pub interest_rate: Decimal,
    pub duration_rounds: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            starting_points: 100,
            loan_amount: 50,
            interest_rate: dec!(10),
            duration_rounds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and check configuration held in a string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject defaults the ledger would refuse anyway.
    pub fn validate(&self) -> Result<()> {
        if self.session.persist && self.session.state_file.trim().is_empty() {
            bail!("session.state_file must be set when session.persist is true");
        }
        if self.session.dealer_starting_points < 0 {
            bail!("session.dealer_starting_points cannot be negative");
        }
        if self.defaults.starting_points <= 0 {
            bail!("defaults.starting_points must be positive");
        }
        if self.defaults.loan_amount <= 0 {
            bail!("defaults.loan_amount must be positive");
        }
        if self.defaults.interest_rate.is_sign_negative() {
            bail!("defaults.interest_rate cannot be negative");
        }
        if self.defaults.duration_rounds == 0 {
            bail!("defaults.duration_rounds must be at least 1");
        }
        Ok(())
    }
}
