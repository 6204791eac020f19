use anyhow::{Context, Result};
use directories::ProjectDirs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::core::types::Side;

/// Engine tuning knobs. All defaults suit a small simulated competition.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Cash every new portfolio starts with.
    #[serde(default = "default_starting_cash")]
    pub starting_cash: Decimal,
    /// Flat fee charged per trade.
    #[serde(default)]
    pub trade_fee: Decimal,
    /// Accept non-integer share quantities.
    #[serde(default)]
    pub allow_fractional_shares: bool,
    /// How long a trade may wait for its portfolio's lock before failing Busy.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Total-value thresholds announced once per portfolio.
    #[serde(default = "default_milestones")]
    pub milestones: Vec<Decimal>,
    /// Event bus buffer; slow subscribers past this lag lose events.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_starting_cash() -> Decimal {
    Decimal::from(10_000)
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_milestones() -> Vec<Decimal> {
    vec![
        Decimal::from(25_000),
        Decimal::from(50_000),
        Decimal::from(100_000),
    ]
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            starting_cash: default_starting_cash(),
            trade_fee: Decimal::ZERO,
            allow_fractional_shares: false,
            lock_timeout_ms: default_lock_timeout_ms(),
            milestones: default_milestones(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// One scripted trade in a demo scenario.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScriptedTrade {
    pub user: String,
    pub symbol: String,
    pub side: Side,
    pub shares: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LeagueScenario {
    pub name: String,
    /// First member listed becomes the league admin.
    pub members: Vec<String>,
    #[serde(default)]
    pub trades: Vec<ScriptedTrade>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Fixed quote table for the demo oracle.
    pub quotes: HashMap<String, Decimal>,
    pub league: LeagueScenario,
    /// Persist the ledger under the default data directory instead of memory.
    #[serde(default)]
    pub persist: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "tradearena", "tradearena")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "tradearena", "tradearena")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
