//! Balancer configuration
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! policy = "same_collection"
//! same_collection_multiplier = 5
//! same_shard_multiplier = 1000
//! max_balance_moves = 50
//!
//! [required_attributes]
//! role = "data"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use crate::policy::{
    ReplicaCountPolicy, SameCollectionPolicy, DEFAULT_SAME_COLLECTION_MULTIPLIER,
    DEFAULT_SAME_SHARD_MULTIPLIER,
};
use crate::weighted::WeightPolicy;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Largest accepted co-location multiplier
///
/// Keeps node weights exact in `u64` for any realistic replica count.
pub const MAX_MULTIPLIER: u64 = 1_000_000;

/// Which weight policy the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Penalize same-collection and same-shard co-location
    #[default]
    SameCollection,
    /// Balance by replica count only
    ReplicaCount,
}

/// Main balancer configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BalancerConfig {
    #[serde(default)]
    pub policy: PolicyKind,

    /// Cost factor for each additional replica of a collection on one node
    #[serde(default = "default_same_collection_multiplier")]
    pub same_collection_multiplier: u64,

    /// Cost factor for each additional replica of a shard on one node
    #[serde(default = "default_same_shard_multiplier")]
    pub same_shard_multiplier: u64,

    /// Upper bound on moves per balance call (unbounded when unset)
    #[serde(default)]
    pub max_balance_moves: Option<usize>,

    /// Nodes must carry all of these attributes to receive replicas
    #[serde(default)]
    pub required_attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_same_collection_multiplier() -> u64 {
    DEFAULT_SAME_COLLECTION_MULTIPLIER
}

fn default_same_shard_multiplier() -> u64 {
    DEFAULT_SAME_SHARD_MULTIPLIER
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            same_collection_multiplier: default_same_collection_multiplier(),
            same_shard_multiplier: default_same_shard_multiplier(),
            required_attributes: BTreeMap::new(),
            max_balance_moves: None,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by RUST_LOG
    #[serde(default = "default_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,

    /// Append to this file instead of stderr
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file: None,
        }
    }
}

impl BalancerConfig {
    /// Load config from a TOML file, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: BalancerConfig = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            BalancerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Shard co-location must cost more than collection co-location, which
    /// must cost at least as much as a plain replica.
    pub fn validate(&self) -> Result<()> {
        if self.same_collection_multiplier < 1 {
            bail!("same_collection_multiplier must be at least 1");
        }
        if self.same_shard_multiplier > MAX_MULTIPLIER {
            bail!(
                "same_shard_multiplier ({}) must not exceed {}",
                self.same_shard_multiplier,
                MAX_MULTIPLIER
            );
        }
        if self.same_shard_multiplier <= self.same_collection_multiplier {
            bail!(
                "same_shard_multiplier ({}) must exceed same_collection_multiplier ({})",
                self.same_shard_multiplier,
                self.same_collection_multiplier
            );
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            bail!("unknown log format: {}", self.logging.format);
        }
        Ok(())
    }

    /// Build the configured weight policy
    pub fn policy(&self) -> Box<dyn WeightPolicy> {
        match self.policy {
            PolicyKind::SameCollection => Box::new(
                SameCollectionPolicy::with_multipliers(
                    self.same_collection_multiplier,
                    self.same_shard_multiplier,
                )
                .with_required_attributes(self.required_attributes.clone()),
            ),
            PolicyKind::ReplicaCount => Box::new(ReplicaCountPolicy {
                required_attributes: self.required_attributes.clone(),
            }),
        }
    }
}
