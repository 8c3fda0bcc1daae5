//! Configuration (§6), read once at boot. Immutable after startup — no
//! component mutates it, only threads it through as a shared `Arc` (§5).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub consensus: ConsensusConfig,
    pub block: BlockConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            consensus: ConsensusConfig::default(),
            block: BlockConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("reading {path}: {e}")))?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Invalid(format!("parsing {path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path, contents).map_err(|e| ConfigError::Invalid(format!("writing {path}: {e}")))
    }

    /// Config errors are fatal at startup (§7).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consensus.super_node_count == 0 {
            return Err(ConfigError::Invalid("super_node_count must be > 0".into()));
        }
        if self.consensus.rewarded_top_x == 0 {
            return Err(ConfigError::Invalid("rewarded_top_x must be > 0".into()));
        }
        if self.consensus.min_stake_rotate > self.consensus.min_stake_core {
            return Err(ConfigError::Invalid(
                "min_stake_rotate must not exceed min_stake_core".into(),
            ));
        }
        if self.block.max_block_size_bytes == 0 {
            return Err(ConfigError::Invalid("max_block_size_bytes must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "timed-node".to_string(),
            data_dir: default_data_dir(),
        }
    }
}

impl NodeConfig {
    pub fn data_path(&self) -> PathBuf {
        Path::new(&self.data_dir).to_path_buf()
    }
}

/// Consensus protocol configuration (§6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub super_node_count: u64,
    pub block_time_seconds: i64,
    pub vrf_collection_timeout_ms: u64,
    pub block_production_timeout_ms: u64,
    pub rewarded_top_x: usize,
    pub pow_base_difficulty: u64,
    pub min_stake_core: u64,
    pub min_stake_rotate: u64,
    /// Number of blocks per epoch before the committee configuration rotates (§4.6).
    pub epoch_length_blocks: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            super_node_count: crate::constants::consensus::SUPER_NODE_COUNT,
            block_time_seconds: crate::constants::consensus::BLOCK_TIME_SECONDS,
            vrf_collection_timeout_ms: crate::constants::consensus::VRF_COLLECTION_TIMEOUT_MS,
            block_production_timeout_ms: crate::constants::consensus::BLOCK_PRODUCTION_TIMEOUT_MS,
            rewarded_top_x: crate::constants::consensus::REWARDED_TOP_X,
            pow_base_difficulty: crate::constants::pow::BASE_DIFFICULTY,
            min_stake_core: crate::constants::stake::MIN_STAKE_CORE,
            min_stake_rotate: crate::constants::stake::MIN_STAKE_ROTATE,
            epoch_length_blocks: 1_000,
        }
    }
}

impl ConsensusConfig {
    /// `⌈2·N/3⌉`.
    pub fn quorum_threshold(&self) -> u64 {
        crate::constants::consensus::quorum_threshold(self.super_node_count)
    }
}

/// Block-production / mempool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    pub max_transactions_per_block: usize,
    pub max_block_size_bytes: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_block: crate::constants::block::MAX_TRANSACTIONS_PER_BLOCK,
            max_block_size_bytes: crate::constants::block::MAX_BLOCK_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sled_path: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            sled_path: "./data/chain.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_super_node_count() {
        let mut config = Config::default();
        config.consensus.super_node_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_stake_floors() {
        let mut config = Config::default();
        config.consensus.min_stake_rotate = config.consensus.min_stake_core + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();
        config.save_to_file(path.to_str().unwrap()).unwrap();
        let loaded = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.consensus.super_node_count, config.consensus.super_node_count);
    }
}
