use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::rank_engine::types::RankResult;

const DEFAULT_DB_MAX_SIZE_MB: usize = 1024;
const DEFAULT_MAX_READERS: u32 = 126;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_db_max_size_mb")]
    pub db_max_size_mb: usize,
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,
    /// Run the duplicate detector on commit unless a caller overrides it.
    #[serde(default = "default_true")]
    pub check_duplicates: bool,
    /// Facet criteria must be reachable from the rank's resource.
    #[serde(default = "default_true")]
    pub require_facet_relation: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./rank_data/")
}

fn default_db_max_size_mb() -> usize {
    DEFAULT_DB_MAX_SIZE_MB
}

fn default_max_readers() -> u32 {
    DEFAULT_MAX_READERS
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            db_max_size_mb: DEFAULT_DB_MAX_SIZE_MB,
            max_readers: DEFAULT_MAX_READERS,
            check_duplicates: true,
            require_facet_relation: true,
        }
    }
}

impl EngineConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> RankResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads a TOML config file. Relative `db_path`s resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> RankResult<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        if config.db_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.db_path = parent.join(&config.db_path);
            }
        }
        tracing::debug!(
            config_path = %path.display(),
            db_path = %config.db_path.display(),
            "loaded rank engine config"
        );
        Ok(config)
    }

    pub fn with_db_max_size_mb(mut self, size_mb: usize) -> Self {
        self.db_max_size_mb = size_mb;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_check_duplicates(mut self, check: bool) -> Self {
        self.check_duplicates = check;
        self
    }

    pub fn with_require_facet_relation(mut self, require: bool) -> Self {
        self.require_facet_relation = require;
        self
    }

    pub fn map_size_bytes(&self) -> usize {
        self.db_max_size_mb * 1024 * 1024
    }
}
