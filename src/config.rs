//! Project ingestion configuration (SPEC_FULL.md 1.3).
//!
//! Grounded on `config.rs`'s `LatticeConfigProvider`/`TomlConfigProvider`
//! pair: a small provider trait plus a single-TOML-file implementation.
//! `EnvOverrideConfigProvider` adds the environment-variable overlay spec.md
//! §6 "Environment" describes, the teacher having no equivalent (it has no
//! environment-tunable settings), so it's grounded on the same decorator
//! shape `db.rs`'s transaction wrapper uses around a plain provider.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// Persistent, per-project ingestion configuration (spec.md §6 "Persistent
/// state"), plus the tunables spec.md §6 "Environment" documents defaults
/// for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Entity kinds this project's parsers/extractors may emit, e.g.
    /// `["Function", "Class", "Section"]`. Opaque to the core beyond being
    /// carried through to uniqueness-constraint setup.
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub searchable_fields: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<String>,
    #[serde(default)]
    pub vector_indexes: Vec<String>,
    #[serde(default)]
    pub summarization_llm: Option<String>,

    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_embedding_concurrency")]
    pub embedding_concurrency: usize,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_stuck_threshold_ms")]
    pub stuck_threshold_ms: i64,
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "default".to_string()
}
fn default_batch_interval_ms() -> u64 {
    1000
}
fn default_max_batch_size() -> usize {
    100
}
fn default_embedding_concurrency() -> usize {
    crate::embedding::DEFAULT_CONCURRENT_BATCHES
}
fn default_embedding_batch_size() -> usize {
    crate::embedding::DEFAULT_BATCH_SIZE
}
fn default_stuck_threshold_ms() -> i64 {
    5 * 60 * 1000
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            entities: Vec::new(),
            searchable_fields: Vec::new(),
            relationships: Vec::new(),
            vector_indexes: Vec::new(),
            summarization_llm: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            batch_interval_ms: default_batch_interval_ms(),
            max_batch_size: default_max_batch_size(),
            embedding_concurrency: default_embedding_concurrency(),
            embedding_batch_size: default_embedding_batch_size(),
            stuck_threshold_ms: default_stuck_threshold_ms(),
        }
    }
}

impl IngestConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, IngestError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml_string(&self) -> Result<String, IngestError> {
        Ok(toml::to_string(self)?)
    }
}

/// Source of a project's [`IngestConfig`]. Grounded on
/// `LatticeConfigProvider`'s get/set pair.
pub trait ConfigProvider: Send + Sync {
    fn get_config(&self) -> Result<IngestConfig, IngestError>;
    fn set_config(&self, config: &IngestConfig) -> Result<(), IngestError>;
}

/// Single-TOML-file-backed provider, mirroring `TomlConfigProvider`'s
/// read/parse-whole-file, serialize/write-whole-file round trip.
#[derive(Debug, Clone)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TomlConfigProvider { path: path.into() }
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_config(&self) -> Result<IngestConfig, IngestError> {
        if !self.path.exists() {
            tracing::debug!(path = ?self.path, "[TomlConfigProvider] config file not found, using defaults");
            return Ok(IngestConfig::default());
        }
        let content = fs::read_to_string(&self.path)?;
        IngestConfig::from_toml_str(&content)
    }

    fn set_config(&self, config: &IngestConfig) -> Result<(), IngestError> {
        let text = config.to_toml_string()?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Environment variable names consulted by [`EnvOverrideConfigProvider`],
/// per spec.md §6 "Environment".
pub mod env_keys {
    pub const EMBEDDING_PROVIDER: &str = "EMBEDDING_PROVIDER";
    pub const EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
    pub const BATCH_INTERVAL_MS: &str = "INGESTION_BATCH_INTERVAL_MS";
    pub const MAX_BATCH_SIZE: &str = "INGESTION_MAX_BATCH_SIZE";
    pub const EMBEDDING_CONCURRENCY: &str = "EMBEDDING_CONCURRENCY";
    pub const EMBEDDING_BATCH_SIZE: &str = "EMBEDDING_BATCH_SIZE";
    pub const STUCK_THRESHOLD_MS: &str = "STUCK_THRESHOLD_MS";
}

/// Decorates an inner [`ConfigProvider`], overlaying environment variables
/// on top of the file-backed values. A change in `EMBEDDING_PROVIDER` or
/// `EMBEDDING_MODEL` relative to the file's value is the signal spec.md
/// 4.B uses to invalidate preserved embeddings, so callers should compare
/// `get_config().embedding_provider/model` against what they last persisted
/// rather than assuming the env value is stable across runs.
pub struct EnvOverrideConfigProvider<P: ConfigProvider> {
    inner: P,
    overrides: BTreeMap<String, String>,
}

impl<P: ConfigProvider> EnvOverrideConfigProvider<P> {
    pub fn new(inner: P) -> Self {
        EnvOverrideConfigProvider {
            inner,
            overrides: std::env::vars().collect(),
        }
    }

    /// Test/injection seam: bypasses `std::env` so tests don't mutate
    /// process-global state.
    pub fn with_overrides(inner: P, overrides: BTreeMap<String, String>) -> Self {
        EnvOverrideConfigProvider { inner, overrides }
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(|s| s.as_str())
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get_str(key).and_then(|v| v.parse().ok())
    }
}

impl<P: ConfigProvider> ConfigProvider for EnvOverrideConfigProvider<P> {
    fn get_config(&self) -> Result<IngestConfig, IngestError> {
        let mut config = self.inner.get_config()?;
        if let Some(v) = self.get_str(env_keys::EMBEDDING_PROVIDER) {
            config.embedding_provider = v.to_string();
        }
        if let Some(v) = self.get_str(env_keys::EMBEDDING_MODEL) {
            config.embedding_model = v.to_string();
        }
        if let Some(v) = self.get_parsed(env_keys::BATCH_INTERVAL_MS) {
            config.batch_interval_ms = v;
        }
        if let Some(v) = self.get_parsed(env_keys::MAX_BATCH_SIZE) {
            config.max_batch_size = v;
        }
        if let Some(v) = self.get_parsed(env_keys::EMBEDDING_CONCURRENCY) {
            config.embedding_concurrency = v;
        }
        if let Some(v) = self.get_parsed(env_keys::EMBEDDING_BATCH_SIZE) {
            config.embedding_batch_size = v;
        }
        if let Some(v) = self.get_parsed(env_keys::STUCK_THRESHOLD_MS) {
            config.stuck_threshold_ms = v;
        }
        Ok(config)
    }

    fn set_config(&self, config: &IngestConfig) -> Result<(), IngestError> {
        self.inner.set_config(config)
    }
}

pub fn get_content<P: AsRef<Path>>(path: P) -> Result<String, IngestError> {
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = IngestConfig::default();
        assert_eq!(config.batch_interval_ms, 1000);
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.embedding_concurrency, 5);
        assert_eq!(config.embedding_batch_size, 100);
    }

    #[test]
    fn toml_round_trip_preserves_values() {
        let mut config = IngestConfig::default();
        config.entities = vec!["Function".to_string()];
        config.summarization_llm = Some("gpt".to_string());
        let text = config.to_toml_string().unwrap();
        let parsed = IngestConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let provider = TomlConfigProvider::new("/nonexistent/path/ingest.toml");
        let config = provider.get_config().unwrap();
        assert_eq!(config, IngestConfig::default());
    }

    #[test]
    fn file_round_trips_through_provider() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingest.toml");
        let provider = TomlConfigProvider::new(&path);
        let mut config = IngestConfig::default();
        config.max_batch_size = 42;
        provider.set_config(&config).unwrap();
        assert_eq!(provider.get_config().unwrap(), config);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("ingest.toml"));
        let mut overrides = BTreeMap::new();
        overrides.insert(env_keys::MAX_BATCH_SIZE.to_string(), "7".to_string());
        overrides.insert(env_keys::EMBEDDING_MODEL.to_string(), "gpt-4o".to_string());
        let overridden = EnvOverrideConfigProvider::with_overrides(provider, overrides);
        let config = overridden.get_config().unwrap();
        assert_eq!(config.max_batch_size, 7);
        assert_eq!(config.embedding_model, "gpt-4o");
    }

    #[test]
    fn absent_env_vars_leave_file_values_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(dir.path().join("ingest.toml"));
        let overridden = EnvOverrideConfigProvider::with_overrides(provider, BTreeMap::new());
        let config = overridden.get_config().unwrap();
        assert_eq!(config, IngestConfig::default());
    }
}
