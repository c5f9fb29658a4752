//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_CHUNKING__MAX_CHARS`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::corpus::ParserConfig;
use crate::error::Error;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Reads config files from `INSIGHTDB_CONFIG_DIR`, or the working directory.
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let dir = match env::var("INSIGHTDB_CONFIG_DIR") {
            Ok(dir) => expand_path(dir),
            Err(_) => env::current_dir()?,
        };
        Self::load_from_dir(&dir, &env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        Self::load_from_dir(&env::current_dir()?, env_name)
    }

    /// Relative paths in the loaded settings resolve against `dir`.
    pub fn load_from_dir(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self::from_figment(figment, dir);
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    pub fn base_dir(&self) -> &Path { &self.base_dir }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view over the merged providers, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings.resolved_against(&self.base_dir))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        self.corpus.parser_config().validate()?;
        self.chunking.validate()?;
        if self.embedding.max_len == 0 { return Err(Error::InvalidConfig("embedding.max_len must be > 0".into())); }
        if self.embedding.batch_size == 0 { return Err(Error::InvalidConfig("embedding.batch_size must be > 0".into())); }
        if self.embedding.hash_dim == 0 { return Err(Error::InvalidConfig("embedding.hash_dim must be > 0".into())); }
        if self.index.table.trim().is_empty() { return Err(Error::InvalidConfig("index.table must not be empty".into())); }
        if self.retrieval.timeout_ms == 0 { return Err(Error::InvalidConfig("retrieval.timeout_ms must be > 0".into())); }
        Ok(())
    }

    /// Anchor relative corpus, snapshot and model paths at `base`.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        self.corpus.path = resolve_with_base(base, &self.corpus.path).display().to_string();
        self.index.snapshot_dir = resolve_with_base(base, &self.index.snapshot_dir).display().to_string();
        if let Some(dir) = self.embedding.model_dir.take() {
            self.embedding.model_dir = Some(resolve_with_base(base, dir).display().to_string());
        }
        self
    }

    pub fn corpus_path(&self) -> PathBuf { expand_path(&self.corpus.path) }

    pub fn snapshot_dir(&self) -> PathBuf { expand_path(&self.index.snapshot_dir) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub path: String,
    pub delimiter: String,
    pub separator: String,
    pub marker: String,
    pub sentinel: String,
    /// Drop entries whose heading could not be parsed instead of indexing
    /// them under the sentinel.
    pub skip_malformed: bool,
}

impl CorpusSettings {
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            delimiter: self.delimiter.clone(),
            separator: self.separator.clone(),
            marker: self.marker.clone(),
            sentinel: self.sentinel.clone(),
        }
    }
}

impl Default for CorpusSettings {
    fn default() -> Self {
        let parser = ParserConfig::default();
        Self {
            path: "insight_text.txt".to_string(),
            delimiter: parser.delimiter,
            separator: parser.separator,
            marker: parser.marker,
            sentinel: parser.sentinel,
            skip_malformed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// sentence-transformers all-MiniLM-L6-v2 through candle.
    Minilm,
    /// Deterministic feature hashing; no model files needed.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Directory holding `config.json`, `tokenizer.json` and the weights.
    /// Falls back to `APP_MODEL_DIR`, `MODEL_DIR` and `models/all-MiniLM-L6-v2`.
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub hash_dim: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Minilm, model_dir: None, max_len: 256, hash_dim: 384, batch_size: 32 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub snapshot_dir: String,
    pub table: String,
    /// Train an IVF-PQ index once the snapshot holds at least this many
    /// segments; smaller snapshots are searched exhaustively.
    pub ann_min_rows: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { snapshot_dir: "indexes/insights".to_string(), table: "segments".to_string(), ann_min_rows: 5000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_k: usize,
    pub timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { default_k: 5, timeout_ms: 10_000 } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
