//! insightdb-embed
//!
//! Embedding backends behind `insightdb_core::traits::Embedder`:
//! - `MiniLmEmbedder`: sentence-transformers all-MiniLM-L6-v2 run with candle
//!   (mean pooling + L2 normalization, 384 dims)
//! - `HashEmbedder`: deterministic feature hashing for tests and offline dev
//!
//! `load_embedder` picks one from configuration; `APP_USE_FAKE_EMBEDDINGS=1`
//! forces the hash backend.

use anyhow::{anyhow, ensure, Context, Result};
use std::collections::HashMap;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use twox_hash::XxHash64;

use insightdb_core::config::{expand_path, EmbeddingBackend, EmbeddingSettings};
use insightdb_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;

const DEFAULT_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";

pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    id: String,
}

impl MiniLmEmbedder {
    pub fn new(model_dir: &Path, max_len: usize) -> Result<Self> {
        let device = device::select_device();
        info!(model_dir = %model_dir.display(), "loading MiniLM model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config_raw = std::fs::read(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_slice(&config_raw)?;
        let tokenizer_raw = std::fs::read(&tokenizer_path).with_context(|| format!("reading {}", tokenizer_path.display()))?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let dim = config.hidden_size;
        let id = minilm_id(&config_raw, &tokenizer_raw, dim);
        info!(embedder_id = %id, "MiniLM model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, id })
    }

    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, token_type_ids, attention_mask) =
            tokenize::tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        ensure!(emb.len() == self.dim, "model produced {} dims, expected {}", emb.len(), self.dim);
        if start.elapsed().as_millis() > 100 { debug!(ms = start.elapsed().as_millis() as u64, "slow embedding"); }
        Ok(emb)
    }
}

impl Embedder for MiniLmEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_text(t)).collect()
    }
}

/// Identity of a model build: hash of its config and vocabulary, so renamed
/// copies agree and different models with the same directory name do not.
pub fn minilm_id(config_json: &[u8], tokenizer_json: &[u8], dim: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config_json);
    hasher.update(tokenizer_json);
    format!("minilm:{}:d{}", &hasher.finalize().to_hex().as_str()[..16], dim)
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        return Ok(candle_core::pickle::read_all(&pickle)?.into_iter().collect());
    }
    Err(anyhow!("No model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

/// Feature-hashing embedder: each lower-cased alphanumeric token adds a signed
/// unit to one of `dim` buckets (xxHash64, seed 0); the sum is L2-normalized.
pub struct HashEmbedder {
    dim: usize,
    max_len: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize, max_len: usize) -> Self {
        Self { dim, max_len, id: format!("hash-xxh64:d{}", dim) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).take(self.max_len) {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.to_lowercase().as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += if h >> 63 == 0 { 1.0 } else { -1.0 };
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fake_embeddings_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Build the configured embedder once; callers share it for the process lifetime.
pub fn load_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_forced() || settings.backend == EmbeddingBackend::Hash {
        info!(dim = settings.hash_dim, "using HashEmbedder");
        return Ok(Arc::new(HashEmbedder::new(settings.hash_dim, settings.max_len)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(MiniLmEmbedder::new(&model_dir, settings.max_len)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        warn!(model_dir = %p.display(), "configured model dir does not exist, trying fallbacks");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() { info!(model_dir = %p.display(), "using {}", var); return Ok(p); }
        }
    }
    let default = Path::new(DEFAULT_MODEL_DIR);
    if default.exists() { return Ok(default.to_path_buf()); }
    Err(anyhow!("Could not locate the all-MiniLM-L6-v2 model directory (set embedding.model_dir or APP_MODEL_DIR)"))
}
