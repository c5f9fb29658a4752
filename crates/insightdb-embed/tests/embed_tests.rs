use insightdb_core::config::{EmbeddingBackend, EmbeddingSettings};
use insightdb_embed::{load_embedder, HashEmbedder};
use insightdb_core::traits::Embedder;

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn fake_embedder_shapes_and_determinism() {
    // Force fake embedder to avoid loading the model
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let embedder = load_embedder(&EmbeddingSettings::default()).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384, "default hash dim matches MiniLM");
    assert!(embedder.embedder_id().starts_with("hash-xxh64"));

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_vocabulary_scores_higher() {
    let e = HashEmbedder::new(384, 256);
    let q = e.embed_text("system design round at ola");
    let near = e.embed_text("the system design round was about ride matching at ola");
    let far = e.embed_text("aptitude test with probability puzzles");
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[test]
fn embed_one_matches_batch() {
    let settings = EmbeddingSettings { backend: EmbeddingBackend::Hash, hash_dim: 128, ..EmbeddingSettings::default() };
    let e = load_embedder(&settings).expect("embedder");
    let one = e.embed_one("graphs and trees").expect("one");
    let batch = e.embed_batch(&["graphs and trees".to_string()]).expect("batch");
    assert_eq!(one, batch[0]);
}
