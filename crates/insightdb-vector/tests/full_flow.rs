use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use insightdb_core::chunker::{Chunker, ChunkingConfig};
use insightdb_core::corpus::CorpusParser;
use insightdb_core::error::Error;
use insightdb_core::traits::Embedder;
use insightdb_core::types::{Segment, SegmentMetadata};
use insightdb_embed::HashEmbedder;
use insightdb_vector::schema::build_segments_schema;
use insightdb_vector::table::{ensure_table, open_db};
use insightdb_vector::{BuildInfo, Retriever, SnapshotWriter};

const CORPUS: &str = "Placement notes\n\
Heading: Asha Rao: Placed at Google\n\
Online assessment with two graph problems. Then a system design round on URL shorteners.\n\
Heading: Vikram Shah: Placed at OLA\n\
The OLA process had three rounds focused on dynamic programming and logic puzzles.\n\
Heading: Meera Iyer: Placed at Google\n\
Google asked about tries and heaps, plus behavioural questions about teamwork.\n\
Heading: broken heading\n\
Resume tips: keep it to one page and list projects first.\n";

const TIMEOUT: Duration = Duration::from_secs(10);

fn segments_for(corpus: &str) -> (usize, Vec<Segment>) {
    let report = CorpusParser::default().parse(corpus);
    let chunker = Chunker::new(ChunkingConfig { max_chars: 80, overlap_chars: 10, ..ChunkingConfig::default() }).unwrap();
    (report.entries.len(), chunker.chunk_entries(&report.entries))
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(384, 256))
}

async fn build(target: &Path, corpus: &str) -> Vec<Segment> {
    let (entry_count, segments) = segments_for(corpus);
    let info = BuildInfo { entry_count, max_chars: 80, overlap_chars: 10 };
    SnapshotWriter::new(target, "segments")
        .with_batch_size(3)
        .build(&segments, embedder().as_ref(), info)
        .await
        .expect("build snapshot");
    segments
}

#[tokio::test]
async fn reloaded_snapshot_returns_each_segment_for_its_own_text() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    let segments = build(&target, CORPUS).await;
    assert!(segments.len() >= 4);

    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("open");
    assert_eq!(retriever.len(), segments.len());
    assert_eq!(retriever.manifest().entry_count, 4);
    assert!(!retriever.manifest().ann_index);

    for seg in &segments {
        let hits = retriever.retrieve(&seg.text, 1).await.expect("retrieve");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].segment_id, seg.id, "query {:?}", seg.text);
        assert_eq!(hits[0].metadata, seg.metadata);
        assert!(hits[0].distance.abs() < 1e-4);
    }
}

#[tokio::test]
async fn results_are_sorted_bounded_and_deterministic() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    let segments = build(&target, CORPUS).await;
    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("open");

    let top2 = retriever.retrieve("graph problems at Google", 2).await.expect("retrieve");
    assert_eq!(top2.len(), 2);

    let all = retriever.retrieve("graph problems at Google", segments.len() + 10).await.expect("retrieve");
    assert_eq!(all.len(), segments.len(), "k beyond the stored count returns everything");
    for pair in all.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    assert_eq!(&all[..2], &top2[..]);

    let again = retriever.retrieve("graph problems at Google", segments.len() + 10).await.expect("retrieve");
    assert_eq!(all, again);

    assert!(retriever.retrieve("graph problems", 0).await.expect("k = 0").is_empty());
}

#[tokio::test]
async fn destination_filter_keeps_only_that_company() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    build(&target, CORPUS).await;
    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("open");

    let hits = retriever.retrieve_for_destination("interview rounds", 10, "Google").await.expect("retrieve");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.metadata.destination == "Google"));

    let none = retriever.retrieve_for_destination("interview rounds", 10, "O'Reilly").await.expect("quoted name");
    assert!(none.is_empty());
}

#[tokio::test]
async fn snapshot_from_another_embedder_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    build(&target, CORPUS).await;

    let narrow: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64, 256));
    let err = Retriever::open(&target, narrow, TIMEOUT).await.err().expect("mismatch");
    assert!(matches!(err, Error::EmbedderMismatch { .. }), "{err}");
}

#[tokio::test]
async fn missing_snapshot_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let err = Retriever::open(&tmp.path().join("nothing"), embedder(), TIMEOUT).await.err().expect("missing");
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn directory_without_manifest_is_invalid() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("half-built");
    let db = open_db(target.to_str().unwrap()).await.unwrap();
    ensure_table(&db, "segments", build_segments_schema(384)).await.unwrap();

    let err = Retriever::open(&target, embedder(), TIMEOUT).await.err().expect("invalid");
    assert!(matches!(err, Error::InvalidSnapshot { .. }), "{err}");
}

#[tokio::test]
async fn rebuild_replaces_the_previous_snapshot() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    build(&target, CORPUS).await;

    let smaller = "Heading: Kiran Das: Placed at Flipkart\nOne coding round and one HR round.\n";
    let segments = build(&target, smaller).await;
    assert!(!target.with_file_name("insights.partial").exists());

    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("open");
    assert_eq!(retriever.len(), segments.len());
    let hits = retriever.retrieve("graph problems", 10).await.expect("retrieve");
    assert!(hits.iter().all(|h| h.metadata.destination == "Flipkart"));
}

#[tokio::test]
async fn empty_build_fails_and_keeps_the_old_snapshot() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    let segments = build(&target, CORPUS).await;

    let info = BuildInfo { entry_count: 0, max_chars: 80, overlap_chars: 10 };
    let res = SnapshotWriter::new(&target, "segments").build(&[], embedder().as_ref(), info).await;
    assert!(res.is_err());

    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("old snapshot still loads");
    assert_eq!(retriever.len(), segments.len());
}

#[tokio::test]
async fn retriever_is_shareable_across_tasks() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    build(&target, CORPUS).await;
    let retriever = Arc::new(Retriever::open(&target, embedder(), TIMEOUT).await.expect("open"));

    let mut handles = Vec::new();
    for q in ["graph problems", "dynamic programming", "resume tips", "teamwork"] {
        let r = Arc::clone(&retriever);
        handles.push(tokio::spawn(async move { r.retrieve(q, 2).await }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap().expect("retrieve").len(), 2);
    }
}

struct StubEmbedder {
    inner: HashEmbedder,
    delay: Duration,
    fail: bool,
}

impl Embedder for StubEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        std::thread::sleep(self.delay);
        if self.fail {
            anyhow::bail!("model backend unavailable");
        }
        self.inner.embed_batch(texts)
    }
}

fn stub(delay: Duration, fail: bool) -> Arc<dyn Embedder> {
    Arc::new(StubEmbedder { inner: HashEmbedder::new(384, 256), delay, fail })
}

fn synthetic_segments(n: usize) -> Vec<Segment> {
    (0..n)
        .map(|i| {
            let destination = format!("Company{}", i % 7);
            let text = format!("note{i} covers topic{} and round{} at {destination}", i % 37, i % 5);
            Segment {
                id: format!("e{i}:0"),
                metadata: SegmentMetadata {
                    entry_id: format!("e{i}"),
                    name: format!("Person {i}"),
                    destination,
                    malformed: false,
                },
                chunk_index: 0,
                total_chunks: 1,
                span: 0..text.len(),
                text,
            }
        })
        .collect()
}

#[tokio::test]
async fn large_snapshot_trains_ann_and_still_returns_everything_for_big_k() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    let segments = synthetic_segments(1500);
    let info = BuildInfo { entry_count: segments.len(), max_chars: 512, overlap_chars: 50 };
    let manifest = SnapshotWriter::new(&target, "segments")
        .with_ann_min_rows(1000)
        .with_batch_size(256)
        .build(&segments, embedder().as_ref(), info)
        .await
        .expect("build with ANN");
    assert!(manifest.ann_index);

    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("open");
    let all = retriever.retrieve("topic3 round2", 1600).await.expect("retrieve");
    assert_eq!(all.len(), 1500);
    for pair in all.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }

    let top = retriever.retrieve("topic3 round2", 10).await.expect("retrieve");
    assert_eq!(top.len(), 10);

    let filtered = retriever.retrieve_for_destination("topic3", 1600, "Company2").await.expect("retrieve");
    assert_eq!(filtered.len(), segments.iter().filter(|s| s.metadata.destination == "Company2").count());
}

#[tokio::test]
async fn non_snapshot_directory_is_never_overwritten() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("notes");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("precious.txt"), "keep me").unwrap();

    let (entry_count, segments) = segments_for(CORPUS);
    let info = BuildInfo { entry_count, max_chars: 80, overlap_chars: 10 };
    let err = SnapshotWriter::new(&target, "segments").build(&segments, embedder().as_ref(), info).await.unwrap_err();
    assert!(err.to_string().contains("refusing to overwrite"), "{err}");
    assert_eq!(std::fs::read_to_string(target.join("precious.txt")).unwrap(), "keep me");
    assert!(!target.with_file_name("notes.partial").exists());

    let file_target = tmp.path().join("a-file");
    std::fs::write(&file_target, "x").unwrap();
    assert!(SnapshotWriter::new(&file_target, "segments").build(&segments, embedder().as_ref(), info).await.is_err());
    assert!(file_target.is_file());
}

#[tokio::test]
async fn empty_directory_target_is_accepted() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    std::fs::create_dir_all(&target).unwrap();
    let segments = build(&target, CORPUS).await;
    let retriever = Retriever::open(&target, embedder(), TIMEOUT).await.expect("open");
    assert_eq!(retriever.len(), segments.len());
}

#[tokio::test]
async fn slow_query_embedding_times_out() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    build(&target, CORPUS).await;

    let retriever = Retriever::open(&target, stub(Duration::from_millis(300), false), Duration::from_millis(1)).await.expect("open");
    let err = retriever.retrieve("graph problems", 3).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(1)), "{err}");
}

#[tokio::test]
async fn failing_query_embedding_is_an_embedding_error() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("insights");
    build(&target, CORPUS).await;

    let retriever = Retriever::open(&target, stub(Duration::ZERO, true), TIMEOUT).await.expect("open");
    let err = retriever.retrieve("graph problems", 3).await.unwrap_err();
    assert!(matches!(err, Error::Embedding(ref msg) if msg.contains("backend unavailable")), "{err}");
}
