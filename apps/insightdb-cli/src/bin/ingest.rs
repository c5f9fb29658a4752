use std::path::PathBuf;

use clap::Parser;
use insightdb_core::config::Config;
use insightdb_pipeline::Pipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parse the interview-insight corpus, embed it and publish a snapshot.
#[derive(Parser)]
#[command(name = "insightdb-ingest", version)]
struct Args {
    /// Corpus file (defaults to `corpus.path` from config)
    corpus: Option<PathBuf>,

    /// Snapshot directory (defaults to `index.snapshot_dir`)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let settings = Config::load()?.settings()?;
    let corpus = args.corpus.unwrap_or_else(|| settings.corpus_path());
    let snapshot = args.snapshot.unwrap_or_else(|| settings.snapshot_dir());
    info!(corpus = %corpus.display(), snapshot = %snapshot.display(), "starting ingestion");

    let pipeline = Pipeline::from_settings(settings)?;
    let report = pipeline.ingest(&corpus, &snapshot).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("Ingestion complete");
    println!("  corpus:     {}", report.corpus.display());
    println!("  entries:    {} ({} malformed headings, {} skipped)", report.entries, report.malformed, report.skipped_malformed);
    println!("  segments:   {}", report.segments);
    println!("  embedder:   {}", report.embedder_id);
    println!("  ann index:  {}", if report.ann_index { "ivf_pq" } else { "none (exact search)" });
    println!("  snapshot:   {}", report.snapshot.display());
    Ok(())
}
