use std::path::PathBuf;

use clap::Parser;
use insightdb_core::config::Config;
use insightdb_core::query::{compose_queries, QueryKind};
use insightdb_pipeline::Pipeline;
use tracing_subscriber::EnvFilter;

/// Retrieve interview-insight passages for a company or a free-form question.
#[derive(Parser)]
#[command(name = "insightdb-query", version)]
struct Args {
    /// Free-form question, used when no --kind is given
    question: Option<String>,

    /// Company the questions are about
    #[arg(long, short)]
    company: String,

    /// Canned question type (sample-interview-questions, interview-process, resources, advice); repeatable
    #[arg(long = "kind", short = 't')]
    kinds: Vec<QueryKind>,

    /// Passages per query (defaults to `retrieval.default_k`)
    #[arg(long, short)]
    k: Option<usize>,

    /// Only return passages from entries placed at this destination
    #[arg(long, short)]
    destination: Option<String>,

    /// Snapshot directory (defaults to `index.snapshot_dir`)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let settings = Config::load()?.settings()?;
    let queries = compose_queries(&args.company, &args.kinds, args.question.as_deref())?;
    let k = args.k.unwrap_or(settings.retrieval.default_k);
    let snapshot = args.snapshot.unwrap_or_else(|| settings.snapshot_dir());

    let pipeline = Pipeline::from_settings(settings)?;
    let retriever = pipeline.open_retriever(&snapshot).await?;
    let answers = pipeline.answer_all(&retriever, &queries, k, args.destination.as_deref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answers)?);
        return Ok(());
    }
    for answer in &answers {
        println!("\n{}", answer.query);
        if answer.segments.is_empty() {
            println!("  (no matching passages)");
        }
        for (i, seg) in answer.segments.iter().enumerate() {
            println!(
                "  {}. distance={:.4}  {} -> {}{}  [{}]",
                i + 1,
                seg.distance,
                seg.metadata.name,
                seg.metadata.destination,
                if seg.metadata.malformed { " (malformed heading)" } else { "" },
                seg.segment_id
            );
            println!("     {}", seg.text.replace('\n', "\n     "));
        }
    }
    Ok(())
}
