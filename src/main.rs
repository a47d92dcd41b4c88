use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use ctxgraph::graph::{GraphStore, InMemoryGraphStore, SqliteGraphStore};
use ctxgraph::responder::INSUFFICIENT_INFORMATION;
use ctxgraph::{oracle, sample, Config, MacerReasoner, ReasoningOutcome};

#[derive(Parser, Debug)]
#[command(name = "ctxgraph")]
#[command(about = "Answer a question by multi-hop reasoning over a context graph")]
struct Args {
    /// Natural-language question
    #[arg(short, long)]
    query: String,

    /// Load the Einstein / Nobel Prize sample graph first
    #[arg(long)]
    ingest_sample: bool,

    /// Override reasoning.max_iterations
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Override reasoning.beam_width
    #[arg(long)]
    beam_width: Option<usize>,

    /// Use the configured judgment oracle for ranking, sufficiency and synthesis
    #[arg(long)]
    use_oracle: bool,

    /// Print the whole outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load_or_default()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.ctxgraph.log_level.as_str()),
    )
    .init();

    log::info!("Starting ctxgraph v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn GraphStore> = match config.db_path() {
        Some(path) => {
            log::info!("Graph store: {}", path.display());
            Arc::new(
                SqliteGraphStore::open(path)
                    .await
                    .with_context(|| format!("Failed to open graph store {}", path.display()))?,
            )
        }
        None => {
            log::info!("Graph store: in-memory");
            Arc::new(InMemoryGraphStore::new())
        }
    };

    if args.ingest_sample {
        sample::load_sample(store.as_ref())
            .await
            .context("Failed to load sample graph")?;
    }

    let mut reasoning = config.reasoning_config();
    if let Some(max_iterations) = args.max_iterations {
        reasoning.max_iterations = max_iterations;
    }
    if let Some(beam_width) = args.beam_width {
        reasoning.beam_width = beam_width;
    }
    reasoning.use_oracle |= args.use_oracle;

    let mut reasoner = MacerReasoner::new(store);
    if reasoning.use_oracle {
        let judge = oracle::from_config(&config.oracle, reasoning.sufficiency_min_facts)
            .context("Failed to set up judgment oracle")?;
        log::info!("Judgment oracle: {}", judge.name());
        reasoner = reasoner.with_oracle(judge);
    }

    let outcome = reasoner.reason(&args.query, &reasoning).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

fn print_outcome(outcome: &ReasoningOutcome) {
    println!("Query: {}", outcome.query);
    println!(
        "Answer: {}",
        outcome.answer.as_deref().unwrap_or(INSUFFICIENT_INFORMATION)
    );
    println!(
        "State: {} after {} iteration(s){}",
        outcome.final_state.as_str(),
        outcome.iterations_used,
        if outcome.cancelled { " (stopped early)" } else { "" }
    );

    if !outcome.gathered_context.is_empty() {
        println!("\nGathered context:");
    }
    for record in &outcome.gathered_context {
        let temporal = record
            .fact
            .context
            .temporal
            .as_ref()
            .map(|t| serde_json::Value::Object(t.clone()).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [hop {}] {} -[{}]-> {} (score {:.2}, temporal {})",
            record.hop, record.head_label, record.fact.relation, record.tail.label, record.score, temporal
        );
        for chunk in &record.supporting_chunks {
            println!("      evidence {}: {}", chunk.id, chunk.excerpt(120));
        }
    }

    for (i, query) in outcome.evolution_queries.iter().enumerate() {
        println!("Evolution {}: {}", i + 1, query);
    }
}
