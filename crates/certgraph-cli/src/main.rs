//! Certgraph CLI - adaptive certification knowledge graph

use std::path::{Path, PathBuf};
use std::sync::Arc;

use certgraph_core::config::Config;
use certgraph_core::domain::knowledge::{CognitiveLevel, LearnerProfile};
use certgraph_core::persistence::{GraphSeed, SqliteGraphStore};
use certgraph_core::{KnowledgeGraph, PathRequest};
use clap::{ArgGroup, Parser, Subcommand};
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "certgraph")]
#[command(author, version, about = "Adaptive certification knowledge graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Database file (defaults to persistence.database_path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON seed of concepts and relationships
    Load {
        /// Seed file
        seed: PathBuf,
    },

    /// Find the best learning path to a target concept
    Path {
        /// Target concept ID
        #[arg(short, long)]
        target: String,
        /// Concepts already learned (repeatable)
        #[arg(short, long = "start")]
        start: Vec<String>,
        /// Cognitive level the learner is working towards
        #[arg(long)]
        level: Option<String>,
    },

    /// Suggest what to learn next
    Recommend {
        /// Learned concept IDs, comma separated
        #[arg(long, value_delimiter = ',')]
        learned: Vec<String>,
        /// Number of suggestions
        #[arg(short, default_value_t = 5)]
        n: usize,
    },

    /// List transitive prerequisites in learnable order
    Prereqs {
        /// Concept ID
        id: String,
    },

    /// List concepts near a concept
    Related {
        /// Concept ID
        id: String,
        #[arg(long, default_value_t = 2)]
        distance: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Record a learner outcome
    #[command(group(ArgGroup::new("result").required(true).args(["success", "failure"])))]
    Outcome {
        /// Concept ID
        id: String,
        #[arg(long)]
        success: bool,
        #[arg(long)]
        failure: bool,
        /// Minutes the learner spent
        #[arg(long)]
        minutes: f64,
        /// Learner ID recorded with any pattern this outcome triggers
        #[arg(long)]
        learner: Option<String>,
    },

    /// Show graph statistics
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let format = cli.format;
    match cli.command {
        Commands::Config { action } => cmd_config(action),
        command => {
            let config = Config::load()?;
            let database = cli
                .database
                .unwrap_or_else(|| config.persistence.database_path.clone());
            let graph = open_graph(config, &database).await?;

            let result = run(&graph, command, format).await;
            graph.shutdown().await?;
            result
        }
    }
}

async fn open_graph(config: Config, database: &Path) -> anyhow::Result<KnowledgeGraph> {
    debug!(path = %database.display(), "Opening graph database");
    let graph = match SqliteGraphStore::connect(database).await {
        Ok(store) => KnowledgeGraph::open(config, Arc::new(store)).await?,
        Err(e) => {
            warn!(
                path = %database.display(),
                error = %e,
                "Failed to open database, starting in degraded mode"
            );
            KnowledgeGraph::degraded(config).await?
        }
    };
    Ok(graph)
}

async fn run(graph: &KnowledgeGraph, command: Commands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Load { seed } => cmd_load(graph, &seed, format).await,
        Commands::Path {
            target,
            start,
            level,
        } => cmd_path(graph, target, start, level.as_deref(), format).await,
        Commands::Recommend { learned, n } => cmd_recommend(graph, &learned, n, format).await,
        Commands::Prereqs { id } => {
            let prereqs = graph.get_prerequisites(&id).await;
            print_list(&prereqs, format)
        }
        Commands::Related {
            id,
            distance,
            limit,
        } => {
            let related = graph.get_related_concepts(&id, distance, limit).await;
            print_list(&related, format)
        }
        // clap guarantees exactly one of --success / --failure
        Commands::Outcome {
            id,
            success,
            minutes,
            learner,
            ..
        } => cmd_outcome(graph, &id, success, minutes, learner, format).await,
        Commands::Stats => cmd_stats(graph, format).await,
        Commands::Config { action } => cmd_config(action),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_load(graph: &KnowledgeGraph, path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let seed = GraphSeed::load(path)?;
    let report = graph.load_seed(&seed).await;
    graph.flush().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "Loaded {}: {} created, {} unchanged, {} updated, {} rejected",
                path.display(),
                report.created,
                report.unchanged,
                report.updated,
                report.rejected.len()
            );
            for (record, reason) in &report.rejected {
                println!("  [!!] {}: {}", record, reason);
            }
        }
    }

    let dead = graph.dead_letters().len();
    if dead > 0 {
        warn!(dead_letters = dead, "Some mutations were not persisted");
    }
    Ok(())
}

async fn cmd_path(
    graph: &KnowledgeGraph,
    target: String,
    start: Vec<String>,
    level: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut request = PathRequest::new(target).from_start(start);
    if let Some(level) = level {
        let level = CognitiveLevel::parse(level)
            .ok_or_else(|| anyhow::anyhow!("Unknown cognitive level: {}", level))?;
        request = request.with_profile(LearnerProfile::new().targeting(level));
    }

    let path = graph.get_learning_path(&request).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&path)?),
        OutputFormat::Text => {
            if !path.is_found() {
                println!("No learnable path to '{}'", request.target);
                return Ok(());
            }
            println!("{}", path.concept_ids.join(" -> "));
            println!(
                "  Score: {:.3}{}",
                path.score,
                if path.used_fallback { " (prerequisite order)" } else { "" }
            );
        }
    }
    Ok(())
}

async fn cmd_recommend(
    graph: &KnowledgeGraph,
    learned: &[String],
    n: usize,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let recommendations = graph.get_recommendations(learned, n).await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&recommendations)?),
        OutputFormat::Text => {
            if recommendations.is_empty() {
                println!("(No recommendations)");
            }
            for (rank, rec) in recommendations.iter().enumerate() {
                println!("{:>2}. {} ({:.3})", rank + 1, rec.concept_id, rec.score);
            }
        }
    }
    Ok(())
}

async fn cmd_outcome(
    graph: &KnowledgeGraph,
    id: &str,
    success: bool,
    minutes: f64,
    learner: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let profile = learner.map(|l| LearnerProfile::new().with_learner_id(l));
    let summary = graph.record_outcome(id, success, minutes, profile).await?;
    graph.flush().await;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "concept_id": id,
                "sample": summary.sample,
                "previous_score": summary.previous_score,
                "effectiveness_score": summary.effectiveness_score,
                "samples": summary.samples,
                "usage_count": summary.usage_count,
            }))?
        ),
        OutputFormat::Text => println!(
            "{}: effectiveness {:.3} -> {:.3} ({} samples)",
            id, summary.previous_score, summary.effectiveness_score, summary.samples
        ),
    }
    Ok(())
}

async fn cmd_stats(graph: &KnowledgeGraph, format: OutputFormat) -> anyhow::Result<()> {
    let stats = graph.stats().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Knowledge Graph:");
            println!("  Concepts: {}", stats.concepts);
            for (kind, count) in &stats.concepts_by_type {
                println!("    {}: {}", kind, count);
            }
            println!("  Relationships: {}", stats.relationships);
            for (kind, count) in &stats.relationships_by_type {
                println!("    {}: {}", kind, count);
            }
            println!("  Patterns: {}", stats.patterns);
            println!("  Average effectiveness: {:.3}", stats.average_effectiveness);
            println!("  Outcomes recorded: {}", stats.total_outcomes);
            println!("  Storage: {}", stats.storage_mode);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn print_list(items: &[String], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("(none)");
            }
            for item in items {
                println!("{}", item);
            }
        }
    }
    Ok(())
}
