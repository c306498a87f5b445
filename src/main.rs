use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use recovery_orchestrator::{
    config::{Config, LogFormat},
    invoker::HttpModelInvoker,
    service::OrchestrationService,
    types::{TaskPriority, TaskRequest, TaskType},
};

#[derive(Parser)]
#[command(name = "recovery-orchestrator", version, about = "AI orchestration engine for disaster-recovery analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one analysis task through the orchestration engine
    Analyze {
        /// Free-text description of the task
        description: String,

        /// Task category
        #[arg(long, value_parser = parse_task_type, default_value = "general")]
        task_type: TaskType,

        /// Task priority
        #[arg(long, value_parser = parse_priority, default_value = "medium")]
        priority: TaskPriority,

        /// Required accuracy (0.0-1.0)
        #[arg(long, default_value_t = 0.8)]
        accuracy: f64,

        /// Location hint used for cache matching
        #[arg(long)]
        location: Option<String>,

        /// Comma-separated damage kinds (e.g. "water,mould")
        #[arg(long)]
        damage_kinds: Option<String>,

        /// Season hint used for cache matching
        #[arg(long)]
        season: Option<String>,

        /// Emit the full outcome as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Print service configuration and health as JSON
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Recovery orchestrator starting"
    );

    let invoker = Arc::new(HttpModelInvoker::new(&config.providers)?);
    let service = Arc::new(OrchestrationService::new(config, invoker));
    service.start_maintenance();

    match cli.command {
        Command::Analyze {
            description,
            task_type,
            priority,
            accuracy,
            location,
            damage_kinds,
            season,
            json,
        } => {
            let mut request = TaskRequest::new(task_type, description)
                .with_priority(priority)
                .with_required_accuracy(accuracy);
            if let Some(location) = location {
                request = request.with_metadata("location", location);
            }
            if let Some(kinds) = damage_kinds {
                request = request.with_metadata("damage_kinds", kinds);
            }
            if let Some(season) = season {
                request = request.with_metadata("season", season);
            }

            let outcome = service.orchestrate(request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.result);
                eprintln!(
                    "approach={} provider={} confidence={:.2} fallback_level={} \
                     duration_ms={} cost=${:.2}{}",
                    outcome.approach,
                    outcome
                        .provider
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "none".to_string()),
                    outcome.confidence,
                    outcome.fallback_level,
                    outcome.duration_ms,
                    outcome.estimated_cost,
                    if outcome.cache_hit { " (cached)" } else { "" },
                );
                for warning in &outcome.warnings {
                    eprintln!("warning: {}", warning);
                }
            }
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&service.status())?);
        }
    }

    service.shutdown();
    Ok(())
}

fn parse_task_type(s: &str) -> Result<TaskType, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown task type: {}", s))
}

fn parse_priority(s: &str) -> Result<TaskPriority, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown priority: {}", s))
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
