use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rescue_grid::{
    config::{ConfigLoader, SimConfig},
    engine::EngineBuilder,
    web::{self, WebServerConfig},
    world::Phase,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Disaster-response coordination engine")]
struct Cli {
    /// Path to a simulation config YAML file (built-in Karachi preset when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the random seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trigger one disaster and run cycles headless
    Run {
        #[arg(long, default_value = "earthquake")]
        scenario: String,

        #[arg(long, default_value_t = 0.8)]
        intensity: f64,

        /// Upper bound on cycles
        #[arg(long, default_value_t = 200)]
        cycles: u64,

        /// Keep cycling after the first recovery instead of stopping
        #[arg(long)]
        keep_going: bool,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the HTTP boundary
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Run a cycle every N milliseconds while a disaster is active
        #[arg(long)]
        autoplay_ms: Option<u64>,
    },
}

fn load_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let base = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .with_context(|| format!("{} is not a file", path.display()))?;
            ConfigLoader::new(base).load(file)?
        }
        None => SimConfig::karachi(),
    };
    if let Some(seed) = cli.seed {
        config.random_seed = seed;
    }
    Ok(config)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging.level);

    match cli.command {
        Command::Run {
            scenario,
            intensity,
            cycles,
            keep_going,
            json,
        } => {
            let engine = EngineBuilder::new(config.clone()).build()?;
            engine.trigger_disaster(&scenario, intensity, None)?;

            let mut ran = 0;
            for _ in 0..cycles {
                let result = engine.run_cycle()?;
                ran = result.cycle;
                if let Some(transition) = result.transition {
                    info!(
                        cycle = result.cycle,
                        from = %transition.from,
                        to = %transition.to,
                        "phase change"
                    );
                }
                if !keep_going && result.world.phase == Phase::Recovered {
                    break;
                }
            }

            let snapshot = engine.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!(
                    "Scenario '{}' ({} at {}) ran {} cycles. Phase: {}, saved: {}, remaining: {}, disasters completed: {}",
                    config.name,
                    scenario,
                    intensity,
                    ran,
                    snapshot.phase,
                    snapshot.stats.total_victims_saved,
                    snapshot.victims,
                    snapshot.stats.disasters_completed
                );
                if let Some(average) = engine.average_cycle_time() {
                    println!("Average cycle time: {average:?}");
                }
            }
        }
        Command::Serve {
            host,
            port,
            autoplay_ms,
        } => {
            let engine = EngineBuilder::new(config.clone()).build()?;
            web::run(WebServerConfig {
                engine,
                host: host.unwrap_or(config.server.host),
                port: port.unwrap_or(config.server.port),
                autoplay: autoplay_ms
                    .or(config.server.autoplay_ms)
                    .map(Duration::from_millis),
            })
            .await?;
        }
    }
    Ok(())
}
