//! turnfx - combat effect resolution driver

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnfx::combat::{DiceRoller, StdRoller};
use turnfx::encounter::{Encounter, SavePolicy, Simulation};
use turnfx::EngineConfig;

/// Turn-based combat effect resolution
#[derive(Parser, Debug)]
#[command(name = "turnfx", version, about = "Resolve combat conditions at turn boundaries")]
struct Args {
    /// Configuration file (defaults to turnfx.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a dice formula
    Roll {
        /// Formula such as "2d6+3"
        formula: String,

        /// Seed for a reproducible roll
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run an encounter file through several rounds of turn changes
    Simulate {
        /// Encounter TOML file
        encounter: PathBuf,

        /// Number of full rounds
        #[arg(short, long, default_value_t = 1)]
        rounds: u32,

        /// How save prompts are answered: fail, succeed or alternate
        #[arg(long, default_value = "fail")]
        saves: SavePolicy,

        /// Print final records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    // Initialize tracing
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_filter.as_str().into()),
    );
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    match args.command {
        Command::Roll { formula, seed } => {
            let roller = StdRoller::new(seed.or(config.seed));
            let roll = roller.evaluate(&formula)?;
            println!("{} = {}", roll.formula, roll.total);
            if !roll.dice.is_empty() {
                let faces: Vec<String> = roll.dice.iter().map(|d| d.to_string()).collect();
                println!("dice: [{}]", faces.join(", "));
            }
        }
        Command::Simulate {
            encounter,
            rounds,
            saves,
            json,
        } => {
            let encounter = Encounter::load(&encounter)?;
            info!(
                "Simulating {} combatant(s) for {} round(s), saves {}",
                encounter.combatants.len(),
                rounds,
                saves
            );

            let sim = Simulation::new(&encounter, config).await?;
            let records = sim.run(rounds, saves).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in records {
                    let r = record.resources;
                    println!(
                        "{:<20} hp {}/{} temp {} (reserved {})",
                        record.name, r.hp_value, r.hp_max, r.hp_temp, r.reserved_temp
                    );
                }
            }
        }
    }

    Ok(())
}
