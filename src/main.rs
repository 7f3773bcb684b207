use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use badlands::{
    engine::{EngineBuilder, EngineSettings},
    events::TracingSink,
    scenario::ScenarioLoader,
    snapshot::RunReport,
    telemetry,
    web::{self, ServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Badlands turn-based survival simulation")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/badlands.yaml")]
    scenario: PathBuf,

    /// Override the turn limit (uses the scenario's max_turns when omitted)
    #[arg(long)]
    turns: Option<u64>,

    /// Override the scenario seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override snapshot interval in turns
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Write the end-of-run report to this JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Directory to load learned Q-tables from and save them to
    #[arg(long)]
    q_dir: Option<PathBuf>,

    /// Serve the HTTP control surface instead of running to completion
    #[arg(long)]
    serve: bool,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let mut scenario = loader.load(&cli.scenario)?;
    telemetry::init(&scenario.logging.level);

    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }
    let turns = scenario.turns(cli.turns);
    scenario.max_turns = turns;
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        max_turns: turns,
        snapshot_interval_turns: cli
            .snapshot_interval
            .unwrap_or(scenario.snapshot_interval_turns),
        snapshot_dir: cli
            .snapshot_dir
            .unwrap_or_else(|| PathBuf::from("snapshots")),
    };

    if cli.serve {
        let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
        return runtime.block_on(web::run(ServerConfig {
            scenario,
            settings,
            host: cli.host,
            port: cli.port,
        }));
    }

    let mut world = scenario
        .build_world()
        .with_context(|| format!("Invalid scenario {}", cli.scenario.display()))?;
    if let Some(dir) = &cli.q_dir {
        world.load_q_tables(dir);
    }

    let mut engine = EngineBuilder::new(settings)
        .with_turn_pipeline()
        .with_sink(TracingSink)
        .build();

    info!(scenario = %scenario.name, seed = scenario.seed, turns, "starting run");
    let outcome = engine.run(&mut world, turns)?;

    if let Some(dir) = &cli.q_dir {
        world.save_q_tables(dir)?;
    }
    let report = RunReport::from_world(&world, &scenario.name, scenario.seed);
    if let Some(path) = &cli.export {
        report.write(path)?;
    }

    match outcome {
        Some(outcome) => println!(
            "Scenario '{}' ended after {} turns: {:?} ({:?})",
            scenario.name, outcome.turn, outcome.kind, outcome.reason
        ),
        None => println!(
            "Scenario '{}' stopped after {} turns without an outcome",
            scenario.name,
            world.turn()
        ),
    }
    Ok(())
}
