use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    events::{EventSink, SimEvent},
    rng::{RngManager, SystemRng},
    snapshot::SnapshotWriter,
    systems::{
        ActionSystem, CoordinationSystem, HazardSystem, LearningSystem, TrialSystem, WeatherSystem,
    },
    world::{Outcome, TurnSnapshot, World},
};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scenario_name: String,
    pub seed: u64,
    /// Turn limit for the timeout outcome; 0 disables it.
    pub max_turns: u64,
    pub snapshot_interval_turns: u64,
    pub snapshot_dir: PathBuf,
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
            sinks: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    /// The standard turn: weather, coordination, actions, hazards, trials,
    /// learning.
    pub fn with_turn_pipeline(self) -> Self {
        self.with_system(WeatherSystem::new())
            .with_system(CoordinationSystem::new())
            .with_system(ActionSystem::new())
            .with_system(HazardSystem::new())
            .with_system(TrialSystem::new())
            .with_system(LearningSystem::new())
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            rng: RngManager::new(self.settings.seed),
            systems: self.systems,
            sinks: self.sinks,
            snapshot_writer: SnapshotWriter::new(
                &self.settings.snapshot_dir,
                self.settings.snapshot_interval_turns,
            ),
            settings: self.settings,
        }
    }
}

/// What one call to [`Engine::advance_turn`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct TurnSummary {
    pub turn: u64,
    pub events: Vec<SimEvent>,
    pub outcome: Option<Outcome>,
    pub snapshot_path: Option<PathBuf>,
}

pub struct Engine {
    rng: RngManager,
    systems: Vec<Box<dyn System>>,
    sinks: Vec<Box<dyn EventSink>>,
    snapshot_writer: SnapshotWriter,
    settings: EngineSettings,
}

impl Engine {
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn snapshot_writer(&self) -> &SnapshotWriter {
        &self.snapshot_writer
    }

    /// Resolves one full turn. A world that already has an outcome is left
    /// untouched and the summary repeats that outcome.
    pub fn advance_turn(&mut self, world: &mut World) -> Result<TurnSummary> {
        if let Some(outcome) = world.outcome() {
            return Ok(TurnSummary {
                turn: world.turn(),
                events: Vec::new(),
                outcome: Some(outcome),
                snapshot_path: None,
            });
        }

        let mark = world.events().len();
        world.begin_turn();
        let turn = world.clock();
        for system in &mut self.systems {
            let mut rng_stream = self.rng.stream(system.name());
            let ctx = SystemContext {
                turn,
                scenario_name: &self.settings.scenario_name,
            };
            system.run(&ctx, world, &mut rng_stream)?;
            debug!(turn, system = system.name(), "system finished");
        }
        world.finish_turn();

        let outcome = world.evaluate_outcome(self.settings.max_turns);
        if let Some(outcome) = outcome {
            info!(turn, kind = ?outcome.kind, reason = ?outcome.reason, "simulation finished");
        }
        let snapshot_path = self
            .snapshot_writer
            .maybe_write(world, &self.settings.scenario_name)?;

        let events = world.events().since(mark).to_vec();
        for sink in &mut self.sinks {
            for event in &events {
                sink.accept(event);
            }
        }
        debug!(turn, events = events.len(), "turn resolved");

        Ok(TurnSummary {
            turn,
            events,
            outcome,
            snapshot_path,
        })
    }

    /// Advances up to `turns` turns, stopping early at a terminal outcome.
    pub fn run(&mut self, world: &mut World, turns: u64) -> Result<Option<Outcome>> {
        self.run_with_hook(world, turns, |_| {})
    }

    pub fn run_with_hook<F>(&mut self, world: &mut World, turns: u64, mut hook: F) -> Result<Option<Outcome>>
    where
        F: FnMut(TurnSnapshot),
    {
        for _ in 0..turns {
            let summary = self.advance_turn(world)?;
            hook(world.snapshot(&self.settings.scenario_name));
            if summary.outcome.is_some() {
                break;
            }
        }
        Ok(world.outcome())
    }

    /// Puts the engine back to its freshly built state. The caller rebuilds
    /// the world from its scenario.
    pub fn reset(&mut self) {
        self.rng.reseed(self.settings.seed);
        self.snapshot_writer.reset();
        for sink in &mut self.sinks {
            sink.reset();
        }
        info!(seed = self.settings.seed, "engine reset");
    }
}

pub struct SystemContext<'a> {
    pub turn: u64,
    pub scenario_name: &'a str,
}

pub trait System: Send {
    fn name(&self) -> &str;
    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}
