pub mod agent;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod events;
pub mod grid;
pub mod honour;
pub mod items;
pub mod resolver;
pub mod rng;
pub mod scenario;
pub mod snapshot;
pub mod strategy;
pub mod systems;
pub mod telemetry;
pub mod weather;
pub mod web;
pub mod world;

pub use engine::{Engine, EngineBuilder, EngineSettings, TurnSummary};
pub use scenario::Scenario;
pub use world::World;
