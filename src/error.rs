use thiserror::Error;

use crate::agent::RoleKind;

/// Fatal problems found while turning a scenario into a world.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },
    #[error("expected {expected} {role:?} agent(s), found {found}")]
    AgentCount {
        role: RoleKind,
        expected: String,
        found: usize,
    },
    #[error("terrain spec has {found} rows, grid height is {expected}")]
    TerrainRows { expected: usize, found: usize },
    #[error("terrain row {row} has width {found}, grid width is {expected}")]
    TerrainWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown terrain symbol '{symbol}' at ({x}, {y})")]
    UnknownTerrain { symbol: char, x: usize, y: usize },
    #[error("invalid learning parameters for {agent}: {reason}")]
    InvalidLearning { agent: String, reason: String },
    #[error("agent '{name}': {reason}")]
    InvalidAgent { name: String, reason: String },
    #[error("invalid weather table: {0}")]
    InvalidWeather(String),
}
