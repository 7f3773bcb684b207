use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    agent::{AgentState, Role, RoleKind},
    error::ConfigError,
    events::EventKind,
    grid::{parse_rows, Dims, Grid, Hazard, TerrainProvider, WeightedTerrain},
    honour::HonourRules,
    items::{random_item, Item},
    rng::RngManager,
    strategy::{BucketConfig, LearningParams, Strategy},
    weather::WeatherTable,
    world::World,
};

fn default_max_turns() -> u64 {
    200
}

fn default_width() -> i32 {
    40
}

fn default_height() -> i32 {
    30
}

fn default_coordination() -> bool {
    true
}

fn default_aggression() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSpec {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    /// Symbol rows, top to bottom. Generated from the seed when absent.
    #[serde(default)]
    pub terrain: Option<Vec<String>>,
    #[serde(default)]
    pub hazards: Vec<HazardSpec>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            terrain: None,
            hazards: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HazardSpec {
    pub x: i32,
    pub y: i32,
    pub damage: i32,
}

/// Per-learner parameters. A missing section falls back to the role
/// defaults; a present one must be complete.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LearningSpec {
    #[serde(default = "LearningParams::protagonist")]
    pub protagonist: LearningParams,
    #[serde(default = "LearningParams::synthetic")]
    pub synthetic: LearningParams,
}

impl Default for LearningSpec {
    fn default() -> Self {
        Self {
            protagonist: LearningParams::protagonist(),
            synthetic: LearningParams::synthetic(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSpec {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSpec {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub role: RoleKind,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub health: Option<i32>,
    #[serde(default)]
    pub stamina: Option<i32>,
    /// Overrides the role's maximum health.
    #[serde(default)]
    pub max_health: Option<i32>,
    #[serde(default)]
    pub max_stamina: Option<i32>,
    /// Wildlife only.
    #[serde(default = "default_aggression")]
    pub aggression: f64,
}

impl AgentSpec {
    /// Starting values must describe a living agent inside its own limits.
    fn validate(&self) -> Result<(), ConfigError> {
        let template = self.role.template();
        let max_health = self.max_health.unwrap_or(template.max_health);
        let max_stamina = self.max_stamina.unwrap_or(template.max_stamina);
        let reason = if max_health <= 0 {
            Some(format!("max_health must be positive, got {max_health}"))
        } else if max_stamina < 0 {
            Some(format!("max_stamina must not be negative, got {max_stamina}"))
        } else {
            match (self.health, self.stamina) {
                (Some(health), _) if health <= 0 || health > max_health => {
                    Some(format!("health must be within 1..={max_health}, got {health}"))
                }
                (_, Some(stamina)) if stamina < 0 || stamina > max_stamina => {
                    Some(format!("stamina must be within 0..={max_stamina}, got {stamina}"))
                }
                _ => None,
            }
        };
        match reason {
            Some(reason) => Err(ConfigError::InvalidAgent {
                name: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpec {
    pub x: i32,
    pub y: i32,
    pub item: Item,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,
    #[serde(default)]
    pub snapshot_interval_turns: u64,
    #[serde(default)]
    pub grid: GridSpec,
    #[serde(default)]
    pub weather: WeatherTable,
    #[serde(default)]
    pub learning: LearningSpec,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub honour: HonourRules,
    #[serde(default = "default_coordination")]
    pub coordination: bool,
    #[serde(default)]
    pub expected_wildlife: Option<usize>,
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub random_items: usize,
    #[serde(default)]
    pub logging: LoggingSpec,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn turns(&self, override_turns: Option<u64>) -> u64 {
        override_turns.unwrap_or(self.max_turns)
    }

    fn count(&self, role: RoleKind) -> usize {
        self.agents.iter().filter(|a| a.role == role).count()
    }

    /// Checks everything that can be checked without building the grid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Dims::new(self.grid.width, self.grid.height)?;
        let protagonists = self.count(RoleKind::Protagonist);
        if protagonists != 1 {
            return Err(ConfigError::AgentCount {
                role: RoleKind::Protagonist,
                expected: "exactly 1".to_string(),
                found: protagonists,
            });
        }
        for role in [RoleKind::Synthetic, RoleKind::Elder, RoleKind::Rival, RoleKind::Boss] {
            let found = self.count(role);
            if found > 1 {
                return Err(ConfigError::AgentCount {
                    role,
                    expected: "at most 1".to_string(),
                    found,
                });
            }
        }
        if let Some(expected) = self.expected_wildlife {
            let found = self.count(RoleKind::Wildlife);
            if found != expected {
                return Err(ConfigError::AgentCount {
                    role: RoleKind::Wildlife,
                    expected: expected.to_string(),
                    found,
                });
            }
        }
        for agent in &self.agents {
            agent.validate()?;
        }
        self.weather.validate()?;
        self.learning.protagonist.validate("protagonist")?;
        self.learning.synthetic.validate("synthetic")?;
        Ok(())
    }

    fn build_grid(&self) -> Result<Grid, ConfigError> {
        let dims = Dims::new(self.grid.width, self.grid.height)?;
        let specs = match &self.grid.terrain {
            Some(rows) => parse_rows(rows, dims)?,
            None => WeightedTerrain::default().generate(dims.width(), dims.height(), self.seed),
        };
        let mut grid = Grid::from_specs(dims, specs)?;
        for hazard in &self.grid.hazards {
            grid.apply_hazard(
                dims.wrap(hazard.x, hazard.y),
                Some(Hazard {
                    damage: hazard.damage.max(0),
                }),
            );
        }
        Ok(grid)
    }

    /// Turns the scenario into a world ready for turn 1.
    pub fn build_world(&self) -> Result<World, ConfigError> {
        self.validate()?;
        let grid = self.build_grid()?;
        let dims = grid.dims();
        let paired = self.coordination && self.count(RoleKind::Synthetic) == 1;

        let mut world = World::new(grid)
            .with_weather_table(self.weather)
            .with_honour_rules(self.honour)
            .with_coordination(paired);

        for spec in &self.agents {
            let pos = dims.wrap(spec.x, spec.y);
            let role = match spec.role {
                RoleKind::Protagonist => Role::protagonist(),
                RoleKind::Synthetic => Role::synthetic(),
                RoleKind::Elder => Role::elder(pos),
                RoleKind::Rival => Role::rival(),
                RoleKind::Wildlife => Role::wildlife(pos, spec.aggression),
                RoleKind::Boss => Role::boss(pos),
            };
            let params = match spec.role {
                RoleKind::Synthetic => self.learning.synthetic,
                _ => self.learning.protagonist,
            };
            let strategy = Strategy::for_role(&role, params, self.buckets, paired);
            let mut state = AgentState::new(spec.name.clone(), pos, role);
            if let Some(max_health) = spec.max_health {
                state = state.with_max_health(max_health);
            }
            if let Some(max_stamina) = spec.max_stamina {
                state = state.with_max_stamina(max_stamina);
            }
            if let Some(stamina) = spec.stamina {
                state = state.with_stamina(stamina);
            }
            if let Some(health) = spec.health {
                state = state.with_health(health);
            }
            world.spawn(state, strategy);
        }

        for spec in &self.items {
            let pos = dims.wrap(spec.x, spec.y);
            if !world.grid_mut().place_item(pos, spec.item) {
                warn!(x = pos.x, y = pos.y, "cell already holds an item, skipping");
            }
        }
        self.scatter_items(&mut world);

        world.emit(
            EventKind::System,
            format!("Scenario '{}' begins on a {}x{} grid", self.name, dims.width(), dims.height()),
        );
        Ok(world)
    }

    fn scatter_items(&self, world: &mut World) {
        if self.random_items == 0 {
            return;
        }
        let mut rng_manager = RngManager::new(self.seed);
        let mut rng = rng_manager.stream("items");
        let area = world.grid().dims().area();
        let mut placed = 0;
        let mut attempts = 0;
        while placed < self.random_items && attempts < area * 4 {
            attempts += 1;
            let pos = world.grid().random_cell(&mut rng);
            let item = random_item(&mut rng);
            if world.grid_mut().place_item(pos, item) {
                placed += 1;
            }
        }
        if placed < self.random_items {
            warn!(placed, requested = self.random_items, "grid too crowded for all random items");
        }
    }
}
