use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    events::SimEvent,
    world::{Outcome, World},
};

/// Writes `<dir>/<scenario>/turn_NNNNNN.json` every `interval` turns.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval: u64,
    written: Vec<PathBuf>,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval,
            written: Vec::new(),
        }
    }

    pub fn maybe_write(&mut self, world: &World, scenario_name: &str) -> Result<Option<PathBuf>> {
        let turn = world.turn();
        if self.interval == 0 || turn == 0 || turn % self.interval != 0 {
            return Ok(None);
        }
        let path = self.write(world, scenario_name)?;
        Ok(Some(path))
    }

    pub fn write(&mut self, world: &World, scenario_name: &str) -> Result<PathBuf> {
        let dir = self.dir.join(scenario_name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;
        let path = dir.join(format!("turn_{:06}.json", world.turn()));
        let json = serde_json::to_string_pretty(&world.snapshot(scenario_name))?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        info!(turn = world.turn(), path = %path.display(), "snapshot written");
        self.written.push(path.clone());
        Ok(path)
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn reset(&mut self) {
        self.written.clear();
    }
}

/// End-of-run export consumed by external metrics tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub seed: u64,
    pub outcome: Option<Outcome>,
    pub turns: u64,
    pub generated_at: DateTime<Utc>,
    pub events: Vec<SimEvent>,
}

impl RunReport {
    pub fn from_world(world: &World, scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            outcome: world.outcome(),
            turns: world.turn(),
            generated_at: Utc::now(),
            events: world.events().all().to_vec(),
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create export directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), events = self.events.len(), "run report exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Dims, Grid, Terrain};
    use tempfile::tempdir;

    #[test]
    fn writes_only_on_the_interval() {
        let temp = tempdir().unwrap();
        let mut world = World::new(Grid::filled(Dims::new(4, 4).unwrap(), Terrain::Empty));
        let mut writer = SnapshotWriter::new(temp.path(), 2);
        assert!(writer.maybe_write(&world, "demo").unwrap().is_none());
        world.begin_turn();
        world.finish_turn();
        assert!(writer.maybe_write(&world, "demo").unwrap().is_none());
        world.begin_turn();
        world.finish_turn();
        let path = writer.maybe_write(&world, "demo").unwrap().unwrap();
        assert!(path.ends_with("demo/turn_000002.json"));
        let text = fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["turn"], 2);
        assert_eq!(value["terrain"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn zero_interval_never_writes() {
        let temp = tempdir().unwrap();
        let mut world = World::new(Grid::filled(Dims::new(4, 4).unwrap(), Terrain::Empty));
        world.begin_turn();
        world.finish_turn();
        let mut writer = SnapshotWriter::new(temp.path(), 0);
        assert!(writer.maybe_write(&world, "demo").unwrap().is_none());
        assert!(writer.written().is_empty());
    }
}
