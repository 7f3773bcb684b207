//! Toroidal terrain grid.
//!
//! Every coordinate is normalised modulo the grid size before use, so there is
//! no out-of-bounds position anywhere in the engine. Distances are Chebyshev
//! distances measured along the shorter way round each axis.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::items::Item;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Grid extent plus the wraparound arithmetic that goes with it. Only
/// [`Dims::new`] builds one, so both sides are positive and the area fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDims")]
pub struct Dims {
    width: i32,
    height: i32,
}

#[derive(Deserialize)]
struct RawDims {
    width: i32,
    height: i32,
}

impl TryFrom<RawDims> for Dims {
    type Error = ConfigError;

    fn try_from(raw: RawDims) -> Result<Self, Self::Error> {
        Dims::new(raw.width, raw.height)
    }
}

impl Dims {
    pub fn new(width: i32, height: i32) -> Result<Self, ConfigError> {
        if width <= 0 || height <= 0 || width.checked_mul(height).is_none() {
            return Err(ConfigError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub fn wrap(&self, x: i32, y: i32) -> Pos {
        Pos::new(x.rem_euclid(self.width), y.rem_euclid(self.height))
    }

    #[must_use]
    pub fn offset(&self, pos: Pos, dx: i32, dy: i32) -> Pos {
        self.wrap(pos.x + dx, pos.y + dy)
    }

    /// Shortest signed displacement from `from` to `to` on each axis.
    pub fn delta(&self, from: Pos, to: Pos) -> (i32, i32) {
        (
            axis_delta(from.x, to.x, self.width),
            axis_delta(from.y, to.y, self.height),
        )
    }

    pub fn distance(&self, a: Pos, b: Pos) -> i32 {
        let (dx, dy) = self.delta(a, b);
        dx.abs().max(dy.abs())
    }

    /// One king-move step that closes the distance to `to`.
    pub fn step_toward(&self, from: Pos, to: Pos) -> (i32, i32) {
        let (dx, dy) = self.delta(from, to);
        (dx.signum(), dy.signum())
    }

    /// One king-move step that opens the distance from `threat`.
    pub fn step_away(&self, from: Pos, threat: Pos) -> (i32, i32) {
        let (dx, dy) = self.delta(from, threat);
        if dx == 0 && dy == 0 {
            return (1, 0);
        }
        (-dx.signum(), -dy.signum())
    }

    fn index(&self, pos: Pos) -> usize {
        let p = self.wrap(pos.x, pos.y);
        (p.y * self.width + p.x) as usize
    }
}

fn axis_delta(from: i32, to: i32, size: i32) -> i32 {
    let d = (to - from).rem_euclid(size);
    if d > size / 2 {
        d - size
    } else {
        d
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Empty,
    Desert,
    Rocky,
    Canyon,
    Hostile,
    Trap,
    Teleport,
}

impl Terrain {
    pub fn symbol(self) -> char {
        match self {
            Terrain::Empty => '.',
            Terrain::Desert => '~',
            Terrain::Rocky => '^',
            Terrain::Canyon => '#',
            Terrain::Hostile => '!',
            Terrain::Trap => 'X',
            Terrain::Teleport => 'O',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        Some(match symbol {
            '.' => Terrain::Empty,
            '~' => Terrain::Desert,
            '^' => Terrain::Rocky,
            '#' => Terrain::Canyon,
            '!' => Terrain::Hostile,
            'X' => Terrain::Trap,
            'O' => Terrain::Teleport,
            _ => return None,
        })
    }

    pub fn base_cost(self) -> i32 {
        match self {
            Terrain::Empty | Terrain::Teleport => 1,
            Terrain::Desert | Terrain::Canyon => 2,
            Terrain::Rocky => 3,
            Terrain::Hostile => 4,
            Terrain::Trap => 5,
        }
    }

    pub fn entry_damage(self) -> i32 {
        match self {
            Terrain::Hostile => 5,
            Terrain::Trap => 15,
            _ => 0,
        }
    }

    pub fn is_hazardous(self) -> bool {
        matches!(self, Terrain::Hostile | Terrain::Trap)
    }
}

/// Extra damage layered onto a cell on top of its terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hazard {
    pub damage: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub terrain: Terrain,
    pub hazard: Option<Hazard>,
    pub item: Option<Item>,
}

impl Cell {
    /// Stamina needed to enter this cell under the given weather multiplier.
    pub fn movement_cost(&self, weather_multiplier: f64) -> i32 {
        (self.terrain.base_cost() as f64 * weather_multiplier).ceil() as i32
    }

    pub fn entry_damage(&self) -> i32 {
        self.terrain.entry_damage() + self.hazard.map_or(0, |h| h.damage)
    }

    pub fn is_hazardous(&self) -> bool {
        self.terrain.is_hazardous() || self.hazard.is_some()
    }
}

/// Initial contents of one cell, as produced by a terrain provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSpec {
    pub terrain: Terrain,
    #[serde(default)]
    pub hazard: Option<Hazard>,
}

impl CellSpec {
    pub fn plain(terrain: Terrain) -> Self {
        Self {
            terrain,
            hazard: None,
        }
    }
}

/// Supplies the initial terrain layout, row-major.
pub trait TerrainProvider {
    fn generate(&self, width: i32, height: i32, seed: u64) -> Vec<CellSpec>;
}

/// Draws each cell independently from a fixed terrain distribution.
#[derive(Debug, Clone)]
pub struct WeightedTerrain {
    weights: Vec<(Terrain, f64)>,
}

impl Default for WeightedTerrain {
    fn default() -> Self {
        Self {
            weights: vec![
                (Terrain::Empty, 0.50),
                (Terrain::Desert, 0.20),
                (Terrain::Rocky, 0.10),
                (Terrain::Canyon, 0.08),
                (Terrain::Hostile, 0.06),
                (Terrain::Trap, 0.03),
                (Terrain::Teleport, 0.03),
            ],
        }
    }
}

impl TerrainProvider for WeightedTerrain {
    fn generate(&self, width: i32, height: i32, seed: u64) -> Vec<CellSpec> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let total: f64 = self.weights.iter().map(|(_, w)| w).sum();
        (0..(width.max(0) * height.max(0)))
            .map(|_| {
                let mut roll = rng.gen::<f64>() * total;
                let mut terrain = Terrain::Empty;
                for (candidate, weight) in &self.weights {
                    if roll < *weight {
                        terrain = *candidate;
                        break;
                    }
                    roll -= weight;
                }
                CellSpec::plain(terrain)
            })
            .collect()
    }
}

/// Parses symbol rows (`.~^#!XO`) into cell specs.
pub fn parse_rows(rows: &[String], dims: Dims) -> Result<Vec<CellSpec>, ConfigError> {
    if rows.len() != dims.height as usize {
        return Err(ConfigError::TerrainRows {
            expected: dims.height as usize,
            found: rows.len(),
        });
    }
    let mut specs = Vec::with_capacity(dims.area());
    for (y, row) in rows.iter().enumerate() {
        let width = row.chars().count();
        if width != dims.width as usize {
            return Err(ConfigError::TerrainWidth {
                row: y,
                expected: dims.width as usize,
                found: width,
            });
        }
        for (x, symbol) in row.chars().enumerate() {
            let terrain =
                Terrain::from_symbol(symbol).ok_or(ConfigError::UnknownTerrain { symbol, x, y })?;
            specs.push(CellSpec::plain(terrain));
        }
    }
    Ok(specs)
}

#[derive(Debug, Clone)]
pub struct Grid {
    dims: Dims,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn from_specs(dims: Dims, specs: Vec<CellSpec>) -> Result<Self, ConfigError> {
        if specs.len() != dims.area() {
            return Err(ConfigError::TerrainRows {
                expected: dims.height as usize,
                found: specs.len() / dims.width.max(1) as usize,
            });
        }
        let cells = specs
            .into_iter()
            .map(|spec| Cell {
                terrain: spec.terrain,
                hazard: spec.hazard,
                item: None,
            })
            .collect();
        Ok(Self { dims, cells })
    }

    pub fn filled(dims: Dims, terrain: Terrain) -> Self {
        Self {
            dims,
            cells: vec![
                Cell {
                    terrain,
                    hazard: None,
                    item: None,
                };
                dims.area()
            ],
        }
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn width(&self) -> i32 {
        self.dims.width
    }

    pub fn height(&self) -> i32 {
        self.dims.height
    }

    pub fn cell_at(&self, x: i32, y: i32) -> &Cell {
        &self.cells[self.dims.index(Pos::new(x, y))]
    }

    pub fn cell(&self, pos: Pos) -> &Cell {
        self.cell_at(pos.x, pos.y)
    }

    pub fn distance(&self, a: Pos, b: Pos) -> i32 {
        self.dims.distance(a, b)
    }

    /// All distinct cells within Chebyshev `radius` of `center`, excluding the
    /// center itself, in row-major order.
    pub fn neighbors(&self, center: Pos, radius: i32) -> Vec<Pos> {
        let center = self.dims.wrap(center.x, center.y);
        let rx = radius.clamp(0, self.dims.width / 2);
        let ry = radius.clamp(0, self.dims.height / 2);
        let mut out = Vec::with_capacity(((2 * rx + 1) * (2 * ry + 1)) as usize);
        for dy in -ry..=ry {
            for dx in -rx..=rx {
                let p = self.dims.offset(center, dx, dy);
                if p != center {
                    out.push(p);
                }
            }
        }
        out.sort_by_key(|p| (p.y, p.x));
        out.dedup();
        out
    }

    pub fn place_item(&mut self, pos: Pos, item: Item) -> bool {
        let idx = self.dims.index(pos);
        if self.cells[idx].item.is_some() {
            return false;
        }
        self.cells[idx].item = Some(item);
        true
    }

    pub fn remove_item(&mut self, pos: Pos) -> Option<Item> {
        let idx = self.dims.index(pos);
        self.cells[idx].item.take()
    }

    /// Sets or clears the hazard marker on a cell.
    pub fn apply_hazard(&mut self, pos: Pos, hazard: Option<Hazard>) {
        let idx = self.dims.index(pos);
        self.cells[idx].hazard = hazard;
    }

    pub fn random_cell<R: Rng + ?Sized>(&self, rng: &mut R) -> Pos {
        Pos::new(
            rng.gen_range(0..self.dims.width),
            rng.gen_range(0..self.dims.height),
        )
    }

    pub fn items(&self) -> Vec<(Pos, Item)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                cell.item.map(|item| {
                    let i = i as i32;
                    (Pos::new(i % self.dims.width, i / self.dims.width), item)
                })
            })
            .collect()
    }

    pub fn terrain_rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.dims.width as usize)
            .map(|row| row.iter().map(|c| c.terrain.symbol()).collect())
            .collect()
    }
}
