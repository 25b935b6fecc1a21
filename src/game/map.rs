//! Map contract, layout decoding and the built-in map catalogue

use serde::{Deserialize, Serialize};

use super::geometry::Rect;
use super::terrain::Wall;

/// Side length of one layout cell in world units
pub const CELL_SIZE: f32 = 40.0;

/// Map as supplied by a map provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDefinition {
    pub id: String,
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    /// One string per row; `.` empty, `1` destructible wall, `N` indestructible
    /// wall, `P` powerup spot, `S` spawn point
    pub layout: Vec<String>,
}

/// Lightweight listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSummary {
    pub id: String,
    pub name: String,
    pub rows: usize,
    pub cols: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MapError {
    #[error("Map {0} has {1} rows, expected {2}")]
    RowCount(String, usize, usize),

    #[error("Map {map} row {row} has {len} columns, expected {expected}")]
    RowLength {
        map: String,
        row: usize,
        len: usize,
        expected: usize,
    },

    #[error("Map {map} has unknown symbol '{symbol}' at row {row}")]
    UnknownSymbol { map: String, symbol: char, row: usize },

    #[error("Map {0} has no spawn points")]
    NoSpawnPoints(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Destructible,
    Indestructible,
    PowerupSpot,
    Spawn,
}

impl Cell {
    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '.' => Some(Cell::Empty),
            '1' => Some(Cell::Destructible),
            'N' => Some(Cell::Indestructible),
            'P' => Some(Cell::PowerupSpot),
            'S' => Some(Cell::Spawn),
            _ => None,
        }
    }
}

/// Everything a round needs from a map, in world coordinates
#[derive(Debug, Clone)]
pub struct MapLayout {
    pub width: f32,
    pub height: f32,
    pub walls: Vec<Wall>,
    pub powerup_spots: Vec<(f32, f32)>,
    pub spawn_points: Vec<(f32, f32)>,
}

impl MapDefinition {
    pub fn summary(&self) -> MapSummary {
        MapSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn width(&self) -> f32 {
        self.cols as f32 * CELL_SIZE
    }

    pub fn height(&self) -> f32 {
        self.rows as f32 * CELL_SIZE
    }

    /// Decode the layout into walls and points. Wall ids are the cell index,
    /// so a wall keeps its id across rounds.
    pub fn decode(&self) -> Result<MapLayout, MapError> {
        if self.layout.len() != self.rows {
            return Err(MapError::RowCount(self.id.clone(), self.layout.len(), self.rows));
        }

        let mut layout = MapLayout {
            width: self.width(),
            height: self.height(),
            walls: Vec::new(),
            powerup_spots: Vec::new(),
            spawn_points: Vec::new(),
        };

        for (row, line) in self.layout.iter().enumerate() {
            let len = line.chars().count();
            if len != self.cols {
                return Err(MapError::RowLength {
                    map: self.id.clone(),
                    row,
                    len,
                    expected: self.cols,
                });
            }

            for (col, symbol) in line.chars().enumerate() {
                let cell = Cell::from_symbol(symbol).ok_or_else(|| MapError::UnknownSymbol {
                    map: self.id.clone(),
                    symbol,
                    row,
                })?;
                let rect = Rect::new(col as f32 * CELL_SIZE, row as f32 * CELL_SIZE, CELL_SIZE, CELL_SIZE);
                let id = (row * self.cols + col) as u32;
                match cell {
                    Cell::Empty => {}
                    Cell::Destructible => layout.walls.push(Wall::destructible(id, row, col, rect)),
                    Cell::Indestructible => layout.walls.push(Wall::indestructible(id, row, col, rect)),
                    Cell::PowerupSpot => layout.powerup_spots.push(rect.center()),
                    Cell::Spawn => layout.spawn_points.push(rect.center()),
                }
            }
        }

        if layout.spawn_points.is_empty() {
            return Err(MapError::NoSpawnPoints(self.id.clone()));
        }
        Ok(layout)
    }
}

/// Source of maps for rooms
pub trait MapProvider: Send + Sync {
    fn list(&self) -> Vec<MapSummary>;
    fn get(&self, id: &str) -> Option<MapDefinition>;
    fn default_map_id(&self) -> String;
}

/// Maps compiled into the server
#[derive(Debug, Clone)]
pub struct MapCatalog {
    maps: Vec<MapDefinition>,
}

impl MapCatalog {
    pub fn new(maps: Vec<MapDefinition>) -> Self {
        Self { maps }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            build("arena", "Arena", ARENA),
            build("crossroads", "Crossroads", CROSSROADS),
            build("ruins", "Ruins", RUINS),
        ])
    }
}

impl Default for MapCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MapProvider for MapCatalog {
    fn list(&self) -> Vec<MapSummary> {
        self.maps.iter().map(MapDefinition::summary).collect()
    }

    fn get(&self, id: &str) -> Option<MapDefinition> {
        self.maps.iter().find(|m| m.id == id).cloned()
    }

    fn default_map_id(&self) -> String {
        self.maps.first().map(|m| m.id.clone()).unwrap_or_default()
    }
}

fn build(id: &str, name: &str, rows: &[&str]) -> MapDefinition {
    MapDefinition {
        id: id.to_string(),
        name: name.to_string(),
        rows: rows.len(),
        cols: rows.first().map(|r| r.len()).unwrap_or(0),
        layout: rows.iter().map(|r| r.to_string()).collect(),
    }
}

const ARENA: &[&str] = &[
    "NNNNNNNNNNNNNNNNNNNN",
    "NS.......PP.......SN",
    "N..11..........11..N",
    "N..1....NNNN....1..N",
    "N......1....1......N",
    "N.P..N........N..P.N",
    "NS...N..1..1..N...SN",
    "N.....1..PP..1.....N",
    "NS...N..1..1..N...SN",
    "N.P..N........N..P.N",
    "N......1....1......N",
    "N..1....NNNN....1..N",
    "N..11..........11..N",
    "NS.......PP.......SN",
    "NNNNNNNNNNNNNNNNNNNN",
];

const CROSSROADS: &[&str] = &[
    "NNNNNNNNNNNNNNNNNNNN",
    "NS.......11.......SN",
    "N..P.....11.....P..N",
    "N....NN..11..NN....N",
    "NS...N........N...SN",
    "N.........P........N",
    "N111....NNNN....111N",
    "NS.....P.NN.P.....SN",
    "N111....NNNN....111N",
    "N.........P........N",
    "N....N........N....N",
    "N....NN..11..NN....N",
    "N..P.....11.....P..N",
    "NS.......11.......SN",
    "NNNNNNNNNNNNNNNNNNNN",
];

const RUINS: &[&str] = &[
    "NNNNNNNNNNNNNNNNNNNNNNNN",
    "NS...1.....P.....1...SSN",
    "N.11.1..N.....N..1.11..N",
    "N....1..N..1..N..1.....N",
    "N.P.....N..1..N.....P..N",
    "N..111.............111.N",
    "NS.......11111.........N",
    "N...N.....P.P.....N...SN",
    "NS..N....11111....N....N",
    "N..111.............111.N",
    "N.P.....N..1..N.....P..N",
    "N....1..N..1..N..1.....N",
    "N.11.1..N.....N..1.11..N",
    "NS...1.....P.....1....SN",
    "NNNNNNNNNNNNNNNNNNNNNNNN",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_maps_decode_with_room_for_eight() {
        let catalog = MapCatalog::builtin();
        for summary in catalog.list() {
            let map = catalog.get(&summary.id).expect("listed map resolves");
            let layout = map.decode().expect("builtin map is valid");
            assert!(layout.spawn_points.len() >= 8, "{}", map.id);
            assert!(!layout.powerup_spots.is_empty());
            assert_eq!(layout.width, map.cols as f32 * CELL_SIZE);
        }
    }

    #[test]
    fn decode_places_cells_on_grid() {
        let map = build("tiny", "Tiny", &["N1", "SP"]);
        let layout = map.decode().expect("valid");
        assert_eq!(layout.walls.len(), 2);
        assert_eq!(layout.walls[0].hp, None);
        assert!(layout.walls[1].is_destructible());
        assert_eq!(layout.walls[1].rect, Rect::new(40.0, 0.0, 40.0, 40.0));
        assert_eq!(layout.spawn_points, vec![(20.0, 60.0)]);
        assert_eq!(layout.powerup_spots, vec![(60.0, 60.0)]);
    }

    #[test]
    fn ragged_or_unknown_layouts_are_rejected() {
        let mut map = build("bad", "Bad", &["S..", "..."]);
        map.layout[1] = "..".into();
        assert!(matches!(map.decode(), Err(MapError::RowLength { row: 1, .. })));

        let map = build("bad", "Bad", &["S.X"]);
        assert!(matches!(map.decode(), Err(MapError::UnknownSymbol { symbol: 'X', .. })));

        let map = build("empty", "Empty", &["..."]);
        assert_eq!(map.decode().unwrap_err(), MapError::NoSpawnPoints("empty".into()));
    }

    #[test]
    fn default_map_is_first() {
        assert_eq!(MapCatalog::builtin().default_map_id(), "arena");
        assert!(MapCatalog::builtin().get("nowhere").is_none());
    }
}
