// Copyright (C) 2026 Crewfall
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashMap;

pub use crewfall_common::MapData;
use crewfall_common::{MAX_CAPACITY, TaskId};
use tracing::warn;

pub const DEFAULT_MAP_ID: &str = "outpost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Walkable,
    Obstacle,
    TaskZone,
    Vent,
    EmergencyZone,
    Decorative,
}

impl CellType {
    pub fn from_code(code: i32) -> CellType {
        match code {
            0 => CellType::Walkable,
            1 => CellType::Obstacle,
            2 => CellType::TaskZone,
            3 => CellType::Vent,
            4 => CellType::EmergencyZone,
            5 => CellType::Decorative,
            // Unknown codes are treated as solid so a bad map config
            // cannot open up unintended paths.
            _ => CellType::Obstacle,
        }
    }

    pub fn walkable(self) -> bool {
        !matches!(self, CellType::Obstacle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneId {
    Task(TaskId),
    Vent(u32),
    Emergency(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct TaskSite {
    pub id: TaskId,
    pub x: i32,
    pub y: i32,
}

/// Immutable walkability and zone semantics for one map. Built once at
/// session creation and shared read-only with the session actor.
#[derive(Debug, Clone)]
pub struct Grid {
    map_id: String,
    rows: usize,
    cols: usize,
    cells: Vec<Vec<i32>>,
    tasks: Vec<TaskSite>,
    zones: Vec<(ZoneId, i32, i32)>,
    spawns: Vec<(i32, i32)>,
}

impl Grid {
    pub fn from_map(map_id: &str, map: &MapData) -> anyhow::Result<Grid> {
        if map.rows == 0 || map.cols == 0 {
            anyhow::bail!("map {map_id} has zero size");
        }
        if map.cells.len() != map.rows {
            anyhow::bail!(
                "map {map_id} declares {} rows but has {}",
                map.rows,
                map.cells.len()
            );
        }
        for (y, row) in map.cells.iter().enumerate() {
            if row.len() != map.cols {
                anyhow::bail!("map {map_id} row {y} has {} cols, expected {}", row.len(), map.cols);
            }
        }

        let mut tasks = Vec::new();
        let mut zones = Vec::new();
        let mut vent_seq = 0u32;
        let mut emergency_seq = 0u32;
        for (y, row) in map.cells.iter().enumerate() {
            for (x, code) in row.iter().enumerate() {
                let (x, y) = (x as i32, y as i32);
                match CellType::from_code(*code) {
                    CellType::TaskZone => {
                        let id = tasks.len() as TaskId;
                        tasks.push(TaskSite { id, x, y });
                        zones.push((ZoneId::Task(id), x, y));
                    }
                    CellType::Vent => {
                        zones.push((ZoneId::Vent(vent_seq), x, y));
                        vent_seq += 1;
                    }
                    CellType::EmergencyZone => {
                        zones.push((ZoneId::Emergency(emergency_seq), x, y));
                        emergency_seq += 1;
                    }
                    _ => {}
                }
            }
        }

        if tasks.is_empty() {
            anyhow::bail!("map {map_id} defines no task zones");
        }

        let mut grid = Grid {
            map_id: map_id.to_string(),
            rows: map.rows,
            cols: map.cols,
            cells: map.cells.clone(),
            tasks,
            zones,
            spawns: Vec::new(),
        };
        grid.spawns = grid.compute_spawns();
        if grid.spawns.is_empty() {
            anyhow::bail!("map {map_id} has no walkable spawn cells");
        }
        Ok(grid)
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.cols && (y as usize) < self.rows
    }

    pub fn cell_type(&self, x: i32, y: i32) -> Option<CellType> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(CellType::from_code(self.cells[y as usize][x as usize]))
    }

    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.cell_type(x, y).is_some_and(CellType::walkable)
    }

    /// Zones whose cell is within Chebyshev distance 1 of (x, y), the
    /// cell itself included.
    pub fn adjacent_zones(&self, x: i32, y: i32) -> Vec<ZoneId> {
        self.zones
            .iter()
            .filter(|(_, zx, zy)| (zx - x).abs() <= 1 && (zy - y).abs() <= 1)
            .map(|(zone, _, _)| *zone)
            .collect()
    }

    pub fn tasks(&self) -> &[TaskSite] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<TaskSite> {
        self.tasks.iter().copied().find(|t| t.id == id)
    }

    /// True if (x, y) is within Chebyshev distance 1 of any task cell.
    pub fn near_task_zone(&self, x: i32, y: i32) -> bool {
        self.tasks
            .iter()
            .any(|t| (t.x - x).abs() <= 1 && (t.y - y).abs() <= 1)
    }

    pub fn near_emergency_zone(&self, x: i32, y: i32) -> bool {
        self.adjacent_zones(x, y)
            .iter()
            .any(|zone| matches!(zone, ZoneId::Emergency(_)))
    }

    /// Spawn cell for the n-th player to join, wrapping if a map offers
    /// fewer distinct spawns than the session capacity.
    pub fn spawn_point(&self, index: usize) -> (i32, i32) {
        self.spawns[index % self.spawns.len()]
    }

    /// Walkable cells nearest the vertical center of the map, scanned
    /// outward row by row. Capped at the maximum session capacity.
    fn compute_spawns(&self) -> Vec<(i32, i32)> {
        let center = (self.rows / 2) as i32;
        let mut order: Vec<i32> = vec![center];
        for offset in 1..=(self.rows as i32) {
            order.push(center - offset);
            order.push(center + offset);
        }

        let mut spawns = Vec::new();
        for y in order {
            if !self.in_bounds(0, y) {
                continue;
            }
            for x in 0..self.cols as i32 {
                if self.cell_type(x, y) == Some(CellType::Walkable) {
                    spawns.push((x, y));
                    if spawns.len() >= MAX_CAPACITY as usize {
                        return spawns;
                    }
                }
            }
        }
        spawns
    }
}

/// Named maps resolvable at session creation. Ships a built-in default;
/// the default can be overridden from a YAML file, mirroring custom map
/// deployments.
#[derive(Debug, Clone)]
pub struct MapCatalog {
    maps: HashMap<String, MapData>,
}

impl MapCatalog {
    pub fn from_env() -> MapCatalog {
        let mut maps = HashMap::new();
        maps.insert(DEFAULT_MAP_ID.to_string(), default_map());
        if let Some(map) = load_map_config() {
            maps.insert(DEFAULT_MAP_ID.to_string(), map);
        }
        MapCatalog { maps }
    }

    pub fn resolve(&self, map_id: Option<&str>) -> Option<(String, &MapData)> {
        let id = map_id.unwrap_or(DEFAULT_MAP_ID);
        self.maps.get(id).map(|map| (id.to_string(), map))
    }
}

fn load_map_config() -> Option<MapData> {
    let path = std::env::var("MAP_CONFIG_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path, error = %error, "failed to read map config file");
            return None;
        }
    };

    match serde_yaml::from_str::<MapData>(&raw) {
        Ok(map) => Some(map),
        Err(error) => {
            warn!(path = %path, error = %error, "failed to parse map config yaml");
            None
        }
    }
}

/// The built-in "outpost" map: 11x11, five task zones, two vents, one
/// emergency button in the center, walled perimeter.
pub fn default_map() -> MapData {
    MapData {
        rows: 11,
        cols: 11,
        cells: vec![
            vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
            vec![1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 1],
            vec![1, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1],
            vec![1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 1],
            vec![1, 2, 0, 0, 0, 4, 0, 0, 0, 2, 1],
            vec![1, 0, 0, 1, 0, 0, 0, 1, 0, 0, 1],
            vec![1, 0, 5, 0, 0, 0, 0, 0, 5, 0, 1],
            vec![1, 0, 0, 0, 1, 0, 1, 0, 0, 0, 1],
            vec![1, 3, 0, 0, 0, 2, 0, 0, 0, 0, 1],
            vec![1, 0, 0, 0, 0, 0, 0, 2, 0, 0, 1],
            vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
        ],
    }
}
