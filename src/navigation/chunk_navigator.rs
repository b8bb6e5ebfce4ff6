use std::collections::BTreeMap;

use bevy::prelude::*;
use smallvec::SmallVec;

use super::types::{FindResult, SetId};
use super::waypoint::Waypoint;
use super::waypoint_set::ChunkWaypointSet;
use crate::chunk::{Chunk, ChunkId};
use crate::math::{flat, BoundingBox};

pub(crate) fn same_girth(a: f32, b: f32) -> bool {
    (a - b).abs() <= f32::EPSILON
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GridEntry {
    set: SetId,
    waypoint: u32,
}

type GridCell = SmallVec<[GridEntry; 8]>;

/// Uniform grid over the padded chunk area for one girth.
#[derive(Debug, Clone)]
struct GirthGrid {
    girth: f32,
    cells: Vec<GridCell>,
}

/// Per-chunk index of the waypoint sets bound in that chunk.
///
/// Outdoor chunks additionally keep one grid per girth; each cell lists every
/// waypoint whose vertex bounds overlap it. The grid has one spare cell of
/// padding on each side of the chunk.
#[derive(Debug, Clone)]
pub struct ChunkNavigator {
    chunk: ChunkId,
    bounds: BoundingBox,
    sets: Vec<SetId>,
    grid_size: usize,
    grid_origin: Vec2,
    cell_size: f32,
    girth_grids: Option<Vec<GirthGrid>>,
}

impl ChunkNavigator {
    pub fn new(chunk: &Chunk, grid_size: usize, use_girth_grids: bool) -> Self {
        let bounds = *chunk.bounding_box();
        let grid_size = grid_size.max(3);
        let size = bounds.size();
        let max_dim = size.x.max(size.z);
        let cell_size = (max_dim / (grid_size - 2) as f32).max(1e-3);
        let grid_origin = Vec2::new(bounds.min.x - cell_size, bounds.min.z - cell_size);

        Self {
            chunk: chunk.id(),
            bounds,
            sets: Vec::new(),
            grid_size,
            grid_origin,
            cell_size,
            girth_grids: (use_girth_grids && chunk.is_outside_chunk()).then(Vec::new),
        }
    }

    pub fn chunk(&self) -> ChunkId {
        self.chunk
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn sets(&self) -> &[SetId] {
        &self.sets
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn uses_girth_grids(&self) -> bool {
        self.girth_grids.is_some()
    }

    pub fn has_girth(&self, sets: &BTreeMap<SetId, ChunkWaypointSet>, girth: f32) -> bool {
        self.sets
            .iter()
            .filter_map(|id| sets.get(id))
            .any(|s| same_girth(s.girth(), girth))
    }

    /// Cell holding `point`, if it falls on the grid.
    pub fn grid_cell(&self, point: Vec3) -> Option<(usize, usize)> {
        let g = (flat(point) - self.grid_origin) / self.cell_size;
        let (x, z) = (g.x.floor(), g.y.floor());
        if x < 0.0 || z < 0.0 || x >= self.grid_size as f32 || z >= self.grid_size as f32 {
            return None;
        }
        Some((x as usize, z as usize))
    }

    pub fn add(&mut self, set: &ChunkWaypointSet) {
        self.sets.push(set.id());

        let Some(grids) = self.girth_grids.as_mut() else {
            return;
        };
        let cell_count = self.grid_size * self.grid_size;
        let index = match grids.iter().position(|g| same_girth(g.girth, set.girth())) {
            Some(i) => i,
            None => {
                grids.push(GirthGrid { girth: set.girth(), cells: vec![GridCell::new(); cell_count] });
                grids.len() - 1
            }
        };
        let grid = &mut grids[index];

        for (i, wp) in set.data().waypoints() {
            let mut lo = Vec2::splat(f32::MAX);
            let mut hi = Vec2::splat(f32::MIN);
            for edge in wp.edges() {
                let g = (edge.start - self.grid_origin) / self.cell_size;
                lo = lo.min(g);
                hi = hi.max(g);
            }
            let x0 = lo.x.floor().max(0.0) as usize;
            let z0 = lo.y.floor().max(0.0) as usize;
            if hi.x < 0.0 || hi.y < 0.0 {
                continue;
            }
            let x1 = (hi.x.floor() as usize).min(self.grid_size - 1);
            let z1 = (hi.y.floor() as usize).min(self.grid_size - 1);
            for xg in x0..=x1 {
                for zg in z0..=z1 {
                    grid.cells[xg + zg * self.grid_size].push(GridEntry { set: set.id(), waypoint: i as u32 });
                }
            }
        }
    }

    /// Forget `set`, scrubbing it from every grid cell.
    pub fn remove(&mut self, set: SetId) {
        self.sets.retain(|s| *s != set);
        if let Some(grids) = self.girth_grids.as_mut() {
            for grid in grids.iter_mut() {
                for cell in grid.cells.iter_mut() {
                    cell.retain(|e| e.set != set);
                }
            }
        }
    }

    /// True if any grid cell still mentions `set`.
    pub fn grid_references(&self, set: SetId) -> bool {
        self.girth_grids
            .iter()
            .flatten()
            .any(|g| g.cells.iter().any(|c| c.iter().any(|e| e.set == set)))
    }

    /// Waypoint of the given girth at or nearest to `point`.
    pub fn find(
        &self,
        sets: &BTreeMap<SetId, ChunkWaypointSet>,
        point: Vec3,
        girth: f32,
        ignore_height: bool,
    ) -> Option<FindResult> {
        if let Some(grid) = self
            .girth_grids
            .as_ref()
            .and_then(|grids| grids.iter().find(|g| same_girth(g.girth, girth)))
        {
            return self.find_in_grid(sets, grid, point, ignore_height);
        }
        self.find_linear(sets, point, girth, ignore_height)
    }

    fn find_in_grid(
        &self,
        sets: &BTreeMap<SetId, ChunkWaypointSet>,
        grid: &GirthGrid,
        point: Vec3,
        ignore_height: bool,
    ) -> Option<FindResult> {
        let (xg, zg) = self.grid_cell(point)?;
        let cell = &grid.cells[xg + zg * self.grid_size];

        if let Some(found) = cell_find(sets, cell, point, ignore_height) {
            return Some(found);
        }
        if !ignore_height {
            // Prefer the layer underneath when nothing brackets the height.
            if let Some(found) = cell_find(sets, cell, point, true) {
                let below = lookup(sets, found.set, found.waypoint).is_some_and(|w| w.min_height() < point.y);
                if below {
                    return Some(found);
                }
            }
        }

        let mut best_distance_squared = f32::MAX;
        let mut best: Option<GridEntry> = None;
        let size = self.grid_size as i64;
        let (xg, zg) = (xg as i64, zg as i64);
        let try_cell = |x: i64, z: i64, best: &mut Option<GridEntry>, best_d: &mut f32| {
            if x < 0 || z < 0 || x >= size || z >= size {
                return;
            }
            for entry in &grid.cells[(x + z * size) as usize] {
                if let Some(wp) = lookup(sets, entry.set, entry.waypoint as usize) {
                    let d = wp.distance_squared(&self.bounds, point);
                    if d < *best_d {
                        *best_d = d;
                        *best = Some(*entry);
                    }
                }
            }
        };

        try_cell(xg, zg, &mut best, &mut best_distance_squared);
        for r in 1..size {
            if best.is_some() && best_distance_squared <= ((r - 1) as f32 * self.cell_size).powi(2) {
                break;
            }
            for n in 0..2 * r {
                try_cell(xg - r + n, zg - r, &mut best, &mut best_distance_squared);
                try_cell(xg - r + n + 1, zg + r, &mut best, &mut best_distance_squared);
                try_cell(xg - r, zg - r + n + 1, &mut best, &mut best_distance_squared);
                try_cell(xg + r, zg - r + n, &mut best, &mut best_distance_squared);
            }
        }

        let entry = best?;
        let exact_match = lookup(sets, entry.set, entry.waypoint as usize).is_some_and(|w| w.contains(point));
        Some(FindResult { set: entry.set, waypoint: entry.waypoint as usize, exact_match })
    }

    fn find_linear(
        &self,
        sets: &BTreeMap<SetId, ChunkWaypointSet>,
        point: Vec3,
        girth: f32,
        ignore_height: bool,
    ) -> Option<FindResult> {
        let candidates = || {
            self.sets
                .iter()
                .filter_map(|id| sets.get(id))
                .filter(|s| same_girth(s.girth(), girth))
        };

        for set in candidates() {
            if let Some(waypoint) = set.data().find(point, ignore_height) {
                return Some(FindResult { set: set.id(), waypoint, exact_match: true });
            }
        }

        let mut best_distance_squared = f32::MAX;
        let mut best = None;
        for set in candidates() {
            if let Some(waypoint) = set.data().find_closest(&self.bounds, point, &mut best_distance_squared) {
                best = Some(FindResult { set: set.id(), waypoint, exact_match: false });
            }
        }
        best
    }
}

fn lookup(
    sets: &BTreeMap<SetId, ChunkWaypointSet>,
    set: SetId,
    waypoint: usize,
) -> Option<Waypoint<'_>> {
    sets.get(&set)?.waypoint(waypoint)
}

/// Containment search within one cell. With `ignore_height`, the waypoint
/// whose top is nearest the point's height wins.
fn cell_find(
    sets: &BTreeMap<SetId, ChunkWaypointSet>,
    cell: &GridCell,
    point: Vec3,
    ignore_height: bool,
) -> Option<FindResult> {
    if !ignore_height {
        return cell.iter().find_map(|e| {
            let wp = lookup(sets, e.set, e.waypoint as usize)?;
            wp.contains(point)
                .then_some(FindResult { set: e.set, waypoint: e.waypoint as usize, exact_match: true })
        });
    }

    let mut best: Option<(f32, GridEntry)> = None;
    for entry in cell {
        let Some(wp) = lookup(sets, entry.set, entry.waypoint as usize) else {
            continue;
        };
        if !wp.contains_projection(point) {
            continue;
        }
        let diff = (wp.max_height() - point.y).abs();
        if best.is_none_or(|(d, _)| diff < d) {
            best = Some((diff, *entry));
        }
    }
    best.map(|(_, e)| FindResult { set: e.set, waypoint: e.waypoint as usize, exact_match: true })
}
