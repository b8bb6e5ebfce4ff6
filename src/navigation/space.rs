use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bevy::prelude::*;
use chunknav_macros::profile;

use super::astar::SearchLimits;
use super::chunk_navigator::ChunkNavigator;
use super::connections::{ConnectionRegistry, SymmetryViolation};
use super::set_data::WaypointSetData;
use super::types::{FindResult, SetId, GIRTH_GRID_SIZE, GRID_RESOLUTION, HEIGHT_TOLERANCE};
use super::waypoint::Waypoint;
use super::waypoint_set::{BindState, ChunkWaypointSet};
use crate::chunk::{is_better_portal, Chunk, ChunkId, NamedObjects, NoNamedObjects, PortalCandidate, PortalRef};
use crate::navmesh::{AuthoredWaypointSet, NavmeshError, NavmeshPopulation, NavmeshResource};

/// Tunables of a navigation space.
#[derive(Clone, Debug, PartialEq)]
pub struct NavSettings {
    pub girth_grid_size: usize,
    pub use_girth_grids: bool,
    /// Chunk edge length; intra-set cost bounds above this are ignored.
    pub grid_resolution: f32,
    /// Log bind failures toward neighbours that do carry the girth.
    pub log_unresolved_edges: bool,
    pub search: SearchLimits,
}

impl Default for NavSettings {
    fn default() -> Self {
        Self {
            girth_grid_size: GIRTH_GRID_SIZE,
            use_girth_grids: true,
            grid_resolution: GRID_RESOLUTION,
            log_unresolved_edges: true,
            search: SearchLimits::default(),
        }
    }
}

/// Navigation view of one chunk space.
///
/// Owns the loaded chunks' geometry, a `ChunkNavigator` per chunk, every live
/// `ChunkWaypointSet` and the registry of links between them. A set is live
/// exactly while it is present here; tossing a set or removing its chunk
/// removes it and every link that mentions it in one step.
#[derive(Resource)]
pub struct NavSpace {
    chunks: BTreeMap<ChunkId, Chunk>,
    navigators: BTreeMap<ChunkId, ChunkNavigator>,
    sets: BTreeMap<SetId, ChunkWaypointSet>,
    registry: ConnectionRegistry,
    population: NavmeshPopulation,
    named_objects: Box<dyn NamedObjects>,
    settings: NavSettings,
    next_set_id: u32,
}

impl Default for NavSpace {
    fn default() -> Self {
        Self::new(NavSettings::default())
    }
}

impl NavSpace {
    pub fn new(settings: NavSettings) -> Self {
        Self {
            chunks: BTreeMap::new(),
            navigators: BTreeMap::new(),
            sets: BTreeMap::new(),
            registry: ConnectionRegistry::default(),
            population: NavmeshPopulation::new(),
            named_objects: Box::new(NoNamedObjects),
            settings,
            next_set_id: 0,
        }
    }

    /// Share a navmesh cache with other spaces.
    pub fn with_population(mut self, population: NavmeshPopulation) -> Self {
        self.population = population;
        self
    }

    pub fn set_named_objects(&mut self, named_objects: impl NamedObjects + 'static) {
        self.named_objects = Box::new(named_objects);
    }

    pub fn named_objects(&self) -> &dyn NamedObjects {
        self.named_objects.as_ref()
    }

    pub fn settings(&self) -> &NavSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut NavSettings {
        &mut self.settings
    }

    pub fn population(&self) -> &NavmeshPopulation {
        &self.population
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------------

    /// Register a chunk. A chunk already present under the same id is removed
    /// first, tossing its sets.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        let id = chunk.id();
        if self.chunks.contains_key(&id) {
            self.remove_chunk(id);
        }
        let navigator = ChunkNavigator::new(&chunk, self.settings.girth_grid_size, self.settings.use_girth_grids);
        self.navigators.insert(id, navigator);
        self.chunks.insert(id, chunk);
    }

    /// Unload a chunk, tossing every set it holds.
    pub fn remove_chunk(&mut self, id: ChunkId) -> Option<Chunk> {
        let sets: Vec<SetId> = self.navigators.get(&id).map(|n| n.sets().to_vec()).unwrap_or_default();
        for set in sets {
            self.toss_set(set);
        }
        self.navigators.remove(&id);
        let chunk = self.chunks.remove(&id);
        if chunk.is_some() {
            debug!("[SPACE] Removed chunk {:?}", id);
        }
        chunk
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    pub fn navigator(&self, id: ChunkId) -> Option<&ChunkNavigator> {
        self.navigators.get(&id)
    }

    /// Chunk a world point belongs to: the smallest indoor chunk containing it,
    /// otherwise an outdoor chunk containing it.
    pub fn find_chunk_from_point(&self, point: Vec3) -> Option<ChunkId> {
        let containing = || self.chunks.values().filter(|c| c.bounding_box().intersects(point));
        containing()
            .filter(|c| !c.is_outside_chunk())
            .min_by(|a, b| a.volume().total_cmp(&b.volume()))
            .or_else(|| containing().find(|c| c.is_outside_chunk()))
            .map(Chunk::id)
    }

    // ------------------------------------------------------------------------
    // Waypoint sets
    // ------------------------------------------------------------------------

    /// Toss shared set data into a chunk. The new set starts unbound.
    pub fn add_waypoint_set(&mut self, chunk: ChunkId, data: Arc<WaypointSetData>) -> Result<SetId, NavmeshError> {
        let navigator = self.navigators.get_mut(&chunk).ok_or(NavmeshError::UnknownChunk(chunk))?;
        let id = SetId(self.next_set_id);
        self.next_set_id += 1;
        let set = ChunkWaypointSet::new(id, chunk, data);
        navigator.add(&set);
        self.sets.insert(id, set);
        Ok(id)
    }

    pub fn add_set_data(&mut self, chunk: ChunkId, data: WaypointSetData) -> Result<SetId, NavmeshError> {
        self.add_waypoint_set(chunk, Arc::new(data))
    }

    /// Load a navmesh file into a chunk, reusing cached sets for the same path.
    pub fn load_navmesh(&mut self, chunk: ChunkId, path: &Path) -> Result<Vec<SetId>, NavmeshError> {
        let source = path.display().to_string();
        let sets = self
            .population
            .load_with(&source, || NavmeshResource::load(path)?.into_set_data(&source))?;
        self.add_loaded(chunk, sets)
    }

    /// Like [`load_navmesh`](Self::load_navmesh) for a resource already in memory.
    pub fn load_navmesh_resource(
        &mut self,
        chunk: ChunkId,
        source: &str,
        resource: NavmeshResource,
    ) -> Result<Vec<SetId>, NavmeshError> {
        let sets = self.population.load_with(source, || resource.into_set_data(source))?;
        self.add_loaded(chunk, sets)
    }

    fn add_loaded(&mut self, chunk: ChunkId, sets: Vec<Arc<WaypointSetData>>) -> Result<Vec<SetId>, NavmeshError> {
        if !self.chunks.contains_key(&chunk) {
            return Err(NavmeshError::UnknownChunk(chunk));
        }
        sets.into_iter().map(|data| self.add_waypoint_set(chunk, data)).collect()
    }

    /// Add a hand-authored set. Sets authored in the chunk's local frame are
    /// moved into world space with the chunk transform.
    pub fn load_authored_set(
        &mut self,
        chunk: ChunkId,
        authored: &AuthoredWaypointSet,
        local_frame: bool,
    ) -> Result<SetId, NavmeshError> {
        let owner = self.chunks.get(&chunk).ok_or(NavmeshError::UnknownChunk(chunk))?;
        let to_world = local_frame.then(|| *owner.transform());
        let data = authored.build("", to_world.as_ref())?;
        self.add_set_data(chunk, data)
    }

    /// Remove a set from its chunk: links others hold to it go first, then its
    /// own links, then its navigator entry.
    pub fn toss_set(&mut self, id: SetId) -> bool {
        let Some(set) = self.sets.remove(&id) else {
            return false;
        };
        self.registry.remove_set(id);
        if let Some(navigator) = self.navigators.get_mut(&set.chunk()) {
            navigator.remove(id);
        }
        debug!("[SPACE] Tossed {} out of {:?}", id, set.chunk());
        true
    }

    pub fn set(&self, id: SetId) -> Option<&ChunkWaypointSet> {
        self.sets.get(&id)
    }

    pub fn sets(&self) -> impl Iterator<Item = &ChunkWaypointSet> {
        self.sets.values()
    }

    /// A set is live while it sits in a loaded chunk.
    pub fn is_set_live(&self, id: SetId) -> bool {
        self.sets.get(&id).is_some_and(|s| self.chunks.contains_key(&s.chunk()))
    }

    pub fn set_chunk(&self, id: SetId) -> Option<&Chunk> {
        self.chunks.get(&self.sets.get(&id)?.chunk())
    }

    pub fn waypoint(&self, set: SetId, waypoint: usize) -> Option<Waypoint<'_>> {
        self.sets.get(&set)?.waypoint(waypoint)
    }

    /// Neighbour set reached through a bound boundary edge.
    pub fn edge_label(&self, set: SetId, absolute_edge: usize) -> Option<SetId> {
        self.registry.edge_label(set, absolute_edge)
    }

    pub fn connections(&self, set: SetId) -> impl Iterator<Item = (SetId, PortalRef)> + '_ {
        self.registry.connections(set)
    }

    pub fn backlinks(&self, set: SetId) -> impl Iterator<Item = SetId> + '_ {
        self.registry.backlinks(set)
    }

    pub fn check_symmetry(&self) -> Result<(), SymmetryViolation> {
        self.registry.check_symmetry()
    }

    /// Waypoint lookup within one chunk.
    pub fn find(&self, chunk: ChunkId, point: Vec3, girth: f32, ignore_height: bool) -> Option<FindResult> {
        self.navigators.get(&chunk)?.find(&self.sets, point, girth, ignore_height)
    }

    /// Clip a point into a waypoint of a live set.
    pub fn clip_to_waypoint(&self, set: SetId, waypoint: usize, point: Vec3) -> Vec3 {
        match (self.waypoint(set, waypoint), self.set_chunk(set)) {
            (Some(wp), Some(chunk)) => wp.clip(chunk.bounding_box(), point),
            _ => point,
        }
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    /// Resolve boundary edges of the chunk's sets, and of sets in chunks with
    /// portals into it, against whatever neighbours are loaded now.
    #[profile]
    pub fn bind_chunk(&mut self, chunk: ChunkId) -> usize {
        let mut to_bind: Vec<SetId> = self.navigators.get(&chunk).map(|n| n.sets().to_vec()).unwrap_or_default();
        for other in self.chunks.values() {
            if other.id() != chunk && other.portals.iter().any(|p| p.neighbour == Some(chunk)) {
                if let Some(nav) = self.navigators.get(&other.id()) {
                    to_bind.extend_from_slice(nav.sets());
                }
            }
        }
        to_bind.into_iter().map(|set| self.bind_set(set)).sum()
    }

    /// Bind every set in the space.
    pub fn bind_all(&mut self) -> usize {
        let ids: Vec<SetId> = self.sets.keys().copied().collect();
        ids.into_iter().map(|set| self.bind_set(set)).sum()
    }

    /// Connect each boundary edge of `set` to the waypoint set of matching
    /// girth across the portal it crosses, replacing links from an earlier
    /// bind. Returns the number of edges labelled.
    pub fn bind_set(&mut self, id: SetId) -> usize {
        let Some(set) = self.sets.get(&id) else {
            return 0;
        };
        let Some(chunk) = self.chunks.get(&set.chunk()) else {
            return 0;
        };
        let data = Arc::clone(set.data());
        let girth = data.girth();
        let mut links: Vec<(SetId, PortalRef, usize)> = Vec::new();

        for (_, wp) in data.waypoints() {
            let avg_height = wp.avg_height() + HEIGHT_TOLERANCE;
            for (i, edge) in wp.edges().iter().enumerate() {
                if !edge.neighbour.is_unbound_boundary() {
                    continue;
                }
                let mid = (edge.start + wp.edge_end(i)) * 0.5;
                let mut world = Vec3::new(mid.x, avg_height, mid.y);
                let mut selected = self.select_portal(chunk, world);
                if selected.is_none() {
                    // Steep polygons can miss the portal at their average height.
                    world.y = wp.max_height() + HEIGHT_TOLERANCE;
                    selected = self.select_portal(chunk, world);
                }
                let Some((index, local)) = selected else {
                    continue;
                };
                let portal = &chunk.portals[index];
                let Some(neighbour) = portal.neighbour else {
                    continue;
                };
                let Some(nav) = self.navigators.get(&neighbour) else {
                    continue;
                };
                let target = chunk.transform().transform_point3(portal.project_to_plane(local));

                match nav.find(&self.sets, target, girth, false) {
                    Some(found) => links.push((
                        found.set,
                        PortalRef { chunk: chunk.id(), index },
                        wp.absolute_edge_index(i),
                    )),
                    None => {
                        if self.settings.log_unresolved_edges && nav.has_girth(&self.sets, girth) {
                            error!(
                                "[BIND] No adjacent set through portal from {} to {:?} with girth {}",
                                chunk.identifier(),
                                neighbour,
                                girth
                            );
                        }
                    }
                }
            }
        }

        let stale: Vec<SetId> = self.registry.connections(id).map(|(to, _)| to).collect();
        for to in stale {
            self.registry.disconnect(id, to);
        }
        let count = links.len();
        for (to, portal, edge) in links {
            self.registry.connect(id, to, portal, edge);
        }
        if let Some(set) = self.sets.get_mut(&id) {
            set.state = BindState::Bound;
        }
        count
    }

    /// Best portal of `chunk` for a boundary point, with the point in the
    /// chunk's local frame.
    fn select_portal(&self, chunk: &Chunk, world: Vec3) -> Option<(usize, Vec3)> {
        let local = chunk.transform_inverse().transform_point3(world);
        let mut best: Option<(usize, PortalCandidate<'_>)> = None;
        for (index, portal) in chunk.portals.iter().enumerate() {
            let Some(neighbour) = portal.neighbour.and_then(|id| self.chunks.get(&id)) else {
                continue;
            };
            if !neighbour.bounding_box().intersects(world) {
                continue;
            }
            let within_range = if neighbour.is_outside_chunk() { 0.0 } else { 1.0 };
            let candidate = PortalCandidate { portal, neighbour_volume: neighbour.volume() };
            if is_better_portal(best.map(|(_, c)| c), within_range, candidate, local) {
                best = Some((index, candidate));
            }
        }
        best.map(|(index, _)| (index, local))
    }
}
