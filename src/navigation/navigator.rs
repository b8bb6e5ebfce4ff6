use bevy::prelude::*;
use chunknav_macros::profile;

use super::astar::{AStar, SearchLimits, SearchState, SearchStats};
use super::nav_loc::NavLoc;
use super::search_states::{SetSearchContext, SetState, WaypointState};
use super::space::NavSpace;
use crate::math::almost_zero;

/// Hops shorter than this are dropped from cached paths.
const ZERO_HOP: f32 = 1e-4;

/// Next hop returned by [`Navigator::find_path`].
#[derive(Clone, Debug, PartialEq)]
pub struct PathStep {
    pub way: NavLoc,
    /// The step leaves the source set through an activated portal (a door).
    pub passed_activated_portal: bool,
}

/// A remembered search result, stored goal-first so the current start sits at
/// the back.
#[derive(Debug, Clone)]
pub struct PathCache<S> {
    path: Vec<S>,
}

impl<S> Default for PathCache<S> {
    fn default() -> Self {
        Self { path: Vec::new() }
    }
}

impl<S: SearchState> PathCache<S> {
    /// Next state after `start` if the cached path runs from `start` to `goal`.
    /// A path whose start is one step behind `start` is advanced first.
    pub fn find(&mut self, start: &S, goal: &S) -> Option<&S> {
        let matches = |path: &[S]| {
            path.len() >= 2
                && path.first().is_some_and(|g| g.key() == goal.key())
                && path.last().is_some_and(|s| s.key() == start.key())
        };
        if !matches(&self.path) {
            self.path.pop();
            if !matches(&self.path) {
                self.path.clear();
                return None;
            }
        }
        self.path.get(self.path.len() - 2)
    }

    /// Remember a forward path and return the state after its start.
    pub fn save<'a>(&mut self, forward: impl Iterator<Item = &'a S>) -> Option<&S>
    where
        S: 'a,
    {
        self.path.clear();
        let mut last = None;
        for (i, state) in forward.enumerate() {
            if i == 0 || !almost_zero(state.distance_from_parent(), ZERO_HOP) {
                self.path.push(state.clone());
                last = None;
            } else {
                last = Some(state);
            }
        }
        if self.path.len() < 2 {
            self.path.extend(last.cloned());
        }
        self.path.reverse();
        if self.path.len() < 2 {
            self.path.clear();
            return None;
        }
        self.path.get(self.path.len() - 2)
    }

    pub fn clear(&mut self) {
        self.path.clear();
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Cached states from the start onwards.
    pub fn iter(&self) -> impl Iterator<Item = &S> + '_ {
        self.path.iter().rev()
    }
}

/// Per-navigator memory of the last set-level and waypoint-level paths.
#[derive(Debug, Clone, Default)]
pub struct NavigatorCache {
    sets: PathCache<SetState>,
    waypoints: PathCache<WaypointState>,
    block_non_permissive: bool,
}

/// Pathfinding front end owned by one moving entity.
#[derive(Component, Debug, Default)]
pub struct Navigator {
    cache: NavigatorCache,
    set_search: AStar<SetState>,
    waypoint_search: AStar<WaypointState>,
    infinite_loop_problem: bool,
    last_search_stats: SearchStats,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next hop from `src` toward `dst`.
    ///
    /// `max_distance` bounds the accumulated path cost; waypoint searches
    /// inside a set only honour it when smaller than a chunk. Returns `None` when
    /// either end is unresolved or no path exists.
    #[profile(2)]
    pub fn find_path(
        &mut self,
        space: &NavSpace,
        src: &NavLoc,
        dst: &NavLoc,
        max_distance: Option<f32>,
        block_non_permissive: bool,
    ) -> Option<PathStep> {
        self.infinite_loop_problem = false;
        let (Some(src_set), Some(dst_set)) = (src.set(), dst.set()) else {
            return None;
        };
        if !space.is_set_live(src_set) || !space.is_set_live(dst_set) {
            return None;
        }
        let src_waypoint = src
            .waypoint()
            .or_else(|| space.set(src_set)?.data().find(src.point(), true))?;
        let dst_waypoint = dst.waypoint()?;
        // In-set searches only honour bounds smaller than a chunk.
        let bound = max_distance.filter(|d| *d <= space.settings().grid_resolution);

        if src_set == dst_set {
            if src_waypoint == dst_waypoint {
                return Some(PathStep { way: dst.clone(), passed_activated_portal: false });
            }
            let goal = WaypointState::new(dst_set, Some(dst_waypoint), dst.point());
            let next = self.waypoint_step(space, src, src_waypoint, dst, goal, bound)?;
            return Some(PathStep {
                way: NavLoc::from_parts(next.set, next.waypoint, next.point, src.girth()),
                passed_activated_portal: false,
            });
        }

        let next_set = self.set_step(space, src, dst, max_distance, block_non_permissive)?;
        let goal = WaypointState::new(next_set.set, None, dst.point());
        let next = self.waypoint_step(space, src, src_waypoint, dst, goal, bound)?;
        Some(PathStep {
            passed_activated_portal: next.set != src_set && next_set.passed_activated_portal,
            way: NavLoc::from_parts(next.set, next.waypoint, next.point, src.girth()),
        })
    }

    fn set_step(
        &mut self,
        space: &NavSpace,
        src: &NavLoc,
        dst: &NavLoc,
        max_distance: Option<f32>,
        block_non_permissive: bool,
    ) -> Option<SetState> {
        let (src_set, dst_set) = (src.set()?, dst.set()?);
        if self.cache.block_non_permissive != block_non_permissive {
            self.cache.sets.clear();
            self.cache.block_non_permissive = block_non_permissive;
        }

        let start = SetState::new(src_set, src.point());
        let goal = SetState::new(dst_set, dst.point());
        if let Some(next) = self.cache.sets.find(&start, &goal) {
            if space.is_set_live(next.set) {
                return Some(next.clone());
            }
            self.cache.sets.clear();
        }

        let ctx = SetSearchContext { space, block_non_permissive };
        let found = self.set_search.search(&ctx, start, &goal, max_distance, &space.settings().search);
        self.last_search_stats = self.set_search.stats();
        let looping = self.set_search.infinite_loop_problem();
        self.set_search.clear_infinite_loop_problem();
        self.note_loop(space, src, dst, looping);
        if !found {
            if self.set_search.timed_out() {
                debug!("[NAVIGATOR] Set search from {} to {} ran out of time", src, dst);
            }
            return None;
        }

        let crosses_shell = self.set_search.path().any(|s| s.passed_shell_boundary);
        let next = self.cache.sets.save(self.set_search.path()).cloned();
        if crosses_shell {
            // Doors and shells change state; never reuse such a route.
            self.cache.sets.clear();
        }
        next
    }

    fn waypoint_step(
        &mut self,
        space: &NavSpace,
        src: &NavLoc,
        src_waypoint: usize,
        dst: &NavLoc,
        goal: WaypointState,
        max_cost: Option<f32>,
    ) -> Option<WaypointState> {
        let start = WaypointState::new(src.set()?, Some(src_waypoint), src.point());
        if let Some(next) = self.cache.waypoints.find(&start, &goal) {
            if space.is_set_live(next.set) {
                return Some(next.clone());
            }
            self.cache.waypoints.clear();
        }

        let limits = SearchLimits { time_limit: None, ..space.settings().search.clone() };
        let found = self.waypoint_search.search(space, start, &goal, max_cost, &limits);
        self.last_search_stats = self.waypoint_search.stats();
        let looping = self.waypoint_search.infinite_loop_problem();
        self.waypoint_search.clear_infinite_loop_problem();
        self.note_loop(space, src, dst, looping);
        if !found {
            return None;
        }
        self.cache.waypoints.save(self.waypoint_search.path()).cloned()
    }

    fn note_loop(&mut self, space: &NavSpace, src: &NavLoc, dst: &NavLoc, looping: bool) {
        if looping && !self.infinite_loop_problem {
            error!(
                "[NAVIGATOR] Search looks stuck in a loop from {} to {}",
                src.desc(space),
                dst.desc(space)
            );
            self.infinite_loop_problem = true;
        }
    }

    /// Cached waypoint path from the current start, for debug drawing.
    pub fn waypoint_path(&self) -> impl Iterator<Item = &WaypointState> + '_ {
        self.cache.waypoints.iter()
    }

    /// Length of the cached set-level path.
    pub fn way_set_path_len(&self) -> usize {
        self.cache.sets.len()
    }

    pub fn clear_set_cache(&mut self) {
        self.cache.sets.clear();
    }

    pub fn clear_waypoint_cache(&mut self) {
        self.cache.waypoints.clear();
    }

    /// Whether a search during the last `find_path` overran its iteration cap
    /// or kept reopening nodes. Holds until the next `find_path`.
    pub fn infinite_loop_problem(&self) -> bool {
        self.infinite_loop_problem
    }

    pub fn last_search_stats(&self) -> SearchStats {
        self.last_search_stats
    }
}
