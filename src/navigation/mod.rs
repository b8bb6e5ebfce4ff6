//! Chunked navmesh pathfinding.
//!
//! Each chunk carries waypoint sets (one per girth) of convex polygons.
//! Sets are tossed into a [`NavSpace`], bound to their neighbours across
//! chunk portals, and searched by a [`Navigator`] in two levels: first over
//! connected sets, then over waypoints toward the next set.

mod astar;
mod chunk_navigator;
mod connections;
mod nav_loc;
mod navigator;
mod search_states;
mod set_data;
mod situation;
mod space;
mod types;
mod waypoint;
mod waypoint_set;


// ============================================================================
// PUBLIC API
// ============================================================================

pub use astar::{AStar, SearchLimits, SearchState, SearchStats};
pub use chunk_navigator::ChunkNavigator;
pub use connections::{ConnectionRegistry, SymmetryViolation};
pub use nav_loc::NavLoc;
pub use navigator::{NavigatorCache, Navigator, PathCache, PathStep};
pub use search_states::{SetSearchContext, SetState, WaypointState};
pub use set_data::{ReleaseHook, WaypointSetBuilder, WaypointSetData};
pub use situation::find_situation_ahead;
pub use space::{NavSettings, NavSpace};
pub use types::{
    Adjacency, Edge, FindResult, SetId, AUTHORED_CHUNK_ADJACENT, CHUNK_ADJACENT_CODE, DEFAULT_GIRTH,
    GIRTH_GRID_SIZE, GRID_RESOLUTION, HEIGHT_TOLERANCE, MAX_WAYPOINT_CODE,
};
pub use waypoint::{Waypoint, WaypointRecord};
pub use waypoint_set::{BindState, ChunkWaypointSet};

use bevy::prelude::*;

use crate::config::{NavConfig, NavConfigPlugin};

/// Registers configuration and a [`NavSpace`] built from it.
pub struct NavigationPlugin;

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(NavConfigPlugin)
            .add_systems(Startup, setup_nav_space.after(crate::config::load_nav_config));
    }
}

fn setup_nav_space(mut commands: Commands, config: Option<Res<NavConfig>>) {
    let settings = config.map(|c| c.settings()).unwrap_or_default();
    info!("[SPACE] Navigation space ready (grid {}x{})", settings.girth_grid_size, settings.girth_grid_size);
    commands.insert_resource(NavSpace::new(settings));
}
