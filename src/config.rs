use std::time::Duration;

use bevy::prelude::*;
use bevy_common_assets::ron::RonAssetPlugin;
use serde::{Deserialize, Serialize};

use crate::navigation::{NavSettings, NavSpace, SearchLimits, GIRTH_GRID_SIZE, GRID_RESOLUTION};

pub const NAV_CONFIG_PATH: &str = "assets/nav_config.ron";
pub const NAV_TUNING_ASSET: &str = "nav_tuning.ron";

/// Static navigation configuration, read once at startup. Grid layout is
/// baked into every chunk navigator, so it cannot change afterwards.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    pub girth_grid_size: usize,
    pub use_girth_grids: bool,
    pub grid_resolution: f32,
    pub max_search_iterations: usize,
    /// Wall-clock budget for the set-level search.
    pub search_time_limit_ms: Option<u64>,
    pub revisit_warning_threshold: u32,
    pub log_unresolved_edges: bool,
}

impl Default for NavConfig {
    fn default() -> Self {
        let search = SearchLimits::default();
        Self {
            girth_grid_size: GIRTH_GRID_SIZE,
            use_girth_grids: true,
            grid_resolution: GRID_RESOLUTION,
            max_search_iterations: search.max_iterations,
            search_time_limit_ms: None,
            revisit_warning_threshold: search.revisit_threshold,
            log_unresolved_edges: true,
        }
    }
}

impl NavConfig {
    /// Read a config file, falling back to defaults with an error log.
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match ron::from_str::<NavConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded nav config from {}", path);
                    config
                }
                Err(e) => {
                    error!("Failed to parse nav config: {}", e);
                    error!("Using default NavConfig");
                    NavConfig::default()
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                error!("Using default NavConfig");
                NavConfig::default()
            }
        }
    }

    pub fn settings(&self) -> NavSettings {
        NavSettings {
            girth_grid_size: self.girth_grid_size,
            use_girth_grids: self.use_girth_grids,
            grid_resolution: self.grid_resolution,
            log_unresolved_edges: self.log_unresolved_edges,
            search: SearchLimits {
                max_iterations: self.max_search_iterations,
                time_limit: self.search_time_limit_ms.map(Duration::from_millis),
                revisit_threshold: self.revisit_warning_threshold,
            },
        }
    }
}

/// Settings that may be changed while the server runs.
#[derive(Deserialize, Serialize, Asset, TypePath, Clone, Debug, PartialEq)]
pub struct NavTuning {
    pub search_time_limit_ms: Option<u64>,
    pub log_unresolved_edges: bool,
}

impl NavTuning {
    pub fn apply(&self, settings: &mut NavSettings) {
        settings.search.time_limit = self.search_time_limit_ms.map(Duration::from_millis);
        settings.log_unresolved_edges = self.log_unresolved_edges;
    }
}

#[derive(Resource)]
pub struct NavTuningHandle(pub Handle<NavTuning>);

pub struct NavConfigPlugin;

impl Plugin for NavConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<NavTuning>::new(&[NAV_TUNING_ASSET]))
            .add_systems(Startup, (load_nav_config, setup_nav_tuning).chain())
            .add_systems(Update, apply_nav_tuning);
    }
}

/// Load static configuration synchronously; everything built on the
/// navigation space depends on it.
pub(crate) fn load_nav_config(mut commands: Commands) {
    commands.insert_resource(NavConfig::load_or_default(NAV_CONFIG_PATH));
}

fn setup_nav_tuning(mut commands: Commands, asset_server: Res<AssetServer>) {
    let handle = asset_server.load(NAV_TUNING_ASSET);
    commands.insert_resource(NavTuningHandle(handle));
}

/// Copy a freshly loaded or edited tuning asset into the live space.
pub fn apply_nav_tuning(
    handle: Option<Res<NavTuningHandle>>,
    tunings: Res<Assets<NavTuning>>,
    mut events: MessageReader<AssetEvent<NavTuning>>,
    space: Option<ResMut<NavSpace>>,
) {
    let (Some(handle), Some(mut space)) = (handle, space) else {
        return;
    };
    for event in events.read() {
        if event.is_modified(handle.0.id()) || event.is_loaded_with_dependencies(handle.0.id()) {
            if let Some(tuning) = tunings.get(&handle.0) {
                tuning.apply(space.settings_mut());
                info!("Nav tuning loaded/updated: {:?}", tuning);
            }
        }
    }
}
