use bevy::prelude::*;

use chunknav::chunk::{BoxFace, Chunk, ChunkId};
use chunknav::math::BoundingBox;
use chunknav::navigation::{Adjacency, NavLoc, NavSpace, NavigationPlugin, Navigator, WaypointSetBuilder, DEFAULT_GIRTH};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CHUNK_SIZE: f32 = 100.0;
const CHUNKS_PER_SIDE: u32 = 4;
const CELLS_PER_CHUNK: u32 = 4;
const HOLE_CHANCE: f64 = 0.15;
const AGENT_COUNT: usize = 64;
const AGENT_SPEED: f32 = 4.0;
const SOAK_TICKS: u64 = 2_000;

fn setup_file_logging() -> String {
    // Create logs directory if it doesn't exist
    let log_dir = PathBuf::from("logs");
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir).expect("Failed to create logs directory");
    }

    // Clean up old log files, keeping only the last 25
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("chunknav_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(
        Rotation::NEVER, // Don't rotate during a single run
        &log_dir,
        &log_filename,
    );

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,bevy_asset=warn,chunknav=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &PathBuf, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("chunknav") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

#[derive(Resource)]
struct SoakRng(StdRng);

#[derive(Resource, Default, Debug)]
struct SoakStats {
    ticks: u64,
    steps: u64,
    arrivals: u64,
    failures: u64,
}

#[derive(Component)]
struct Agent {
    loc: NavLoc,
    goal: NavLoc,
}

fn chunk_id(cx: u32, cz: u32) -> ChunkId {
    ChunkId(cz * CHUNKS_PER_SIDE + cx)
}

/// Outdoor chunk grid; each chunk holds one set of square cells with a few
/// knocked out as obstacles.
fn build_world(mut space: ResMut<NavSpace>, mut rng: ResMut<SoakRng>) {
    let cell = CHUNK_SIZE / CELLS_PER_CHUNK as f32;

    for cz in 0..CHUNKS_PER_SIDE {
        for cx in 0..CHUNKS_PER_SIDE {
            let origin = Vec3::new(cx as f32 * CHUNK_SIZE, -50.0, cz as f32 * CHUNK_SIZE);
            let bounds = BoundingBox::new(origin, origin + Vec3::new(CHUNK_SIZE, 100.0, CHUNK_SIZE));
            let mut chunk = Chunk::outdoor(chunk_id(cx, cz), format!("outdoor_{}_{}", cx, cz), bounds);
            if cx > 0 {
                chunk = chunk.with_face_portal(BoxFace::NegX, chunk_id(cx - 1, cz));
            }
            if cx + 1 < CHUNKS_PER_SIDE {
                chunk = chunk.with_face_portal(BoxFace::PosX, chunk_id(cx + 1, cz));
            }
            if cz > 0 {
                chunk = chunk.with_face_portal(BoxFace::NegZ, chunk_id(cx, cz - 1));
            }
            if cz + 1 < CHUNKS_PER_SIDE {
                chunk = chunk.with_face_portal(BoxFace::PosZ, chunk_id(cx, cz + 1));
            }
            space.add_chunk(chunk);

            let n = CELLS_PER_CHUNK as i32;
            let open: Vec<bool> = (0..n * n).map(|_| !rng.0.random_bool(HOLE_CHANCE)).collect();
            let mut index = vec![None; open.len()];
            let mut next = 0;
            for (i, is_open) in open.iter().enumerate() {
                if *is_open {
                    index[i] = Some(next);
                    next += 1;
                }
            }

            let mut builder = WaypointSetBuilder::new(DEFAULT_GIRTH).source(format!("soak/{}_{}", cx, cz));
            for j in 0..n {
                for i in 0..n {
                    if index[(j * n + i) as usize].is_none() {
                        continue;
                    }
                    let code = |di: i32, dj: i32, border: bool| -> Adjacency {
                        let (ni, nj) = (i + di, j + dj);
                        if ni < 0 || nj < 0 || ni >= n || nj >= n {
                            return if border { Adjacency::CHUNK_BOUNDARY } else { Adjacency::vista(0x111) };
                        }
                        match index[(nj * n + ni) as usize] {
                            Some(w) => Adjacency::waypoint(w),
                            None => Adjacency::vista(0x111),
                        }
                    };
                    let x = origin.x + i as f32 * cell;
                    let z = origin.z + j as f32 * cell;
                    // Clockwise: west, north, east, south edges.
                    builder.polygon(
                        0.0,
                        0.0,
                        &[
                            (x, z, code(-1, 0, cx > 0)),
                            (x, z + cell, code(0, 1, cz + 1 < CHUNKS_PER_SIDE)),
                            (x + cell, z + cell, code(1, 0, cx + 1 < CHUNKS_PER_SIDE)),
                            (x + cell, z, code(0, -1, cz > 0)),
                        ],
                    );
                }
            }
            if let Err(e) = space.add_set_data(chunk_id(cx, cz), builder.build()) {
                error!("[SPACE] Could not add soak set: {}", e);
            }
        }
    }

    let links = space.bind_all();
    info!("[SPACE] Soak world ready: {} sets, {} boundary edges bound", space.sets().count(), links);
}

fn random_loc(space: &NavSpace, rng: &mut StdRng) -> NavLoc {
    let extent = CHUNK_SIZE * CHUNKS_PER_SIDE as f32;
    let point = Vec3::new(rng.random_range(1.0..extent - 1.0), 0.0, rng.random_range(1.0..extent - 1.0));
    let mut loc = NavLoc::from_space(space, point, DEFAULT_GIRTH);
    loc.clip(space);
    loc
}

fn spawn_agents(mut commands: Commands, space: Res<NavSpace>, mut rng: ResMut<SoakRng>) {
    for _ in 0..AGENT_COUNT {
        let loc = random_loc(&space, &mut rng.0);
        let goal = random_loc(&space, &mut rng.0);
        commands.spawn((Agent { loc, goal }, Navigator::new()));
    }
}

fn step_agents(
    space: Res<NavSpace>,
    mut rng: ResMut<SoakRng>,
    mut stats: ResMut<SoakStats>,
    mut agents: Query<(&mut Agent, &mut Navigator)>,
) {
    for (mut agent, mut navigator) in agents.iter_mut() {
        if agent.loc.point().distance(agent.goal.point()) < 0.5 {
            stats.arrivals += 1;
            agent.goal = random_loc(&space, &mut rng.0);
            continue;
        }

        let Some(step) = navigator.find_path(&space, &agent.loc, &agent.goal, None, false) else {
            stats.failures += 1;
            agent.goal = random_loc(&space, &mut rng.0);
            continue;
        };
        stats.steps += 1;

        let here = agent.loc.point();
        let to = step.way.point() - here;
        // Reaching a hop means entering its waypoint, even on a shared edge.
        let loc = if to.length() <= AGENT_SPEED {
            step.way
        } else {
            NavLoc::guess(&space, &agent.loc, here + to.normalize() * AGENT_SPEED)
        };
        agent.loc = loc;
    }
}

fn check_soak_done(mut stats: ResMut<SoakStats>, mut exit: MessageWriter<AppExit>) {
    stats.ticks += 1;
    if stats.ticks % 500 == 0 {
        info!("[PERF] Soak tick {}: {:?}", stats.ticks, *stats);
    }
    if stats.ticks >= SOAK_TICKS {
        info!("Soak finished: {:?}", *stats);
        exit.write(AppExit::Success);
    }
}

fn main() {
    let log_file = setup_file_logging();
    println!("chunknav soak - logging to {}", log_file);

    App::new()
        .add_plugins(MinimalPlugins)
        .add_plugins(AssetPlugin::default())
        .add_plugins(NavigationPlugin)
        .insert_resource(SoakRng(StdRng::seed_from_u64(0x5EED)))
        .init_resource::<SoakStats>()
        .add_systems(PostStartup, (build_world, spawn_agents).chain())
        .add_systems(Update, (step_agents, check_soak_done).chain())
        .run();
}
