use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::error::NavmeshError;
use crate::navigation::{Adjacency, Edge, WaypointSetBuilder, WaypointSetData};

/// Only layout version understood by the loader.
pub const NAVMESH_SET_VERSION: u32 = 0;

/// On-disk navmesh: every set a chunk carries, one per girth.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NavmeshResource {
    pub sets: Vec<NavPolySetRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NavPolySetRecord {
    pub version: u32,
    pub girth: f32,
    pub polys: Vec<NavPolyRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NavPolyRecord {
    pub min_height: f32,
    pub max_height: f32,
    pub edges: SmallVec<[EdgeRecord; 4]>,
}

/// Edge start on the XZ plane plus its raw adjacency code.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EdgeRecord {
    pub x: f32,
    pub z: f32,
    pub adjacency: u32,
}

impl NavmeshResource {
    /// Load from disk: `.ron` files are text, anything else gzip'd bincode.
    pub fn load(path: &Path) -> Result<Self, NavmeshError> {
        let bytes = std::fs::read(path).map_err(|source| NavmeshError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if path.extension().and_then(|e| e.to_str()) == Some("ron") {
            let text = String::from_utf8_lossy(&bytes);
            Self::from_ron_str(&text)
        } else {
            Self::decode(&bytes)
        }
    }

    pub fn from_ron_str(text: &str) -> Result<Self, NavmeshError> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron_string(&self) -> Result<String, NavmeshError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NavmeshError> {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).map_err(stream_error)?;
        Ok(bincode::deserialize(&raw)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>, NavmeshError> {
        let raw = bincode::serialize(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).map_err(stream_error)?;
        encoder.finish().map_err(stream_error)
    }

    /// Snapshot existing sets into the resource layout.
    pub fn from_sets<'a>(sets: impl IntoIterator<Item = &'a WaypointSetData>) -> Self {
        let sets = sets
            .into_iter()
            .map(|data| NavPolySetRecord {
                version: NAVMESH_SET_VERSION,
                girth: data.girth(),
                polys: data
                    .waypoints()
                    .map(|(_, wp)| NavPolyRecord {
                        min_height: wp.min_height(),
                        max_height: wp.max_height(),
                        edges: wp
                            .edges()
                            .iter()
                            .map(|e| EdgeRecord { x: e.start.x, z: e.start.y, adjacency: e.neighbour.0 })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Self { sets }
    }

    /// Build the in-memory sets, all tagged with `source`.
    pub fn into_set_data(self, source: &str) -> Result<Vec<WaypointSetData>, NavmeshError> {
        self.sets.iter().map(|set| set.to_set_data(source)).collect()
    }
}

fn stream_error(source: std::io::Error) -> NavmeshError {
    NavmeshError::Io { path: "<navmesh stream>".to_string(), source }
}

impl NavPolySetRecord {
    pub fn to_set_data(&self, source: &str) -> Result<WaypointSetData, NavmeshError> {
        if self.version != NAVMESH_SET_VERSION {
            return Err(NavmeshError::UnsupportedVersion(self.version));
        }

        let count = self.polys.len();
        let mut builder = WaypointSetBuilder::new(self.girth).source(source);
        for (index, poly) in self.polys.iter().enumerate() {
            if poly.edges.len() < 3 {
                return Err(NavmeshError::DegeneratePolygon { waypoint: index, edges: poly.edges.len() });
            }
            for (edge, record) in poly.edges.iter().enumerate() {
                let adjacency = Adjacency(record.adjacency);
                if let Some(neighbour) = adjacency.neighbouring_waypoint() {
                    if neighbour >= count {
                        return Err(NavmeshError::UnknownNeighbour {
                            neighbour: neighbour as i64,
                            edge,
                            waypoint: index,
                        });
                    }
                }
            }
            builder.waypoint(
                poly.min_height,
                poly.max_height,
                poly.edges.iter().map(|e| Edge::new(e.x, e.z, Adjacency(e.adjacency))),
            );
        }
        Ok(builder.build())
    }
}
