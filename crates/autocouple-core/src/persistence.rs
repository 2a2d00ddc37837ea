//! Save/Load of tracked links
//!
//! Links are stored per assembly as pairs of `(segment index, point index)`
//! where the segment index is a position in the assembly's segment list
//! (`Scene::assembly_segments`, entity order). Loading into an assembly with
//! the same segment ordering reproduces the same links. Indices that no
//! longer resolve are dropped with a warning.
//!
//! bincode is the save format; JSON is available for inspection.

use crate::components::{AssemblyId, PointRef};
use crate::manager::TrackingManager;
use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Version number for the link format (increment when format changes)
pub const LINKS_VERSION: u32 = 1;

/// One end of a saved link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedEnd {
    pub segment: u32,
    pub point: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPair {
    pub a: SavedEnd,
    pub b: SavedEnd,
}

/// Serializable link state of one assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedLinks {
    /// Save format version
    pub version: u32,
    pub pairs: Vec<SavedPair>,
}

impl Default for SavedLinks {
    fn default() -> Self {
        Self {
            version: LINKS_VERSION,
            pairs: Vec::new(),
        }
    }
}

impl SavedLinks {
    /// Snapshot the links of `manager`'s assembly.
    pub fn capture(scene: &Scene, manager: &TrackingManager) -> Self {
        let segments = scene.assembly_segments(manager.assembly());
        let end = |p: PointRef| {
            segments.iter().position(|&s| s == p.segment).map(|i| SavedEnd {
                segment: i as u32,
                point: p.index as u32,
            })
        };

        let mut pairs = Vec::new();
        for (a, b) in manager.hidden_pairs() {
            match (end(a), end(b)) {
                (Some(a), Some(b)) => pairs.push(SavedPair { a, b }),
                _ => log::warn!("Not saving link {:?} <-> {:?}: outside {}", a, b, manager.assembly()),
            }
        }
        Self {
            version: LINKS_VERSION,
            pairs,
        }
    }

    /// Map saved indices onto the live segments of `assembly`.
    pub fn resolve(&self, scene: &Scene, assembly: AssemblyId) -> Vec<(PointRef, PointRef)> {
        let segments = scene.assembly_segments(assembly);
        let end = |e: SavedEnd| {
            let segment = *segments.get(e.segment as usize)?;
            let point = PointRef::new(segment, e.point as usize);
            scene.point(point).map(|_| point)
        };

        self.pairs
            .iter()
            .filter_map(|pair| match (end(pair.a), end(pair.b)) {
                (Some(a), Some(b)) => Some((a, b)),
                _ => {
                    log::warn!("Dropping unresolvable saved link {:?} in {}", pair, assembly);
                    None
                }
            })
            .collect()
    }
}

/// Write link state to a writer
pub fn save_links<W: Write>(writer: W, links: &SavedLinks) -> Result<(), SaveError> {
    bincode::serialize_into(writer, links)?;
    Ok(())
}

/// Read link state from a reader
pub fn load_links<R: Read>(reader: R) -> Result<SavedLinks, SaveError> {
    let links: SavedLinks = bincode::deserialize_from(reader)?;
    check_version(links)
}

pub fn to_json(links: &SavedLinks) -> Result<String, SaveError> {
    Ok(serde_json::to_string_pretty(links)?)
}

pub fn from_json(text: &str) -> Result<SavedLinks, SaveError> {
    let links: SavedLinks = serde_json::from_str(text)?;
    check_version(links)
}

fn check_version(links: SavedLinks) -> Result<SavedLinks, SaveError> {
    if links.version != LINKS_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: LINKS_VERSION,
            found: links.version,
        });
    }
    Ok(links)
}

/// Errors that can occur during save/load
#[derive(Debug)]
pub enum SaveError {
    Io(std::io::Error),
    Bincode(Box<bincode::ErrorKind>),
    Json(serde_json::Error),
    VersionMismatch { expected: u32, found: u32 },
}

impl From<std::io::Error> for SaveError {
    fn from(e: std::io::Error) -> Self {
        SaveError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for SaveError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        match *e {
            bincode::ErrorKind::Io(io) => SaveError::Io(io),
            other => SaveError::Bincode(Box::new(other)),
        }
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(e: serde_json::Error) -> Self {
        SaveError::Json(e)
    }
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Io(e) => write!(f, "IO error: {}", e),
            SaveError::Bincode(e) => write!(f, "Serialization error: {}", e),
            SaveError::Json(e) => write!(f, "JSON error: {}", e),
            SaveError::VersionMismatch { expected, found } => {
                write!(f, "Link format version mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for SaveError {}
