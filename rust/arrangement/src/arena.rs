// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based storage for the planar arrangement.
//!
//! The [`Arrangement`] owns vertices, half-edges and faces in slot maps with
//! stable keys. It is a doubly connected edge list: every half-edge knows its
//! origin, twin, successor and predecessor along its face, and the face on its
//! left. A face is bounded by one outer cycle (counter-clockwise) and any
//! number of hole cycles (clockwise). The unbounded face has no outer cycle.

use rooftop_geometry::Plane;
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::kernel::GridPoint;
use crate::keys::*;

/// Data stored for a vertex: an exact grid position.
#[derive(Debug, Clone)]
pub struct VertexData {
    pub point: GridPoint,
    /// One outgoing half-edge
    pub incident: HalfEdgeKey,
}

/// Data stored for a half-edge.
#[derive(Debug, Clone)]
pub struct HalfEdgeData {
    pub origin: VertexKey,
    pub twin: HalfEdgeKey,
    pub next: HalfEdgeKey,
    pub prev: HalfEdgeKey,
    /// Face on the left
    pub face: FaceKey,
    /// For footprint boundary edges, whether the footprint interior lies on
    /// the left. `None` for roof lines.
    pub footprint_interior_left: Option<bool>,
}

/// Label assigned to a face by the optimiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FaceLabel {
    #[default]
    Unlabeled,
    /// Roof plane with the given cluster id
    Plane(usize),
    Ground,
}

impl FaceLabel {
    pub fn plane_id(&self) -> Option<usize> {
        match self {
            FaceLabel::Plane(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, FaceLabel::Ground)
    }
}

/// Elevation percentiles of the heightfield samples covered by a face.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElevationStats {
    pub h_50p: f32,
    pub h_70p: f32,
    pub h_min: f32,
    pub h_max: f32,
    /// Number of heightfield cells that contributed
    pub samples: usize,
}

/// Per-face payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceInfo {
    /// Face lies inside the building footprint
    pub in_footprint: bool,
    pub label: FaceLabel,
    /// Plane equation of the assigned label, if any
    pub plane: Option<Plane>,
    pub elevation: Option<ElevationStats>,
}

/// Data stored for a face.
#[derive(Debug, Clone)]
pub struct FaceData {
    /// One half-edge of the outer cycle; `None` for the unbounded face
    pub outer: Option<HalfEdgeKey>,
    /// One half-edge of every hole cycle
    pub holes: Vec<HalfEdgeKey>,
    pub info: FaceInfo,
}

/// Exact planar subdivision of a building footprint.
///
/// Cloning is cheap enough to keep one pristine labeled copy and edit a clone
/// per level of detail.
#[derive(Debug, Clone)]
pub struct Arrangement {
    pub(crate) vertices: SlotMap<VertexKey, VertexData>,
    pub(crate) half_edges: SlotMap<HalfEdgeKey, HalfEdgeData>,
    pub(crate) faces: SlotMap<FaceKey, FaceData>,
    pub(crate) unbounded: FaceKey,
}

impl Arrangement {
    /// Arrangement with only the unbounded face.
    pub(crate) fn empty() -> Self {
        let mut faces = SlotMap::with_key();
        let unbounded = faces.insert(FaceData {
            outer: None,
            holes: Vec::new(),
            info: FaceInfo::default(),
        });
        Self {
            vertices: SlotMap::with_key(),
            half_edges: SlotMap::with_key(),
            faces,
            unbounded,
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn half_edge_count(&self) -> usize {
        self.half_edges.len()
    }

    /// Number of faces, including the unbounded face
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn unbounded_face(&self) -> FaceKey {
        self.unbounded
    }

    /// All face keys in insertion order
    pub fn faces(&self) -> impl Iterator<Item = FaceKey> + '_ {
        self.faces.keys()
    }

    /// Bounded faces inside the footprint, in insertion order
    pub fn footprint_faces(&self) -> impl Iterator<Item = FaceKey> + '_ {
        self.faces
            .iter()
            .filter(|(_, f)| f.info.in_footprint)
            .map(|(k, _)| k)
    }

    pub fn face(&self, key: FaceKey) -> Result<&FaceData> {
        self.faces.get(key).ok_or(Error::FaceNotFound(key))
    }

    pub fn face_info(&self, key: FaceKey) -> Result<&FaceInfo> {
        Ok(&self.face(key)?.info)
    }

    pub fn face_info_mut(&mut self, key: FaceKey) -> Result<&mut FaceInfo> {
        self.faces
            .get_mut(key)
            .map(|f| &mut f.info)
            .ok_or(Error::FaceNotFound(key))
    }

    pub fn half_edge(&self, key: HalfEdgeKey) -> Result<&HalfEdgeData> {
        self.half_edges.get(key).ok_or(Error::HalfEdgeNotFound(key))
    }

    /// Origin and destination of a half-edge
    pub fn endpoints(&self, key: HalfEdgeKey) -> Result<(GridPoint, GridPoint)> {
        let he = self.half_edge(key)?;
        let twin = self.half_edge(he.twin)?;
        Ok((self.point(he.origin)?, self.point(twin.origin)?))
    }

    pub(crate) fn point(&self, key: VertexKey) -> Result<GridPoint> {
        self.vertices
            .get(key)
            .map(|v| v.point)
            .ok_or_else(|| Error::Inconsistent(format!("missing vertex {key:?}")))
    }

    /// Half-edges of the cycle starting at `start`, following `next`
    pub fn cycle(&self, start: HalfEdgeKey) -> Result<Vec<HalfEdgeKey>> {
        let mut cycle = Vec::new();
        let mut h = start;
        loop {
            cycle.push(h);
            h = self.half_edge(h)?.next;
            if h == start {
                break;
            }
            if cycle.len() > self.half_edges.len() {
                return Err(Error::Inconsistent("half-edge cycle does not close".to_string()));
            }
        }
        Ok(cycle)
    }

    /// Vertex positions of the cycle starting at `start`
    pub fn cycle_points(&self, start: HalfEdgeKey) -> Result<Vec<GridPoint>> {
        self.cycle(start)?
            .into_iter()
            .map(|h| self.point(self.half_edge(h)?.origin))
            .collect()
    }
}
