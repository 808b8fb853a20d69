// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric queries on faces and edges: rings, areas, shared boundary
//! lengths and per-face boundary walks.

use std::collections::BTreeMap;

use rooftop_geometry::{LinearRing, Point2};

use crate::arena::Arrangement;
use crate::error::Result;
use crate::kernel::{ring_area2, GridPoint, GRID_RESOLUTION};
use crate::keys::*;

/// One directed edge as seen from the face on its left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeView {
    pub half_edge: HalfEdgeKey,
    pub source: GridPoint,
    pub target: GridPoint,
    /// Face on the left
    pub face: FaceKey,
    /// Face on the right
    pub twin_face: FaceKey,
    pub footprint_interior_left: Option<bool>,
}

impl EdgeView {
    pub fn length(&self) -> f64 {
        (self.target.to_point() - self.source.to_point()).norm()
    }
}

impl Arrangement {
    /// Grid rings of a face, outer ring first (empty for the unbounded face)
    pub fn face_rings(&self, face: FaceKey) -> Result<Vec<Vec<GridPoint>>> {
        self.face_cycles(face)?
            .into_iter()
            .map(|start| self.cycle_points(start))
            .collect()
    }

    /// Face boundary as a polygon in coordinate units.
    ///
    /// The outer ring is counter-clockwise and holes are clockwise.
    pub fn face_polygon(&self, face: FaceKey) -> Result<LinearRing> {
        let data = self.face(face)?;
        let to_points =
            |ring: Vec<GridPoint>| -> Vec<Point2<f64>> { ring.into_iter().map(GridPoint::to_point).collect() };
        let outer = match data.outer {
            Some(start) => to_points(self.cycle_points(start)?),
            None => Vec::new(),
        };
        let mut holes = Vec::with_capacity(data.holes.len());
        for &start in &data.holes {
            holes.push(to_points(self.cycle_points(start)?));
        }
        Ok(LinearRing {
            outer,
            interiors: holes,
        })
    }

    /// Exact face area (outer minus holes) in squared coordinate units
    pub fn face_area(&self, face: FaceKey) -> Result<f64> {
        let data = self.face(face)?;
        let Some(outer) = data.outer else {
            return Ok(0.0);
        };
        let mut area2 = ring_area2(&self.cycle_points(outer)?);
        for &start in &data.holes {
            // Hole cycles run clockwise, so their area is negative
            area2 += ring_area2(&self.cycle_points(start)?);
        }
        Ok(area2 as f64 * 0.5 * GRID_RESOLUTION * GRID_RESOLUTION)
    }

    /// Sum of the areas of all faces inside the footprint
    pub fn footprint_area(&self) -> Result<f64> {
        self.footprint_faces()
            .map(|f| self.face_area(f))
            .sum()
    }

    /// Boundary of a face as edge views, one list per cycle, outer first
    pub fn face_boundary(&self, face: FaceKey) -> Result<Vec<Vec<EdgeView>>> {
        self.face_cycles(face)?
            .into_iter()
            .map(|start| {
                self.cycle(start)?
                    .into_iter()
                    .map(|h| self.edge_view(h))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    /// Every undirected edge once, oriented along its lower half-edge key
    pub fn edges(&self) -> Result<Vec<EdgeView>> {
        let mut edges = Vec::with_capacity(self.half_edges.len() / 2);
        for (h, data) in &self.half_edges {
            if h < data.twin {
                edges.push(self.edge_view(h)?);
            }
        }
        Ok(edges)
    }

    /// Length of the boundary shared by each pair of distinct footprint
    /// faces, keyed by the ordered face pair
    pub fn adjacency(&self) -> Result<BTreeMap<(FaceKey, FaceKey), f64>> {
        let mut shared = BTreeMap::new();
        for edge in self.edges()? {
            if edge.face == edge.twin_face {
                continue;
            }
            let inside = |f: FaceKey| -> Result<bool> { Ok(self.face_info(f)?.in_footprint) };
            if !inside(edge.face)? || !inside(edge.twin_face)? {
                continue;
            }
            let key = if edge.face < edge.twin_face {
                (edge.face, edge.twin_face)
            } else {
                (edge.twin_face, edge.face)
            };
            *shared.entry(key).or_insert(0.0) += edge.length();
        }
        Ok(shared)
    }

    pub fn edge_view(&self, h: HalfEdgeKey) -> Result<EdgeView> {
        let data = self.half_edge(h)?;
        let twin = self.half_edge(data.twin)?;
        let (source, target) = self.endpoints(h)?;
        Ok(EdgeView {
            half_edge: h,
            source,
            target,
            face: data.face,
            twin_face: twin.face,
            footprint_interior_left: data.footprint_interior_left,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::GridSegment;
    use approx::assert_relative_eq;

    fn split_square() -> Arrangement {
        let ring = LinearRing::rectangle(0.0, 0.0, 10.0, 6.0);
        let line = GridSegment::snap(&Point2::new(4.0, -1.0), &Point2::new(4.0, 7.0)).unwrap();
        Arrangement::build(&ring, &[line]).unwrap()
    }

    #[test]
    fn face_areas_sum_to_footprint() {
        let arr = split_square();
        let mut areas: Vec<f64> = arr
            .footprint_faces()
            .map(|f| arr.face_area(f).unwrap())
            .collect();
        areas.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(areas[0], 24.0, epsilon = 1e-9);
        assert_relative_eq!(areas[1], 36.0, epsilon = 1e-9);
        assert_relative_eq!(arr.footprint_area().unwrap(), 60.0, epsilon = 1e-9);
    }

    #[test]
    fn shared_edge_length() {
        let arr = split_square();
        let adjacency = arr.adjacency().unwrap();
        assert_eq!(adjacency.len(), 1);
        let length = adjacency.values().next().copied().unwrap();
        assert_relative_eq!(length, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn face_polygon_is_counter_clockwise() {
        let arr = split_square();
        for face in arr.footprint_faces() {
            let polygon = arr.face_polygon(face).unwrap();
            assert_eq!(polygon.outer.len(), 4);
            assert!(rooftop_geometry::profile::signed_area(&polygon.outer) > 0.0);
        }
    }

    #[test]
    fn boundary_walk_reports_neighbours() {
        let arr = split_square();
        let face = arr.footprint_faces().next().unwrap();
        let boundary = arr.face_boundary(face).unwrap();
        assert_eq!(boundary.len(), 1);
        let outside = boundary[0]
            .iter()
            .filter(|e| e.twin_face == arr.unbounded_face())
            .count();
        assert_eq!(outside, 3);
        assert!(boundary[0].iter().all(|e| e.face == face));
    }
}
