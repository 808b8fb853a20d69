// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology cleanup after dissolving.

use std::collections::BTreeMap;

use crate::arena::Arrangement;
use crate::construction::{prune_dangling, Piece};
use crate::error::Result;
use crate::kernel::{orient, GridPoint};

impl Arrangement {
    /// Drop dangling roof edges and merge collinear edge chains through
    /// vertices of degree two.
    ///
    /// Face payloads are carried over unchanged; the face set and the area of
    /// every face stay the same.
    pub fn snap(&mut self) -> Result<()> {
        let pieces = prune_dangling(self.pieces()?);

        let mut slots: Vec<Option<Piece>> = pieces.into_iter().map(Some).collect();
        let mut incident: BTreeMap<GridPoint, Vec<usize>> = BTreeMap::new();
        for (i, piece) in slots.iter().enumerate() {
            if let Some(p) = piece {
                incident.entry(p.segment.source).or_default().push(i);
                incident.entry(p.segment.target).or_default().push(i);
            }
        }

        let vertices: Vec<GridPoint> = incident.keys().copied().collect();
        for v in vertices {
            let Some(list) = incident.get(&v) else {
                continue;
            };
            if list.len() != 2 {
                continue;
            }
            let (i, j) = (list[0], list[1]);
            let (Some(a), Some(b)) = (slots[i], slots[j]) else {
                continue;
            };
            let Some(merged) = merge_through(a, b, v) else {
                continue;
            };
            slots[i] = Some(merged);
            slots[j] = None;
            incident.remove(&v);
            for end in [merged.segment.source, merged.segment.target] {
                if let Some(list) = incident.get_mut(&end) {
                    for slot in list.iter_mut() {
                        if *slot == j {
                            *slot = i;
                        }
                    }
                }
            }
        }

        let kept: Vec<Piece> = slots.into_iter().flatten().collect();
        let (mut rebuilt, pairs) = Self::assemble(&kept)?;
        let sources = rebuilt.source_faces(&kept, &pairs)?;
        let new_faces: Vec<_> = rebuilt.faces.keys().collect();
        for face in new_faces {
            if let Some(&old) = sources.get(&face) {
                let info = self.face_info(old)?.clone();
                rebuilt.face_info_mut(face)?.clone_from(&info);
            }
        }

        *self = rebuilt;
        Ok(())
    }
}

/// Join two pieces meeting at `v` into one when they are collinear and
/// separate the same pair of faces
fn merge_through(a: Piece, b: Piece, v: GridPoint) -> Option<Piece> {
    let a = if a.segment.target == v { a } else { a.reversed() };
    let b = if b.segment.source == v { b } else { b.reversed() };
    if a.segment.target != v || b.segment.source != v {
        return None;
    }
    let (p, q) = (a.segment.source, b.segment.target);
    if p == q || orient(p, v, q) != 0 {
        return None;
    }
    // v must lie between p and q, not fold back
    let dot = (v.x - p.x) as i128 * (q.x - v.x) as i128 + (v.y - p.y) as i128 * (q.y - v.y) as i128;
    if dot <= 0 {
        return None;
    }
    if a.footprint_interior_left != b.footprint_interior_left || a.sides != b.sides {
        return None;
    }
    Some(Piece {
        segment: crate::kernel::GridSegment::new(p, q),
        ..a
    })
}

#[cfg(test)]
mod tests {
    use crate::arena::{Arrangement, FaceLabel};
    use crate::kernel::GridSegment;
    use approx::assert_relative_eq;
    use rooftop_geometry::{LinearRing, Point2};

    fn seg(ax: f64, ay: f64, bx: f64, by: f64) -> GridSegment {
        GridSegment::snap(&Point2::new(ax, ay), &Point2::new(bx, by)).unwrap()
    }

    #[test]
    fn snap_removes_collinear_vertices_after_dissolve() {
        let ring = LinearRing::rectangle(0.0, 0.0, 10.0, 4.0);
        let mut arr = Arrangement::build(&ring, &[seg(5.0, 0.0, 5.0, 4.0)]).unwrap();
        assert_eq!(arr.vertex_count(), 6);
        arr.dissolve(|_, _| true).unwrap();
        // The split vertices on the outline survive dissolving
        assert_eq!(arr.vertex_count(), 6);
        arr.snap().unwrap();
        assert_eq!(arr.vertex_count(), 4);
        assert_eq!(arr.footprint_faces().count(), 1);
        assert_relative_eq!(arr.footprint_area().unwrap(), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn snap_keeps_corners_and_labels() {
        let ring = LinearRing::rectangle(0.0, 0.0, 10.0, 4.0);
        let mut arr = Arrangement::build(&ring, &[seg(5.0, 0.0, 5.0, 4.0)]).unwrap();
        for face in arr.footprint_faces().collect::<Vec<_>>() {
            arr.face_info_mut(face).unwrap().label = FaceLabel::Plane(7);
        }
        arr.snap().unwrap();
        // The dividing line keeps its endpoints (degree three)
        assert_eq!(arr.vertex_count(), 6);
        assert_eq!(arr.footprint_faces().count(), 2);
        for face in arr.footprint_faces() {
            assert_eq!(arr.face_info(face).unwrap().label, FaceLabel::Plane(7));
        }
    }

    #[test]
    fn snap_is_idempotent() {
        let ring = LinearRing::rectangle(0.0, 0.0, 10.0, 4.0);
        let mut arr = Arrangement::build(&ring, &[seg(5.0, 0.0, 5.0, 4.0)]).unwrap();
        arr.snap().unwrap();
        let edges = arr.half_edge_count();
        arr.snap().unwrap();
        assert_eq!(arr.half_edge_count(), edges);
    }
}
