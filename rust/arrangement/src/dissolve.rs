// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dissolving edges between adjacent footprint faces.

use slotmap::SecondaryMap;

use crate::arena::{Arrangement, FaceInfo};
use crate::construction::Piece;
use crate::disjoint_set::DisjointSet;
use crate::error::{Error, Result};
use crate::keys::FaceKey;

impl Arrangement {
    /// Merge footprint faces across every edge for which `merge` holds.
    ///
    /// Faces are grouped transitively and every edge between two members of
    /// a group is removed, so a group becomes one face (possibly with holes).
    /// The merged face keeps the payload of its largest member; elevation
    /// statistics of merged faces are cleared since they no longer describe
    /// the new face. The footprint outline is never removed.
    pub fn dissolve<F>(&mut self, merge: F) -> Result<()>
    where
        F: Fn(&FaceInfo, &FaceInfo) -> bool,
    {
        let keys: Vec<FaceKey> = self.faces.keys().collect();
        let mut index: SecondaryMap<FaceKey, usize> = SecondaryMap::new();
        for (i, &k) in keys.iter().enumerate() {
            index.insert(k, i);
        }
        let slot = |k: FaceKey| index.get(k).copied().ok_or(Error::FaceNotFound(k));

        let pieces = self.pieces()?;
        let mut groups = DisjointSet::new(keys.len());
        for piece in &pieces {
            let (left, right) = piece.sides;
            if left == right {
                continue;
            }
            let (a, b) = (self.face_info(left)?, self.face_info(right)?);
            if a.in_footprint && b.in_footprint && merge(a, b) {
                groups.union(slot(left)?, slot(right)?);
            }
        }

        let mut kept: Vec<Piece> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let (left, right) = piece.sides;
            let internal = self.face_info(left)?.in_footprint
                && self.face_info(right)?.in_footprint
                && groups.find(slot(left)?) == groups.find(slot(right)?);
            if !internal {
                kept.push(piece);
            }
        }

        // Representative payload per group: the largest member face
        let mut best: Vec<Option<(f64, usize)>> = vec![None; keys.len()];
        let mut members = vec![0usize; keys.len()];
        for (i, &k) in keys.iter().enumerate() {
            let root = groups.find(i);
            members[root] += 1;
            let area = self.face_area(k)?;
            if best[root].map_or(true, |(a, _)| area > a) {
                best[root] = Some((area, i));
            }
        }

        let (mut rebuilt, pairs) = Self::assemble(&kept)?;
        let sources = rebuilt.source_faces(&kept, &pairs)?;
        let new_faces: Vec<FaceKey> = rebuilt.faces.keys().collect();
        for face in new_faces {
            let Some(&old) = sources.get(&face) else {
                continue;
            };
            let root = groups.find(slot(old)?);
            let representative = best[root].map_or(old, |(_, i)| keys[i]);
            let mut info = self.face_info(representative)?.clone();
            if members[root] > 1 {
                info.elevation = None;
            }
            let in_footprint = rebuilt.face_info(face)?.in_footprint;
            *rebuilt.face_info_mut(face)? = FaceInfo {
                in_footprint,
                ..info
            };
        }

        *self = rebuilt;
        Ok(())
    }
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

    /// 12 x 6 footprint cut into three 4 x 6 strips labeled 0, 0, 1
    fn strips() -> Arrangement {
        let ring = LinearRing::rectangle(0.0, 0.0, 12.0, 6.0);
        let mut arr =
            Arrangement::build(&ring, &[seg(4.0, 0.0, 4.0, 6.0), seg(8.0, 0.0, 8.0, 6.0)]).unwrap();
        let faces: Vec<_> = arr.footprint_faces().collect();
        for face in faces {
            let polygon = arr.face_polygon(face).unwrap();
            let cx = polygon.outer.iter().map(|p| p.x).sum::<f64>() / polygon.outer.len() as f64;
            arr.face_info_mut(face).unwrap().label = if cx < 8.0 {
                FaceLabel::Plane(0)
            } else {
                FaceLabel::Plane(1)
            };
        }
        arr
    }

    #[test]
    fn dissolve_same_label() {
        let mut arr = strips();
        assert_eq!(arr.footprint_faces().count(), 3);
        arr.dissolve(|a, b| a.label == b.label).unwrap();
        assert_eq!(arr.footprint_faces().count(), 2);
        assert_relative_eq!(arr.footprint_area().unwrap(), 72.0, epsilon = 1e-9);

        let mut labels: Vec<_> = arr
            .footprint_faces()
            .map(|f| arr.face_info(f).unwrap().label)
            .collect();
        labels.sort();
        assert_eq!(labels, vec![FaceLabel::Plane(0), FaceLabel::Plane(1)]);
    }

    #[test]
    fn dissolve_everything_keeps_footprint() {
        let mut arr = strips();
        arr.dissolve(|_, _| true).unwrap();
        assert_eq!(arr.footprint_faces().count(), 1);
        assert_relative_eq!(arr.footprint_area().unwrap(), 72.0, epsilon = 1e-9);
    }

    #[test]
    fn dissolve_nothing_is_identity() {
        let mut arr = strips();
        let before = arr.half_edge_count();
        arr.dissolve(|_, _| false).unwrap();
        assert_eq!(arr.footprint_faces().count(), 3);
        assert_eq!(arr.half_edge_count(), before);
    }

    #[test]
    fn enclosed_face_becomes_hole() {
        let ring = LinearRing::rectangle(0.0, 0.0, 10.0, 10.0);
        // Inner square with spokes to the outline
        let segments = [
            seg(3.0, 3.0, 7.0, 3.0),
            seg(7.0, 3.0, 7.0, 7.0),
            seg(7.0, 7.0, 3.0, 7.0),
            seg(3.0, 7.0, 3.0, 3.0),
            seg(5.0, 0.0, 5.0, 3.0),
            seg(5.0, 7.0, 5.0, 10.0),
        ];
        let mut arr = Arrangement::build(&ring, &segments).unwrap();
        assert_eq!(arr.footprint_faces().count(), 3);
        for face in arr.footprint_faces().collect::<Vec<_>>() {
            let area = arr.face_area(face).unwrap();
            arr.face_info_mut(face).unwrap().label = if (area - 16.0).abs() < 1e-6 {
                FaceLabel::Plane(1)
            } else {
                FaceLabel::Plane(0)
            };
        }
        arr.dissolve(|a, b| a.label == b.label).unwrap();
        assert_eq!(arr.footprint_faces().count(), 2);
        let ring_face = arr
            .footprint_faces()
            .find(|f| arr.face_info(*f).unwrap().label == FaceLabel::Plane(0))
            .unwrap();
        assert_eq!(arr.face(ring_face).unwrap().holes.len(), 1);
        assert_relative_eq!(arr.face_area(ring_face).unwrap(), 84.0, epsilon = 1e-9);
    }
}
