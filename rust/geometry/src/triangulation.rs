// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Triangulation of footprint rings and solid faces with earcutr.
//!
//! A [`Polygon3`] of a solid (roof, wall or floor) is rotated into the xy
//! plane along its area vector, ear-clipped there and lifted back onto its
//! original vertices.

use nalgebra::UnitQuaternion;

use crate::mesh::Polygon3;
use crate::{Error, Point2, Point3, Result, Vector3};

/// Ear-clip an outer ring and its holes.
///
/// Holes with fewer than three points are dropped. Returns the vertices in
/// earcut order (outer first, then the kept holes) and the triangle indices
/// into them.
pub fn earcut_rings<'a>(
    outer: &'a [Point2<f64>],
    holes: impl IntoIterator<Item = &'a [Point2<f64>]>,
) -> Result<(Vec<Point2<f64>>, Vec<usize>)> {
    if outer.len() < 3 {
        return Err(Error::TriangulationError(format!(
            "outer ring has {} points",
            outer.len()
        )));
    }
    let mut points = outer.to_vec();
    let mut hole_starts = Vec::new();
    for hole in holes.into_iter().filter(|h| h.len() >= 3) {
        hole_starts.push(points.len());
        points.extend_from_slice(hole);
    }
    let flat: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y]).collect();
    let indices = earcutr::earcut(&flat, &hole_starts, 2)
        .map_err(|e| Error::TriangulationError(format!("{e:?}")))?;
    Ok((points, indices))
}

/// Rotation taking `normal` onto +z
fn rotation_to_plan(normal: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::rotation_between(normal, &Vector3::z())
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI))
}

impl Polygon3 {
    /// Triangles of the polygon, each wound like the outer ring.
    ///
    /// Works for any orientation, vertical walls included. A polygon without
    /// area is an error.
    pub fn triangulate(&self) -> Result<Vec<[Point3<f64>; 3]>> {
        let normal = self
            .area_vector()
            .try_normalize(1e-12)
            .ok_or_else(|| Error::TriangulationError("polygon has no area".to_string()))?;
        let rotation = rotation_to_plan(&normal);
        let origin = self.outer.first().copied().unwrap_or_else(Point3::origin);
        let to_plan = |ring: &[Point3<f64>]| -> Vec<Point2<f64>> {
            ring.iter()
                .map(|p| {
                    let q = rotation * (p - origin);
                    Point2::new(q.x, q.y)
                })
                .collect()
        };

        let outer = to_plan(&self.outer);
        let holes: Vec<Vec<Point2<f64>>> = self.holes.iter().map(|h| to_plan(h)).collect();
        let (_, indices) = earcut_rings(&outer, holes.iter().map(Vec::as_slice))?;

        let vertices: Vec<Point3<f64>> = self
            .rings()
            .enumerate()
            .filter(|(i, ring)| *i == 0 || ring.len() >= 3)
            .flat_map(|(_, ring)| ring.iter().copied())
            .collect();
        Ok(indices
            .chunks_exact(3)
            .map(|t| {
                let (a, b, c) = (vertices[t[0]], vertices[t[1]], vertices[t[2]]);
                if (b - a).cross(&(c - a)).dot(&normal) >= 0.0 {
                    [a, b, c]
                } else {
                    [a, c, b]
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(triangles: &[[Point3<f64>; 3]]) -> Vector3<f64> {
        triangles
            .iter()
            .map(|[a, b, c]| (b - a).cross(&(c - a)) / 2.0)
            .sum()
    }

    #[test]
    fn test_earcut_drops_short_holes() {
        let outer = [
            Point2::new(0.0, 0.0),
            Point2::new(20.0, 0.0),
            Point2::new(20.0, 20.0),
            Point2::new(0.0, 20.0),
        ];
        let hole = [
            Point2::new(2.0, 2.0),
            Point2::new(5.0, 2.0),
            Point2::new(5.0, 5.0),
            Point2::new(2.0, 5.0),
        ];
        let sliver = [Point2::new(8.0, 8.0), Point2::new(9.0, 9.0)];
        let (points, indices) = earcut_rings(&outer, [&hole[..], &sliver[..]]).unwrap();
        assert_eq!(points.len(), 8);
        assert_eq!(indices.len() % 3, 0);
        assert!(indices.len() > 6);

        assert!(earcut_rings(&outer[..2], []).is_err());
    }

    #[test]
    fn test_wall_keeps_winding() {
        // Facing -y
        let wall = Polygon3::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 3.0),
            Point3::new(0.0, 0.0, 3.0),
        ]);
        let triangles = wall.triangulate().unwrap();
        assert_eq!(triangles.len(), 2);
        let total = area(&triangles);
        assert!((total.y + 12.0).abs() < 1e-9);
        assert!(total.x.abs() < 1e-9 && total.z.abs() < 1e-9);
    }

    #[test]
    fn test_floor_with_hole_faces_down() {
        let ring = |x0: f64, y0: f64, x1: f64, y1: f64| {
            vec![
                Point3::new(x0, y0, 2.0),
                Point3::new(x0, y1, 2.0),
                Point3::new(x1, y1, 2.0),
                Point3::new(x1, y0, 2.0),
            ]
        };
        let mut hole = ring(2.0, 2.0, 4.0, 4.0);
        hole.reverse();
        let floor = Polygon3 {
            outer: ring(0.0, 0.0, 10.0, 6.0),
            holes: vec![hole],
        };
        let triangles = floor.triangulate().unwrap();
        assert!((area(&triangles).z + 56.0).abs() < 1e-9);
        assert!(triangles.iter().flatten().all(|p| p.z == 2.0));
    }

    #[test]
    fn test_collinear_polygon_is_an_error() {
        let line = Polygon3::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(2.0, 2.0, 2.0),
        ]);
        assert!(line.triangulate().is_err());
    }
}
