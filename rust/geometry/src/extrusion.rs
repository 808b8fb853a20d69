// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extrusion operations - converting 2D footprints to flat-roofed solids

use crate::error::{Error, Result};
use crate::mesh::{Mesh, Polygon3, SurfaceType};
use crate::profile::LinearRing;
use nalgebra::{Point2, Point3};

/// Extrude a footprint between `floor_z` and `roof_z` into a closed
/// polygonal solid (floor, flat roof, one wall per ring edge).
///
/// Rings are re-oriented first so every polygon faces outward.
pub fn extrude_ring(ring: &LinearRing, floor_z: f64, roof_z: f64) -> Result<Mesh> {
    ring.validate()?;
    if !(roof_z > floor_z) {
        return Err(Error::InvalidExtrusion(format!(
            "roof height {roof_z} must be above floor height {floor_z}"
        )));
    }

    let ring = ring.oriented();
    let mut mesh = Mesh::new();

    mesh.push_polygon(cap(&ring, floor_z).reversed(), SurfaceType::Floor);
    mesh.push_polygon(cap(&ring, roof_z), SurfaceType::Roof);

    for boundary in ring.rings() {
        create_side_walls(boundary, floor_z, roof_z, &mut mesh);
    }

    Ok(mesh)
}

/// Horizontal copy of the footprint at height `z`
fn cap(ring: &LinearRing, z: f64) -> Polygon3 {
    let lift = |r: &Vec<Point2<f64>>| r.iter().map(|p| Point3::new(p.x, p.y, z)).collect();
    Polygon3 {
        outer: lift(&ring.outer),
        holes: ring.interiors.iter().map(lift).collect(),
    }
}

/// Create side walls for one ring; the solid lies to the left of each edge
fn create_side_walls(contour: &[Point2<f64>], z_bottom: f64, z_top: f64, mesh: &mut Mesh) {
    for i in 0..contour.len() {
        let p0 = &contour[i];
        let p1 = &contour[(i + 1) % contour.len()];

        // Skip degenerate edges (duplicate consecutive points)
        if (p1 - p0).norm() < 1e-10 {
            continue;
        }

        let wall = Polygon3::new(vec![
            Point3::new(p0.x, p0.y, z_bottom),
            Point3::new(p1.x, p1.y, z_bottom),
            Point3::new(p1.x, p1.y, z_top),
            Point3::new(p0.x, p0.y, z_top),
        ]);
        mesh.push_polygon(wall, SurfaceType::OuterWall);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extrude_rectangle() {
        let ring = LinearRing::rectangle(0.0, 0.0, 4.0, 3.0);
        let mesh = extrude_ring(&ring, 1.0, 6.0).unwrap();
        // floor + roof + 4 walls
        assert_eq!(mesh.len(), 6);
        assert_eq!(mesh.labels()[0], SurfaceType::Floor);
        assert_eq!(mesh.labels()[1], SurfaceType::Roof);

        // Closed: every directed edge has its reverse exactly once
        let counts = mesh.directed_edge_counts(1e-6);
        for ((a, b), n) in &counts {
            assert_eq!(*n, 1);
            assert_eq!(counts.get(&(*b, *a)), Some(&1));
        }

        // Outward walls: the wall along y = 0 faces -y
        let wall = &mesh.polygons()[2];
        assert!(wall.area_vector().y < 0.0);
    }

    #[test]
    fn test_extrude_with_hole_adds_inner_walls() {
        let mut ring = LinearRing::rectangle(0.0, 0.0, 10.0, 10.0);
        ring.add_interior(vec![
            Point2::new(4.0, 4.0),
            Point2::new(6.0, 4.0),
            Point2::new(6.0, 6.0),
            Point2::new(4.0, 6.0),
        ]);
        let mesh = extrude_ring(&ring, 0.0, 3.0).unwrap();
        assert_eq!(mesh.len(), 2 + 4 + 4);
        // Hole wall at x = 4 faces into the courtyard (+x)
        let hole_walls: Vec<_> = mesh.polygons()[6..].iter().collect();
        assert!(hole_walls
            .iter()
            .any(|w| w.outer.iter().all(|p| p.x == 4.0) && w.area_vector().x > 0.0));
    }

    #[test]
    fn test_extrude_rejects_inverted_heights() {
        let ring = LinearRing::rectangle(0.0, 0.0, 4.0, 3.0);
        assert!(extrude_ring(&ring, 5.0, 5.0).is_err());
    }
}
