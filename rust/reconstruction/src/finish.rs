// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh finishing: triangulation, volume, point cloud distance, per-polygon
//! attributes and solid validation.

use std::collections::BTreeMap;

use rayon::prelude::*;
use rooftop_geometry::{
    LinearRing, Mesh, MultiSolid, Plane, Point2, Point3, Polygon3, SurfaceType, TriangleMesh,
};

use crate::building::{Lod, LodOutput};
use crate::error::Result;
use crate::raster::{Heightfield, RasterLabel};
use crate::stats::HeightSummary;

/// Polygons with a smaller area are skipped when triangulating
const MIN_POLYGON_AREA: f64 = 1e-10;

/// Triangulated multi-solid with its volumes
#[derive(Debug, Clone, Default)]
pub struct TriangulatedSolids {
    pub solids: BTreeMap<usize, TriangleMesh>,
    /// Per-solid signed volume
    pub volumes: BTreeMap<usize, f64>,
}

impl TriangulatedSolids {
    /// Volume summed over all solids
    pub fn total_volume(&self) -> f64 {
        self.volumes.values().sum()
    }

    /// All triangles of all solids in one mesh
    pub fn combined(&self) -> TriangleMesh {
        let mut all = TriangleMesh::new();
        for mesh in self.solids.values() {
            all.merge(mesh);
        }
        all
    }
}

/// Triangulates every polygon in its own plane
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshTriangulator;

impl MeshTriangulator {
    pub fn compute(&self, solids: &MultiSolid) -> Result<TriangulatedSolids> {
        let mut out = TriangulatedSolids::default();
        for (&id, mesh) in solids {
            let mut triangles = TriangleMesh::new();
            for (polygon, label) in mesh.iter() {
                if polygon.area_vector().norm() < MIN_POLYGON_AREA {
                    continue;
                }
                for t in polygon.triangulate()? {
                    triangles.add_triangle(&t, label.class_id());
                }
            }
            out.volumes.insert(id, triangles.signed_volume());
            out.solids.insert(id, triangles);
        }
        Ok(out)
    }
}

/// Closest point on triangle `abc` to `p` (Ericson, Real-Time Collision
/// Detection 5.1.5)
fn closest_point_on_triangle(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Root mean square distance from points to a triangle mesh
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCloudMeshDistance;

impl PointCloudMeshDistance {
    /// `None` when there are no points or no triangles
    pub fn compute(&self, points: &[Point3<f64>], mesh: &TriangleMesh) -> Option<f64> {
        let triangles: Vec<[Point3<f64>; 3]> = mesh.triangles().collect();
        if points.is_empty() || triangles.is_empty() {
            return None;
        }
        let squared: Vec<f64> = points
            .par_iter()
            .map(|p| {
                triangles
                    .iter()
                    .map(|[a, b, c]| (closest_point_on_triangle(p, a, b, c) - p).norm_squared())
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let sum: f64 = squared.iter().sum();
        Some((sum / squared.len() as f64).sqrt())
    }
}

/// Per-polygon height and orientation attributes
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshPropertyCalculator;

impl MeshPropertyCalculator {
    /// Heightmap of all roof polygons, `None` without roofs
    pub fn heightmap(&self, solids: &MultiSolid, cellsize: f64) -> Result<Option<Heightfield>> {
        let mut triangles = Vec::new();
        for (&id, mesh) in solids {
            for (polygon, label) in mesh.iter() {
                if label != SurfaceType::Roof || polygon.area_vector().norm() < MIN_POLYGON_AREA {
                    continue;
                }
                for t in polygon.triangulate()? {
                    triangles.push((id, t));
                }
            }
        }
        let Some((min, max)) = plan_bounds(triangles.iter().flat_map(|(_, t)| t.iter())) else {
            return Ok(None);
        };
        let mut field = Heightfield::new(min, max, cellsize);
        for (id, t) in &triangles {
            field.rasterise_triangle(t, RasterLabel::Roof(*id));
        }
        Ok(Some(field))
    }

    /// Height percentiles of the heightmap cells under every roof polygon,
    /// shifted by `z_offset`
    pub fn calculate_h_attr(&self, solids: &mut MultiSolid, heightmap: &Heightfield, z_offset: f64) {
        for mesh in solids.values_mut() {
            mesh.resize_attributes();
            let summaries: Vec<Option<HeightSummary>> = mesh
                .iter()
                .map(|(polygon, label)| {
                    if label != SurfaceType::Roof {
                        return None;
                    }
                    HeightSummary::from_samples(heightmap.samples_in(&plan_polygon(polygon)))
                })
                .collect();
            for (attr, summary) in mesh.attributes_mut().iter_mut().zip(summaries) {
                let Some(s) = summary else {
                    continue;
                };
                attr.h_50p = Some((s.p50 + z_offset) as f32);
                attr.h_70p = Some((s.p70 + z_offset) as f32);
                attr.h_min = Some((s.min + z_offset) as f32);
                attr.h_max = Some((s.max + z_offset) as f32);
            }
        }
    }

    /// Slope and azimuth of every roof polygon. Azimuth is the compass
    /// bearing of the horizontal normal component and left empty for flat
    /// roofs.
    pub fn compute_roof_orientation(&self, solids: &mut MultiSolid) {
        for mesh in solids.values_mut() {
            mesh.resize_attributes();
            let orientation: Vec<Option<(f32, Option<f32>)>> = mesh
                .iter()
                .map(|(polygon, label)| (label == SurfaceType::Roof).then(|| roof_orientation(polygon)).flatten())
                .collect();
            for (attr, o) in mesh.attributes_mut().iter_mut().zip(orientation) {
                if let Some((slope, azimuth)) = o {
                    attr.slope = Some(slope);
                    attr.azimuth = azimuth;
                }
            }
        }
    }
}

fn roof_orientation(polygon: &Polygon3) -> Option<(f32, Option<f32>)> {
    let normal = polygon.area_vector().try_normalize(1e-12)?;
    let slope = normal.z.abs().min(1.0).acos().to_degrees();
    let horizontal = (normal.x * normal.x + normal.y * normal.y).sqrt();
    let azimuth = (horizontal > 1e-6).then(|| normal.x.atan2(normal.y).to_degrees().rem_euclid(360.0) as f32);
    Some((slope as f32, azimuth))
}

fn plan_polygon(polygon: &Polygon3) -> LinearRing {
    let flatten = |ring: &Vec<Point3<f64>>| ring.iter().map(|p| Point2::new(p.x, p.y)).collect();
    LinearRing::with_interiors(flatten(&polygon.outer), polygon.holes.iter().map(flatten).collect())
}

fn plan_bounds<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> Option<(Point2<f64>, Point2<f64>)> {
    let mut bounds: Option<(Point2<f64>, Point2<f64>)> = None;
    for p in points {
        let (min, max) = bounds.get_or_insert((Point2::new(p.x, p.y), Point2::new(p.x, p.y)));
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    bounds
}

/// Geometric validation of closed solids.
///
/// Reports the first error found with a val3dity error code, or `"valid"`.
#[derive(Debug, Clone, Copy)]
pub struct SolidValidator {
    /// Maximum vertex distance to the fitted polygon plane
    pub planarity_tolerance: f64,
    /// Vertex snapping tolerance when matching edges
    pub snap_tolerance: f64,
}

impl Default for SolidValidator {
    fn default() -> Self {
        Self {
            planarity_tolerance: 0.01,
            snap_tolerance: 1e-4,
        }
    }
}

impl SolidValidator {
    pub fn validate(&self, solids: &MultiSolid, triangulated: &TriangulatedSolids) -> String {
        for (id, mesh) in solids {
            if let Some(error) = self.validate_solid(mesh, triangulated.volumes.get(id).copied()) {
                return error.to_string();
            }
        }
        "valid".to_string()
    }

    fn validate_solid(&self, mesh: &Mesh, volume: Option<f64>) -> Option<&'static str> {
        for polygon in mesh.polygons() {
            for ring in polygon.rings() {
                let mut distinct = ring.clone();
                distinct.dedup();
                if distinct.len() > 1 && distinct.first() == distinct.last() {
                    distinct.pop();
                }
                if distinct.len() < 3 {
                    return Some("101 TOO_FEW_POINTS");
                }
            }
            let points: Vec<Point3<f64>> = polygon.rings().flatten().copied().collect();
            if let Ok((plane, _)) = Plane::fit(&points) {
                if points.iter().any(|p| plane.signed_distance(p).abs() > self.planarity_tolerance) {
                    return Some("203 NON_PLANAR_POLYGON_DISTANCE_PLANE");
                }
            }
        }
        if mesh.len() < 4 {
            return Some("301 TOO_FEW_POLYGONS");
        }

        let counts = mesh.directed_edge_counts(self.snap_tolerance);
        let mut wrongly_oriented = false;
        for (&(a, b), &n) in &counts {
            let reverse = counts.get(&(b, a)).copied().unwrap_or(0);
            if n + reverse > 2 {
                return Some("303 NON_MANIFOLD_EDGE");
            }
            if reverse == 0 {
                if n == 1 {
                    return Some("302 SHELL_NOT_CLOSED");
                }
                wrongly_oriented = true;
            }
        }
        if wrongly_oriented {
            return Some("307 POLYGON_WRONGLY_ORIENTED");
        }
        if volume.is_some_and(|v| v < 0.0) {
            return Some("405 WRONG_ORIENTATION_SHELL");
        }
        None
    }
}

/// Runs the finishing stages on one extruded level of detail
pub struct Finisher<'a> {
    pub roof_points: &'a [Point3<f64>],
    /// Heightmap of the LoD 2.2 roofs; attributes are skipped without it
    pub heightmap: Option<&'a Heightfield>,
    pub z_offset: f64,
    pub compute_validity: bool,
}

impl Finisher<'_> {
    pub fn finish(&self, mut multisolid: MultiSolid, lod: Lod) -> Result<LodOutput> {
        for mesh in multisolid.values_mut() {
            mesh.resize_attributes();
        }
        let triangulated = MeshTriangulator.compute(&multisolid)?;
        let rmse = PointCloudMeshDistance.compute(self.roof_points, &triangulated.combined());

        if let Some(heightmap) = self.heightmap {
            MeshPropertyCalculator.calculate_h_attr(&mut multisolid, heightmap, self.z_offset);
            if lod == Lod::Lod22 {
                MeshPropertyCalculator.compute_roof_orientation(&mut multisolid);
            }
        }

        let val3dity = (self.compute_validity && !multisolid.is_empty())
            .then(|| SolidValidator::default().validate(&multisolid, &triangulated));

        Ok(LodOutput {
            rmse,
            volume: triangulated.total_volume(),
            solid_volumes: triangulated.volumes,
            val3dity,
            multisolid,
        })
    }
}
