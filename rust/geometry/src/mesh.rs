// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures
//!
//! [`Mesh`] is a polygonal boundary representation of one solid: every
//! polygon carries a surface type and an attribute record. [`MultiSolid`]
//! maps a solid index to its mesh. [`TriangleMesh`] is the flat triangle
//! buffer produced when solids are triangulated.

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

/// Semantic surface type of a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    Floor,
    Roof,
    OuterWall,
    /// Vertical step between two roof parts of the same solid
    InnerWall,
}

impl SurfaceType {
    /// Numeric class id (0 floor, 1 roof, 2 outer wall, 3 inner wall)
    pub fn class_id(&self) -> u32 {
        match self {
            SurfaceType::Floor => 0,
            SurfaceType::Roof => 1,
            SurfaceType::OuterWall => 2,
            SurfaceType::InnerWall => 3,
        }
    }
}

/// Planar 3D polygon with optional holes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon3 {
    pub outer: Vec<Point3<f64>>,
    pub holes: Vec<Vec<Point3<f64>>>,
}

impl Polygon3 {
    /// Create a polygon without holes
    pub fn new(outer: Vec<Point3<f64>>) -> Self {
        Self {
            outer,
            holes: Vec::new(),
        }
    }

    /// Iterate over all rings, outer first
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Point3<f64>>> {
        std::iter::once(&self.outer).chain(self.holes.iter())
    }

    /// Reverse the orientation of every ring
    pub fn reversed(mut self) -> Self {
        self.outer.reverse();
        for h in &mut self.holes {
            h.reverse();
        }
        self
    }

    /// Area vector (Newell), length equals the polygon area
    pub fn area_vector(&self) -> Vector3<f64> {
        let mut total = ring_area_vector(&self.outer);
        for h in &self.holes {
            total += ring_area_vector(h);
        }
        total
    }
}

fn ring_area_vector(ring: &[Point3<f64>]) -> Vector3<f64> {
    let mut normal = Vector3::<f64>::zeros();
    let n = ring.len();
    for i in 0..n {
        let current = &ring[i];
        let next = &ring[(i + 1) % n];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal / 2.0
}

/// Per-polygon attribute record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceAttributes {
    pub h_50p: Option<f32>,
    pub h_70p: Option<f32>,
    pub h_min: Option<f32>,
    pub h_max: Option<f32>,
    /// Roof slope in degrees
    pub slope: Option<f32>,
    /// Compass bearing of the roof normal in degrees, clockwise from north
    pub azimuth: Option<f32>,
}

/// Polygonal boundary of one solid
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    polygons: Vec<Polygon3>,
    labels: Vec<SurfaceType>,
    attributes: Vec<FaceAttributes>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a polygon with its surface type
    pub fn push_polygon(&mut self, polygon: Polygon3, label: SurfaceType) {
        self.polygons.push(polygon);
        self.labels.push(label);
    }

    pub fn polygons(&self) -> &[Polygon3] {
        &self.polygons
    }

    pub fn labels(&self) -> &[SurfaceType] {
        &self.labels
    }

    pub fn attributes(&self) -> &[FaceAttributes] {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Vec<FaceAttributes> {
        &mut self.attributes
    }

    /// Resize the attribute store to one record per polygon
    pub fn resize_attributes(&mut self) {
        self.attributes
            .resize(self.polygons.len(), FaceAttributes::default());
    }

    /// Iterate over polygons with their labels
    pub fn iter(&self) -> impl Iterator<Item = (&Polygon3, SurfaceType)> {
        self.polygons.iter().zip(self.labels.iter().copied())
    }

    /// Number of polygons
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Check if mesh is empty
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Count how often every directed edge occurs, keyed on vertex positions
    /// quantized to `tolerance`.
    pub fn directed_edge_counts(&self, tolerance: f64) -> FxHashMap<(VertexKey, VertexKey), usize> {
        let mut counts = FxHashMap::default();
        for polygon in &self.polygons {
            for ring in polygon.rings() {
                let n = ring.len();
                for i in 0..n {
                    let a = VertexKey::quantize(&ring[i], tolerance);
                    let b = VertexKey::quantize(&ring[(i + 1) % n], tolerance);
                    if a != b {
                        *counts.entry((a, b)).or_insert(0) += 1;
                    }
                }
            }
        }
        counts
    }

    /// Calculate bounds (min, max)
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        let mut min = Point3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3::new(f64::MIN, f64::MIN, f64::MIN);
        for p in self.polygons.iter().flat_map(|poly| poly.rings().flatten()) {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        (min, max)
    }
}

/// Quantized vertex position used to compare vertices across polygons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexKey(pub i64, pub i64, pub i64);

impl VertexKey {
    pub fn quantize(p: &Point3<f64>, tolerance: f64) -> Self {
        Self(
            (p.x / tolerance).round() as i64,
            (p.y / tolerance).round() as i64,
            (p.z / tolerance).round() as i64,
        )
    }
}

/// Solid index → mesh, ordered by index
pub type MultiSolid = BTreeMap<usize, Mesh>;

/// Triangle mesh
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f64>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Vec<f32>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
    /// Surface class of each triangle
    pub classes: Vec<u32>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex with normal
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>, normal: Vector3<f64>) {
        self.positions.push(position.x);
        self.positions.push(position.y);
        self.positions.push(position.z);

        self.normals.push(normal.x as f32);
        self.normals.push(normal.y as f32);
        self.normals.push(normal.z as f32);
    }

    /// Add a triangle of three new vertices sharing the face normal
    pub fn add_triangle(&mut self, triangle: &[Point3<f64>; 3], class: u32) {
        let normal = (triangle[1] - triangle[0])
            .cross(&(triangle[2] - triangle[0]))
            .try_normalize(1e-12)
            .unwrap_or_else(Vector3::z);
        let base = self.vertex_count() as u32;
        for p in triangle {
            self.add_vertex(*p, normal);
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
        self.classes.push(class);
    }

    /// Merge another mesh into this one
    pub fn merge(&mut self, other: &TriangleMesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = self.vertex_count() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
        self.classes.extend_from_slice(&other.classes);
    }

    /// Iterate over triangles as vertex triples
    pub fn triangles(&self) -> impl Iterator<Item = [Point3<f64>; 3]> + '_ {
        self.indices.chunks_exact(3).map(move |tri| {
            [
                self.position(tri[0] as usize),
                self.position(tri[1] as usize),
                self.position(tri[2] as usize),
            ]
        })
    }

    fn position(&self, i: usize) -> Point3<f64> {
        Point3::new(
            self.positions[3 * i],
            self.positions[3 * i + 1],
            self.positions[3 * i + 2],
        )
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get triangle count
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Enclosed volume from the divergence theorem; positive for outward
    /// facing triangles. Summed relative to the first vertex to limit
    /// cancellation on large coordinates.
    pub fn signed_volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let origin = self.position(0);
        self.triangles()
            .map(|[a, b, c]| {
                let (a, b, c) = (a - origin, b - origin, c - origin);
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square(z: f64) -> Polygon3 {
        Polygon3::new(vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ])
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = Mesh::new();
        assert!(mesh.is_empty());
        assert_eq!(mesh.len(), 0);
        assert!(TriangleMesh::new().is_empty());
    }

    #[test]
    fn test_resize_attributes() {
        let mut mesh = Mesh::new();
        mesh.push_polygon(unit_square(0.0).reversed(), SurfaceType::Floor);
        mesh.push_polygon(unit_square(1.0), SurfaceType::Roof);
        assert!(mesh.attributes().is_empty());
        mesh.resize_attributes();
        assert_eq!(mesh.attributes().len(), 2);
        assert_eq!(mesh.labels()[1], SurfaceType::Roof);
    }

    #[test]
    fn test_area_vector() {
        let roof = unit_square(2.0);
        let area = roof.area_vector();
        assert!((area.z - 1.0).abs() < 1e-12);
        assert!((roof.reversed().area_vector().z + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_and_volume() {
        // Unit tetrahedron, outward winding
        let o = Point3::new(0.0, 0.0, 0.0);
        let x = Point3::new(1.0, 0.0, 0.0);
        let y = Point3::new(0.0, 1.0, 0.0);
        let z = Point3::new(0.0, 0.0, 1.0);
        let mut a = TriangleMesh::new();
        a.add_triangle(&[o, y, x], 0);
        a.add_triangle(&[o, x, z], 2);
        let mut b = TriangleMesh::new();
        b.add_triangle(&[o, z, y], 2);
        b.add_triangle(&[x, y, z], 1);
        a.merge(&b);
        assert_eq!(a.triangle_count(), 4);
        assert_eq!(a.classes, vec![0, 2, 2, 1]);
        assert!((a.signed_volume() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_directed_edges_of_flipped_pair_cancel() {
        let mut mesh = Mesh::new();
        mesh.push_polygon(unit_square(0.0), SurfaceType::Roof);
        mesh.push_polygon(unit_square(0.0).reversed(), SurfaceType::Floor);
        let counts = mesh.directed_edge_counts(1e-6);
        assert_eq!(counts.len(), 8);
        for ((a, b), n) in &counts {
            assert_eq!(*n, 1);
            assert_eq!(counts.get(&(*b, *a)), Some(&1));
        }
    }
}
