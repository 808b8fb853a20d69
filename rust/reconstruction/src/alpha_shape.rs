// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Alpha shapes of plane clusters.
//!
//! The points of a cluster are triangulated in plan with delaunator and
//! every triangle with a circumradius above `alpha` is dropped. The kept
//! triangles form the shape interior; its unshared edges form the boundary
//! rings.

use std::collections::BTreeMap;

use rooftop_geometry::{Plane, Point2, Point3};
use rustc_hash::FxHashSet;

use crate::segmentation::PlaneCluster;

/// Boundary ring of one cluster. Outer rings run counter-clockwise, holes
/// clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaRing {
    pub cluster: usize,
    pub points: Vec<Point2<f64>>,
}

/// Triangulated interior of one cluster, lifted onto its plane
#[derive(Debug, Clone)]
pub struct AlphaTriangles {
    pub cluster: usize,
    pub plane: Plane,
    pub triangles: Vec<[Point3<f64>; 3]>,
}

/// Alpha shapes of a set of clusters
#[derive(Debug, Clone, Default)]
pub struct AlphaShape {
    pub rings: Vec<AlphaRing>,
    pub triangles: Vec<AlphaTriangles>,
}

impl AlphaShape {
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty() && self.triangles.is_empty()
    }

    /// Total plan area of the kept triangles
    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .flat_map(|t| t.triangles.iter())
            .map(|[a, b, c]| 0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaShaper;

impl AlphaShaper {
    /// Alpha shapes of every cluster.
    ///
    /// Clusters with fewer than three points, collinear clusters and clusters
    /// without a triangle below the threshold contribute nothing. `alpha <= 0`
    /// gives an empty result.
    pub fn compute(&self, clusters: &[PlaneCluster], alpha: f64) -> AlphaShape {
        let mut shape = AlphaShape::default();
        if !(alpha > 0.0) {
            return shape;
        }
        for cluster in clusters {
            let Some((rings, triangles)) = cluster_shape(cluster, alpha) else {
                tracing::debug!(
                    cluster = cluster.id,
                    points = cluster.points.len(),
                    "dropping degenerate cluster"
                );
                continue;
            };
            shape
                .rings
                .extend(rings.into_iter().map(|points| AlphaRing {
                    cluster: cluster.id,
                    points,
                }));
            shape.triangles.push(AlphaTriangles {
                cluster: cluster.id,
                plane: cluster.plane,
                triangles,
            });
        }
        shape
    }
}

type Rings = Vec<Vec<Point2<f64>>>;

fn cluster_shape(cluster: &PlaneCluster, alpha: f64) -> Option<(Rings, Vec<[Point3<f64>; 3]>)> {
    if cluster.points.len() < 3 {
        return None;
    }
    let coords: Vec<delaunator::Point> = cluster
        .points
        .iter()
        .map(|p| delaunator::Point { x: p.x, y: p.y })
        .collect();
    let triangulation = delaunator::triangulate(&coords);

    let plan = |i: usize| Point2::new(cluster.points[i].x, cluster.points[i].y);
    let mut kept: Vec<[usize; 3]> = Vec::new();
    for tri in triangulation.triangles.chunks_exact(3) {
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        let (pa, pb, pc) = (plan(a), plan(b), plan(c));
        let Some(radius) = circumradius(&pa, &pb, &pc) else {
            continue;
        };
        if radius > alpha {
            continue;
        }
        // Counter-clockwise in plan
        if cross(&pa, &pb, &pc) > 0.0 {
            kept.push([a, b, c]);
        } else {
            kept.push([a, c, b]);
        }
    }
    if kept.is_empty() {
        return None;
    }

    let rings = trace_rings(&kept, &plan);
    let lift = |i: usize| {
        let p = cluster.points[i];
        Point3::new(p.x, p.y, cluster.plane.z_at(p.x, p.y).unwrap_or(p.z))
    };
    let triangles = kept.iter().map(|t| [lift(t[0]), lift(t[1]), lift(t[2])]).collect();
    Some((rings, triangles))
}

/// Walk the unshared edges of counter-clockwise triangles into rings with
/// the interior on the left.
///
/// At a vertex shared by several boundary pieces the walk takes the first
/// outgoing edge clockwise from the edge it arrived on, which keeps every
/// ring simple.
fn trace_rings(triangles: &[[usize; 3]], plan: &impl Fn(usize) -> Point2<f64>) -> Rings {
    let mut directed: FxHashSet<(usize, usize)> = FxHashSet::default();
    for t in triangles {
        for k in 0..3 {
            directed.insert((t[k], t[(k + 1) % 3]));
        }
    }
    let mut boundary: Vec<(usize, usize)> = directed
        .iter()
        .copied()
        .filter(|&(a, b)| !directed.contains(&(b, a)))
        .collect();
    boundary.sort_unstable();

    let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(a, b) in &boundary {
        outgoing.entry(a).or_default().push(b);
    }

    let next = |(u, v): (usize, usize)| -> Option<(usize, usize)> {
        let candidates = outgoing.get(&v)?;
        let (pu, pv) = (plan(u), plan(v));
        let back = pu - pv;
        candidates
            .iter()
            .map(|&w| {
                let d = plan(w) - pv;
                let ccw = (back.x * d.y - back.y * d.x).atan2(back.dot(&d));
                let clockwise = (-ccw).rem_euclid(std::f64::consts::TAU);
                (clockwise, w)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, w)| (v, w))
    };

    let mut visited: FxHashSet<(usize, usize)> = FxHashSet::default();
    let mut rings = Vec::new();
    for &start in &boundary {
        if visited.contains(&start) {
            continue;
        }
        let mut ring = Vec::new();
        let mut edge = start;
        let mut closed = false;
        for _ in 0..=boundary.len() {
            visited.insert(edge);
            ring.push(plan(edge.0));
            let Some(following) = next(edge) else {
                break;
            };
            if following == start {
                closed = true;
                break;
            }
            if visited.contains(&following) {
                break;
            }
            edge = following;
        }
        if closed && ring.len() >= 3 {
            rings.push(ring);
        }
    }
    rings
}

fn cross(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Circumradius of a plan triangle, `None` when degenerate
fn circumradius(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> Option<f64> {
    let area2 = cross(a, b, c).abs();
    if area2 < 1e-12 {
        return None;
    }
    let (ab, bc, ca) = ((b - a).norm(), (c - b).norm(), (a - c).norm());
    Some(ab * bc * ca / (2.0 * area2))
}
