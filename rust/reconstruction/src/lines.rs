// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line sources for the roof partition: straight runs of the alpha shape
//! boundaries and plan-view intersections of adjacent roof planes.

use std::collections::BTreeMap;

use nalgebra::Matrix2;
use rooftop_geometry::{Point2, Vector2};

use crate::alpha_shape::AlphaRing;
use crate::segmentation::PlaneCluster;

/// Straight boundary segment of one cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryLine {
    pub cluster: usize,
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    /// Ring vertices supporting the fit
    pub support: usize,
}

impl BoundaryLine {
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }
}

/// Plan projection of the intersection of two adjacent planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionLine {
    pub clusters: (usize, usize),
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

impl IntersectionLine {
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineDetectorConfig {
    /// Maximum deviation of a ring vertex from its segment
    pub dist_thres: f64,
    /// Minimum number of ring vertices in a segment
    pub min_support: usize,
}

impl Default for LineDetectorConfig {
    fn default() -> Self {
        Self {
            dist_thres: 0.4,
            min_support: 3,
        }
    }
}

/// Split-and-merge line detection on closed rings
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDetector;

impl LineDetector {
    pub fn detect(&self, rings: &[AlphaRing], config: &LineDetectorConfig) -> Vec<BoundaryLine> {
        let mut lines = Vec::new();
        for ring in rings {
            let n = ring.points.len();
            if n < 3 {
                continue;
            }
            for run in split_and_merge(&ring.points, config.dist_thres) {
                if run.len() < config.min_support {
                    continue;
                }
                let points: Vec<Point2<f64>> = run.iter().map(|&i| ring.points[i]).collect();
                if let Some((start, end)) = fit_segment(&points) {
                    lines.push(BoundaryLine {
                        cluster: ring.cluster,
                        start,
                        end,
                        support: run.len(),
                    });
                }
            }
        }
        lines
    }
}

/// Runs of consecutive ring indices (endpoints shared between neighbouring
/// runs) that stay within `dist_thres` of their chord.
fn split_and_merge(ring: &[Point2<f64>], dist_thres: f64) -> Vec<Vec<usize>> {
    let n = ring.len();
    // Start the split at the vertex farthest from vertex 0 so both halves are
    // open chains
    let far = (1..n)
        .max_by(|&a, &b| {
            let (da, db) = ((ring[a] - ring[0]).norm(), (ring[b] - ring[0]).norm());
            da.total_cmp(&db).then(b.cmp(&a))
        })
        .unwrap_or(1);

    let mut breaks = vec![0, far];
    split_chain(ring, 0, far, dist_thres, &mut breaks);
    split_chain(ring, far, n, dist_thres, &mut breaks);
    breaks.sort_unstable();
    breaks.dedup();

    // Merge neighbouring runs whose union still fits one chord
    let mut merged = true;
    while merged && breaks.len() > 2 {
        merged = false;
        for k in 0..breaks.len() {
            let prev = breaks[(k + breaks.len() - 1) % breaks.len()];
            let next = breaks[(k + 1) % breaks.len()];
            let end = if next <= prev { next + n } else { next };
            if max_deviation(ring, prev, end).map_or(false, |(d, _)| d <= dist_thres) {
                breaks.remove(k);
                merged = true;
                break;
            }
        }
    }

    let m = breaks.len();
    (0..m)
        .map(|k| {
            let a = breaks[k];
            let b = breaks[(k + 1) % m];
            let b = if b <= a { b + n } else { b };
            (a..=b).map(|i| i % n).collect()
        })
        .collect()
}

/// Recursive split of the chain `ring[a..=b]` (indices modulo the ring size)
fn split_chain(ring: &[Point2<f64>], a: usize, b: usize, dist_thres: f64, breaks: &mut Vec<usize>) {
    let Some((d, k)) = max_deviation(ring, a, b) else {
        return;
    };
    if d > dist_thres {
        breaks.push(k % ring.len());
        split_chain(ring, a, k, dist_thres, breaks);
        split_chain(ring, k, b, dist_thres, breaks);
    }
}

/// Largest distance of an interior chain vertex to the chord `a`-`b`
fn max_deviation(ring: &[Point2<f64>], a: usize, b: usize) -> Option<(f64, usize)> {
    if b <= a + 1 {
        return None;
    }
    let n = ring.len();
    let (pa, pb) = (ring[a % n], ring[b % n]);
    let chord = pb - pa;
    let len = chord.norm();
    (a + 1..b)
        .map(|k| {
            let p = ring[k % n];
            let d = if len < 1e-12 {
                (p - pa).norm()
            } else {
                (chord.x * (p.y - pa.y) - chord.y * (p.x - pa.x)).abs() / len
            };
            (d, k)
        })
        .max_by(|x, y| x.0.total_cmp(&y.0).then(y.1.cmp(&x.1)))
}

/// Total least squares line through the points, bounded by the projections
/// of the first and last point
fn fit_segment(points: &[Point2<f64>]) -> Option<(Point2<f64>, Point2<f64>)> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::<f64>::zeros(), |acc, p| acc + p.coords) / n;
    let mut cov = Matrix2::<f64>::zeros();
    for p in points {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }
    let eig = cov.symmetric_eigen();
    let major = if eig.eigenvalues[0] >= eig.eigenvalues[1] { 0 } else { 1 };
    let mut dir: Vector2<f64> = eig.eigenvectors.column(major).into_owned();
    let first = points.first()?;
    let last = points.last()?;
    if dir.dot(&(last - first)) < 0.0 {
        dir = -dir;
    }
    let origin = Point2::from(centroid);
    let t0 = (first - origin).dot(&dir);
    let t1 = (last - origin).dot(&dir);
    if t1 - t0 < 1e-9 {
        return None;
    }
    Some((origin + dir * t0, origin + dir * t1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneIntersectorConfig {
    /// Minimum number of neighbour links between two clusters
    pub min_neighbour_points: usize,
    /// Plan distance within which cluster points bound the line
    pub dist_thres: f64,
}

impl Default for PlaneIntersectorConfig {
    fn default() -> Self {
        Self {
            min_neighbour_points: 5,
            dist_thres: 1.0,
        }
    }
}

/// Intersection lines of adjacent, non-parallel planes
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneIntersector;

impl PlaneIntersector {
    /// The line of every sufficiently connected pair is bounded to the
    /// overlap of the extents of both clusters' points near the line.
    pub fn compute(
        &self,
        clusters: &[PlaneCluster],
        adjacency: &BTreeMap<(usize, usize), usize>,
        config: &PlaneIntersectorConfig,
    ) -> Vec<IntersectionLine> {
        let mut lines = Vec::new();
        for (&(a, b), &links) in adjacency {
            if links < config.min_neighbour_points {
                continue;
            }
            let (Some(ca), Some(cb)) = (clusters.get(a), clusters.get(b)) else {
                continue;
            };
            let Some((origin, dir)) = ca.plane.intersection_2d(&cb.plane) else {
                continue;
            };
            let extent = |cluster: &PlaneCluster| -> Option<(f64, f64)> {
                let mut range: Option<(f64, f64)> = None;
                for p in &cluster.points {
                    let v = Vector2::new(p.x - origin.x, p.y - origin.y);
                    let t = v.dot(&dir);
                    let off = (v - dir * t).norm();
                    if off < config.dist_thres {
                        range = Some(range.map_or((t, t), |(lo, hi)| (lo.min(t), hi.max(t))));
                    }
                }
                range
            };
            let (Some((lo_a, hi_a)), Some((lo_b, hi_b))) = (extent(ca), extent(cb)) else {
                continue;
            };
            let (lo, hi) = (lo_a.max(lo_b), hi_a.min(hi_b));
            if hi - lo < 1e-6 {
                continue;
            }
            lines.push(IntersectionLine {
                clusters: (a, b),
                start: origin + dir * lo,
                end: origin + dir * hi,
            });
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rooftop_geometry::{Plane, Point3, Vector3};

    fn rectangle_ring(w: f64, h: f64, step: f64) -> Vec<Point2<f64>> {
        let mut ring = Vec::new();
        let (nx, ny) = ((w / step).round() as usize, (h / step).round() as usize);
        for i in 0..nx {
            ring.push(Point2::new(i as f64 * step, 0.0));
        }
        for j in 0..ny {
            ring.push(Point2::new(w, j as f64 * step));
        }
        for i in 0..nx {
            ring.push(Point2::new(w - i as f64 * step, h));
        }
        for j in 0..ny {
            ring.push(Point2::new(0.0, h - j as f64 * step));
        }
        ring
    }

    #[test]
    fn test_rectangle_ring_gives_four_lines() {
        let ring = AlphaRing {
            cluster: 2,
            points: rectangle_ring(8.0, 5.0, 0.5),
        };
        let lines = LineDetector.detect(&[ring], &LineDetectorConfig::default());
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.cluster == 2));
        let mut lengths: Vec<f64> = lines.iter().map(|l| l.length()).collect();
        lengths.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(lengths[0], 5.0, epsilon = 1e-9);
        assert_relative_eq!(lengths[3], 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_noisy_side_stays_one_line() {
        let mut points = rectangle_ring(8.0, 5.0, 0.5);
        for (k, p) in points.iter_mut().enumerate() {
            if p.y == 0.0 && p.x > 0.0 {
                p.y += if k % 2 == 0 { 0.1 } else { -0.1 };
            }
        }
        let lines = LineDetector.detect(&[AlphaRing { cluster: 0, points }], &LineDetectorConfig::default());
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_triangle_ring_has_too_little_support() {
        let ring = AlphaRing {
            cluster: 0,
            points: vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)],
        };
        assert!(LineDetector.detect(&[ring], &LineDetectorConfig::default()).is_empty());
    }

    fn gable_side(x0: f64, x1: f64, normal: Vector3<f64>, id: usize) -> PlaneCluster {
        let plane = Plane::from_point_normal(&Point3::new(5.0, 0.0, 8.0), &normal).unwrap();
        let mut points = Vec::new();
        let mut x = x0;
        while x <= x1 + 1e-9 {
            for j in 0..=12 {
                let y = j as f64 * 0.5;
                points.push(Point3::new(x, y, plane.z_at(x, y).unwrap()));
            }
            x += 0.5;
        }
        PlaneCluster {
            id,
            plane,
            points,
            horizontal: false,
        }
    }

    #[test]
    fn test_ridge_line() {
        let clusters = vec![
            gable_side(0.0, 5.0, Vector3::new(-0.6, 0.0, 1.0), 0),
            gable_side(5.5, 10.0, Vector3::new(0.6, 0.0, 1.0), 1),
        ];
        let mut adjacency = BTreeMap::new();
        adjacency.insert((0, 1), 40);
        let lines = PlaneIntersector.compute(&clusters, &adjacency, &PlaneIntersectorConfig::default());
        assert_eq!(lines.len(), 1);
        let line = lines[0];
        assert_relative_eq!(line.start.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(line.end.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(line.length(), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_weak_adjacency_is_ignored() {
        let clusters = vec![
            gable_side(0.0, 5.0, Vector3::new(-0.6, 0.0, 1.0), 0),
            gable_side(5.5, 10.0, Vector3::new(0.6, 0.0, 1.0), 1),
        ];
        let mut adjacency = BTreeMap::new();
        adjacency.insert((0, 1), 2);
        assert!(PlaneIntersector
            .compute(&clusters, &adjacency, &PlaneIntersectorConfig::default())
            .is_empty());
    }
}
