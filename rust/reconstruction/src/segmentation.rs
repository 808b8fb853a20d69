// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plane segmentation by region growing on a k-nearest-neighbour graph.
//!
//! Every point gets a local plane fitted to its neighbourhood. Regions are
//! grown from the most planar seeds over the neighbour graph while the
//! candidate lies within `epsilon` of the region plane and its local normal
//! agrees with the region normal. Regions smaller than `min_points` are
//! released again.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use kdtree::distance::squared_euclidean;
use kdtree::KdTree;
use nalgebra::Matrix2;
use rooftop_geometry::{Plane, Point3};
use serde::{Deserialize, Serialize};

use crate::error::{ReconstructionError, Result};
use crate::stats::HeightSummary;

/// Planes whose normal is within this many degrees of vertical are flat
pub const HORIZONTAL_MAX_ANGLE_DEG: f64 = 5.0;

/// Plan-view variance below which a point set has no 2D extent
const MIN_PLAN_VARIANCE: f64 = 1e-10;

/// Region growing parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneDetectorConfig {
    /// Neighbourhood size
    pub k: usize,
    pub min_points: usize,
    /// Maximum distance of a point to the region plane
    pub epsilon: f64,
    /// Minimum |cos| between a point normal and the region normal
    pub normal_threshold: f64,
    pub with_limits: bool,
    pub limit_n_regions: usize,
    pub limit_n_milliseconds: u64,
}

impl Default for PlaneDetectorConfig {
    fn default() -> Self {
        Self {
            k: 15,
            min_points: 15,
            epsilon: 0.3,
            normal_threshold: 0.75,
            with_limits: false,
            limit_n_regions: 900,
            limit_n_milliseconds: 1_800_000,
        }
    }
}

/// Roof classification derived from the detected planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoofType {
    NoPoints,
    NoPlanes,
    Horizontal,
    MultipleHorizontal,
    Slanted,
}

impl RoofType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoofType::NoPoints => "no points",
            RoofType::NoPlanes => "no planes",
            RoofType::Horizontal => "horizontal",
            RoofType::MultipleHorizontal => "multiple horizontal",
            RoofType::Slanted => "slanted",
        }
    }

    /// Not enough data to reconstruct a roof
    pub fn is_insufficient(&self) -> bool {
        matches!(self, RoofType::NoPoints | RoofType::NoPlanes)
    }
}

impl fmt::Display for RoofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected plane with its member points
#[derive(Debug, Clone)]
pub struct PlaneCluster {
    /// Index into [`PlaneDetection::clusters`]
    pub id: usize,
    /// Least-squares plane through the members, normal pointing up
    pub plane: Plane,
    pub points: Vec<Point3<f64>>,
    pub horizontal: bool,
}

/// Result of [`PlaneDetector::detect`]
#[derive(Debug, Clone)]
pub struct PlaneDetection {
    pub clusters: Vec<PlaneCluster>,
    /// Cluster of every input point, `None` when unassigned
    pub plane_id: Vec<Option<usize>>,
    /// Number of neighbour links between two clusters, keyed `(low, high)`
    pub adjacency: BTreeMap<(usize, usize), usize>,
    pub roof_type: RoofType,
    /// Height percentiles over all input points
    pub elevation: Option<HeightSummary>,
    /// Growing stopped early on the region or time limit
    pub limit_reached: bool,
}

impl PlaneDetection {
    pub(crate) fn without_planes(roof_type: RoofType, n_points: usize, elevation: Option<HeightSummary>) -> Self {
        Self {
            clusters: Vec::new(),
            plane_id: vec![None; n_points],
            adjacency: BTreeMap::new(),
            roof_type,
            elevation,
            limit_reached: false,
        }
    }
}

/// Region-growing plane detector
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneDetector;

impl PlaneDetector {
    /// Segment `points` into planes.
    ///
    /// Fewer than `min_points` points give roof type "no points" and no
    /// region surviving gives "no planes"; neither is an error. Non-finite
    /// coordinates and point sets without extent in plan are faults.
    pub fn detect(&self, points: &[Point3<f64>], config: &PlaneDetectorConfig) -> Result<PlaneDetection> {
        let start = Instant::now();
        let elevation = HeightSummary::from_samples(points.iter().map(|p| p.z).collect());

        if points.len() < config.min_points.max(3) {
            return Ok(PlaneDetection::without_planes(
                RoofType::NoPoints,
                points.len(),
                elevation,
            ));
        }
        if let Some(p) = points
            .iter()
            .find(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(ReconstructionError::Segmentation(format!(
                "non-finite coordinate ({}, {}, {})",
                p.x, p.y, p.z
            )));
        }
        check_plan_extent(points)?;

        let neighbours = knn_graph(points, config.k)?;

        // Local plane and planarity residual of every point
        let local: Vec<Option<(Plane, f64)>> = neighbours
            .iter()
            .enumerate()
            .map(|(i, nbrs)| {
                let mut hood = Vec::with_capacity(nbrs.len() + 1);
                hood.push(points[i]);
                hood.extend(nbrs.iter().map(|&j| points[j]));
                Plane::fit(&hood).ok()
            })
            .collect();

        let mut seeds: Vec<usize> = (0..points.len()).filter(|&i| local[i].is_some()).collect();
        seeds.sort_by(|&a, &b| {
            let (ra, rb) = (local[a].map_or(0.0, |l| l.1), local[b].map_or(0.0, |l| l.1));
            ra.total_cmp(&rb).then(a.cmp(&b))
        });

        let mut plane_id: Vec<Option<usize>> = vec![None; points.len()];
        let mut stamp = vec![usize::MAX; points.len()];
        let mut clusters: Vec<PlaneCluster> = Vec::new();
        let mut limit_reached = false;

        for (run, &seed) in seeds.iter().enumerate() {
            if plane_id[seed].is_some() {
                continue;
            }
            if config.with_limits
                && (clusters.len() >= config.limit_n_regions
                    || start.elapsed().as_millis() >= u128::from(config.limit_n_milliseconds))
            {
                limit_reached = true;
                break;
            }
            let Some((mut plane, _)) = local[seed] else {
                continue;
            };

            let mut region = vec![seed];
            let mut stack = vec![seed];
            stamp[seed] = run;
            let mut next_refit = config.k.max(3);
            while let Some(p) = stack.pop() {
                for &q in &neighbours[p] {
                    if plane_id[q].is_some() || stamp[q] == run {
                        continue;
                    }
                    let Some((q_plane, _)) = &local[q] else {
                        continue;
                    };
                    if plane.signed_distance(&points[q]).abs() >= config.epsilon {
                        continue;
                    }
                    if q_plane.normal.dot(&plane.normal).abs() <= config.normal_threshold {
                        continue;
                    }
                    stamp[q] = run;
                    region.push(q);
                    stack.push(q);
                }
                if region.len() >= next_refit {
                    let members: Vec<Point3<f64>> = region.iter().map(|&i| points[i]).collect();
                    if let Ok((refit, _)) = Plane::fit(&members) {
                        plane = refit;
                    }
                    next_refit = region.len() * 2;
                }
            }

            if region.len() < config.min_points {
                continue;
            }
            let members: Vec<Point3<f64>> = region.iter().map(|&i| points[i]).collect();
            let Ok((fitted, _)) = Plane::fit(&members) else {
                continue;
            };
            let id = clusters.len();
            for &i in &region {
                plane_id[i] = Some(id);
            }
            clusters.push(PlaneCluster {
                id,
                plane: fitted,
                points: members,
                horizontal: fitted.is_horizontal(HORIZONTAL_MAX_ANGLE_DEG),
            });
        }

        let mut adjacency = BTreeMap::new();
        for (i, nbrs) in neighbours.iter().enumerate() {
            let Some(a) = plane_id[i] else {
                continue;
            };
            for &j in nbrs {
                match plane_id[j] {
                    Some(b) if b != a => {
                        *adjacency.entry((a.min(b), a.max(b))).or_insert(0) += 1;
                    }
                    _ => {}
                }
            }
        }

        let roof_type = classify(&clusters, config.epsilon);
        tracing::debug!(
            points = points.len(),
            planes = clusters.len(),
            roof_type = roof_type.as_str(),
            limit_reached,
            "plane detection finished"
        );

        Ok(PlaneDetection {
            clusters,
            plane_id,
            adjacency,
            roof_type,
            elevation,
            limit_reached,
        })
    }
}

/// Fail when the points are coincident or collinear in plan
fn check_plan_extent(points: &[Point3<f64>]) -> Result<()> {
    let n = points.len() as f64;
    let (mx, my) = points
        .iter()
        .fold((0.0, 0.0), |(x, y), p| (x + p.x / n, y + p.y / n));
    let mut cov = Matrix2::<f64>::zeros();
    for p in points {
        let (dx, dy) = (p.x - mx, p.y - my);
        cov[(0, 0)] += dx * dx / n;
        cov[(0, 1)] += dx * dy / n;
        cov[(1, 1)] += dy * dy / n;
    }
    cov[(1, 0)] = cov[(0, 1)];
    let eig = cov.symmetric_eigen();
    let smallest = eig.eigenvalues[0].min(eig.eigenvalues[1]);
    if smallest < MIN_PLAN_VARIANCE {
        return Err(ReconstructionError::Segmentation(
            "points have no extent in plan, planes cannot be fit".to_string(),
        ));
    }
    Ok(())
}

/// Neighbour lists (without the point itself) from a kd-tree
fn knn_graph(points: &[Point3<f64>], k: usize) -> Result<Vec<Vec<usize>>> {
    let mut tree: KdTree<f64, usize, [f64; 3]> = KdTree::with_capacity(3, 64);
    for (i, p) in points.iter().enumerate() {
        tree.add([p.x, p.y, p.z], i)
            .map_err(|e| ReconstructionError::Segmentation(format!("kd-tree insert failed: {e:?}")))?;
    }

    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let found = tree
                .nearest(&[p.x, p.y, p.z], k + 1, &squared_euclidean)
                .map_err(|e| ReconstructionError::Segmentation(format!("kd-tree query failed: {e:?}")))?;
            Ok(found
                .into_iter()
                .map(|(_, &j)| j)
                .filter(|&j| j != i)
                .take(k)
                .collect())
        })
        .collect()
}

fn classify(clusters: &[PlaneCluster], epsilon: f64) -> RoofType {
    if clusters.is_empty() {
        return RoofType::NoPlanes;
    }
    if !clusters.iter().all(|c| c.horizontal) {
        return RoofType::Slanted;
    }
    let mut levels: Vec<f64> = clusters
        .iter()
        .map(|c| c.points.iter().map(|p| p.z).sum::<f64>() / c.points.len() as f64)
        .collect();
    levels.sort_by(|a, b| a.total_cmp(b));
    let distinct = 1 + levels.windows(2).filter(|w| w[1] - w[0] > epsilon).count();
    if distinct > 1 {
        RoofType::MultipleHorizontal
    } else {
        RoofType::Horizontal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid(nx: usize, ny: usize, step: f64, z: impl Fn(f64, f64) -> f64) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(nx * ny);
        for i in 0..nx {
            for j in 0..ny {
                let (x, y) = (i as f64 * step, j as f64 * step);
                points.push(Point3::new(x, y, z(x, y)));
            }
        }
        points
    }

    #[test]
    fn test_single_flat_plane() {
        let points = grid(20, 20, 0.5, |_, _| 6.0);
        let detection = PlaneDetector
            .detect(&points, &PlaneDetectorConfig::default())
            .unwrap();
        assert_eq!(detection.clusters.len(), 1);
        assert_eq!(detection.roof_type, RoofType::Horizontal);
        assert!(detection.plane_id.iter().all(|id| *id == Some(0)));
        let elevation = detection.elevation.unwrap();
        assert_relative_eq!(elevation.p70, 6.0);
    }

    #[test]
    fn test_gable_gives_two_adjacent_planes() {
        // Ridge along y at x = 5
        let points = grid(21, 16, 0.5, |x, _| 8.0 - 0.6 * (x - 5.0).abs());
        let detection = PlaneDetector
            .detect(&points, &PlaneDetectorConfig::default())
            .unwrap();
        assert_eq!(detection.clusters.len(), 2);
        assert_eq!(detection.roof_type, RoofType::Slanted);
        assert_eq!(detection.adjacency.len(), 1);
        assert!(detection.adjacency.contains_key(&(0, 1)));
        for cluster in &detection.clusters {
            assert_relative_eq!(
                cluster.plane.slope_deg(),
                0.6f64.atan().to_degrees(),
                epsilon = 0.5
            );
        }
    }

    #[test]
    fn test_two_flat_levels() {
        let mut points = grid(10, 10, 0.5, |_, _| 3.0);
        let shift = nalgebra::Vector3::new(10.0, 0.0, 0.0);
        points.extend(grid(10, 10, 0.5, |_, _| 9.0).into_iter().map(|p| p + shift));
        let detection = PlaneDetector
            .detect(&points, &PlaneDetectorConfig::default())
            .unwrap();
        assert_eq!(detection.clusters.len(), 2);
        assert_eq!(detection.roof_type, RoofType::MultipleHorizontal);
        assert!(detection.adjacency.is_empty());
    }

    #[test]
    fn test_sparse_cloud_is_no_points() {
        let points = grid(3, 3, 1.0, |_, _| 2.0);
        let detection = PlaneDetector
            .detect(&points, &PlaneDetectorConfig::default())
            .unwrap();
        assert_eq!(detection.roof_type, RoofType::NoPoints);
        assert!(detection.clusters.is_empty());
        assert_eq!(detection.plane_id.len(), 9);
        assert!(detection.elevation.is_some());
    }

    #[test]
    fn test_empty_cloud() {
        let detection = PlaneDetector
            .detect(&[], &PlaneDetectorConfig::default())
            .unwrap();
        assert_eq!(detection.roof_type, RoofType::NoPoints);
        assert!(detection.elevation.is_none());
    }

    #[test]
    fn test_scattered_points_have_no_planes() {
        // Two interleaved levels, each too small to become a plane
        let points = grid(6, 6, 1.0, |x, y| if (x + y) as i64 % 2 == 0 { 0.0 } else { 5.0 });
        let config = PlaneDetectorConfig {
            k: 5,
            min_points: 30,
            ..Default::default()
        };
        let detection = PlaneDetector.detect(&points, &config).unwrap();
        assert_eq!(detection.roof_type, RoofType::NoPlanes);
    }

    #[test]
    fn test_collinear_points_are_a_fault() {
        let points: Vec<_> = (0..40)
            .map(|i| Point3::new(i as f64 * 0.2, 1.0, 4.0 + i as f64 * 0.01))
            .collect();
        let err = PlaneDetector
            .detect(&points, &PlaneDetectorConfig::default())
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::Segmentation(_)));
    }

    #[test]
    fn test_non_finite_is_a_fault() {
        let mut points = grid(5, 5, 1.0, |_, _| 1.0);
        points[3].z = f64::NAN;
        assert!(PlaneDetector
            .detect(&points, &PlaneDetectorConfig::default())
            .is_err());
    }

    #[test]
    fn test_region_limit_returns_partial_result() {
        let points = grid(21, 16, 0.5, |x, _| 8.0 - 0.6 * (x - 5.0).abs());
        let config = PlaneDetectorConfig {
            with_limits: true,
            limit_n_regions: 1,
            ..Default::default()
        };
        let detection = PlaneDetector.detect(&points, &config).unwrap();
        assert_eq!(detection.clusters.len(), 1);
        assert!(detection.limit_reached);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let points = grid(21, 16, 0.5, |x, _| 8.0 - 0.6 * (x - 5.0).abs());
        let config = PlaneDetectorConfig::default();
        let a = PlaneDetector.detect(&points, &config).unwrap();
        let b = PlaneDetector.detect(&points, &config).unwrap();
        assert_eq!(a.plane_id, b.plane_id);
        assert_eq!(a.adjacency, b.adjacency);
    }
}
