// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Line regularisation.
//!
//! Lines are grouped by orientation, near-perpendicular groups are squared
//! up, and within each orientation lines are grouped by offset. Every
//! offset group becomes one representative line carrying the merged,
//! extended intervals of its members. The output is snapped to the exact
//! grid of the arrangement.

use std::f64::consts::{FRAC_PI_2, PI};

use rooftop_arrangement::GridSegment;
use rooftop_geometry::{Point2, Vector2};

use crate::error::Result;
use crate::lines::{BoundaryLine, IntersectionLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Boundary,
    Intersection,
}

/// A regularised segment with its exact counterpart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegularisedEdge {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    pub kind: EdgeKind,
    pub exact: GridSegment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegulariserConfig {
    /// Offset tolerance for lines to share one representative
    pub dist_threshold: f64,
    /// Extension at both ends, also the gap that is bridged when merging
    pub extension: f64,
    /// Orientation tolerance in degrees
    pub angle_threshold_deg: f64,
}

impl Default for RegulariserConfig {
    fn default() -> Self {
        Self {
            dist_threshold: 0.5,
            extension: 3.0,
            angle_threshold_deg: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct InputLine {
    start: Point2<f64>,
    end: Point2<f64>,
    kind: EdgeKind,
    /// Orientation in [0, pi)
    angle: f64,
    length: f64,
}

impl InputLine {
    fn new(start: Point2<f64>, end: Point2<f64>, kind: EdgeKind) -> Option<Self> {
        let d = end - start;
        let length = d.norm();
        if !(length > 1e-9) {
            return None;
        }
        Some(Self {
            start,
            end,
            kind,
            angle: d.y.atan2(d.x).rem_euclid(PI),
            length,
        })
    }

    fn midpoint(&self) -> Point2<f64> {
        Point2::from((self.start.coords + self.end.coords) * 0.5)
    }

    /// Intersection lines first, then longer lines
    fn rank(&self) -> (u8, f64) {
        let kind = match self.kind {
            EdgeKind::Intersection => 0,
            EdgeKind::Boundary => 1,
        };
        (kind, -self.length)
    }
}

/// Smallest difference between two orientations modulo pi
fn angle_diff(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(PI);
    d.min(PI - d)
}

/// Length-weighted mean orientation of the given lines (doubled-angle mean)
fn mean_angle(lines: &[&InputLine]) -> f64 {
    let (mut sx, mut sy) = (0.0, 0.0);
    for l in lines {
        sx += l.length * (2.0 * l.angle).cos();
        sy += l.length * (2.0 * l.angle).sin();
    }
    (0.5 * sy.atan2(sx)).rem_euclid(PI)
}

/// Members that should determine a representative: intersection lines when
/// present, otherwise all
fn dominant<'a>(members: &[&'a InputLine]) -> Vec<&'a InputLine> {
    let intersections: Vec<&InputLine> = members
        .iter()
        .copied()
        .filter(|l| l.kind == EdgeKind::Intersection)
        .collect();
    if intersections.is_empty() {
        members.to_vec()
    } else {
        intersections
    }
}

/// Greedy grouping: the best ranked unassigned line seeds a group that takes
/// every unassigned line within `close` of it
fn group_by<F>(lines: &[&InputLine], close: F) -> Vec<Vec<usize>>
where
    F: Fn(&InputLine, &InputLine) -> bool,
{
    let mut order: Vec<usize> = (0..lines.len()).collect();
    order.sort_by(|&a, &b| {
        let (ra, rb) = (lines[a].rank(), lines[b].rank());
        ra.0.cmp(&rb.0).then(ra.1.total_cmp(&rb.1)).then(a.cmp(&b))
    });
    let mut assigned = vec![false; lines.len()];
    let mut groups = Vec::new();
    for &seed in &order {
        if assigned[seed] {
            continue;
        }
        let mut group = Vec::new();
        for &i in &order {
            if !assigned[i] && close(lines[seed], lines[i]) {
                assigned[i] = true;
                group.push(i);
            }
        }
        groups.push(group);
    }
    groups
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LineRegulariser;

impl LineRegulariser {
    pub fn compute(
        &self,
        boundary: &[BoundaryLine],
        intersections: &[IntersectionLine],
        config: &RegulariserConfig,
    ) -> Result<Vec<RegularisedEdge>> {
        let lines: Vec<InputLine> = intersections
            .iter()
            .filter_map(|l| InputLine::new(l.start, l.end, EdgeKind::Intersection))
            .chain(
                boundary
                    .iter()
                    .filter_map(|l| InputLine::new(l.start, l.end, EdgeKind::Boundary)),
            )
            .collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let refs: Vec<&InputLine> = lines.iter().collect();
        let tolerance = config.angle_threshold_deg.to_radians();

        // Orientation groups with their representative angle and weight
        let mut orientations: Vec<(Vec<usize>, f64, f64)> = group_by(&refs, |a, b| {
            angle_diff(a.angle, b.angle) <= tolerance
        })
        .into_iter()
        .map(|group| {
            let members: Vec<&InputLine> = group.iter().map(|&i| refs[i]).collect();
            let angle = mean_angle(&dominant(&members));
            let weight = members.iter().map(|l| l.length).sum::<f64>();
            (group, angle, weight)
        })
        .collect();

        // Square up near-perpendicular groups to the heavier one
        let mut order: Vec<usize> = (0..orientations.len()).collect();
        order.sort_by(|&a, &b| orientations[b].2.total_cmp(&orientations[a].2).then(a.cmp(&b)));
        let mut fixed = vec![false; orientations.len()];
        for (pos, &g) in order.iter().enumerate() {
            let reference = orientations[g].1;
            fixed[g] = true;
            for &h in &order[pos + 1..] {
                if fixed[h] {
                    continue;
                }
                if (angle_diff(reference, orientations[h].1) - FRAC_PI_2).abs() <= tolerance {
                    orientations[h].1 = (reference + FRAC_PI_2).rem_euclid(PI);
                    fixed[h] = true;
                }
            }
        }

        let mut edges = Vec::new();
        for (group, angle, _) in &orientations {
            let dir = Vector2::new(angle.cos(), angle.sin());
            let normal = Vector2::new(-dir.y, dir.x);
            let members: Vec<&InputLine> = group.iter().map(|&i| refs[i]).collect();
            let offset_of = |l: &InputLine| normal.dot(&l.midpoint().coords);

            for offset_group in group_by(&members, |a, b| {
                (offset_of(a) - offset_of(b)).abs() <= config.dist_threshold
            }) {
                let parts: Vec<&InputLine> = offset_group.iter().map(|&i| members[i]).collect();
                let weights = dominant(&parts);
                let total: f64 = weights.iter().map(|l| l.length).sum();
                let offset = weights.iter().map(|l| offset_of(l) * l.length).sum::<f64>() / total;
                let kind = if parts.iter().any(|l| l.kind == EdgeKind::Intersection) {
                    EdgeKind::Intersection
                } else {
                    EdgeKind::Boundary
                };

                let mut intervals: Vec<(f64, f64)> = parts
                    .iter()
                    .map(|l| {
                        let (a, b) = (dir.dot(&l.start.coords), dir.dot(&l.end.coords));
                        (a.min(b), a.max(b))
                    })
                    .collect();
                intervals.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

                let base = Point2::from(normal * offset);
                let mut merged: Vec<(f64, f64)> = Vec::new();
                for (lo, hi) in intervals {
                    match merged.last_mut() {
                        Some(last) if lo - last.1 <= 2.0 * config.extension => last.1 = last.1.max(hi),
                        _ => merged.push((lo, hi)),
                    }
                }
                for (lo, hi) in merged {
                    let start = base + dir * (lo - config.extension);
                    let end = base + dir * (hi + config.extension);
                    let exact = GridSegment::snap(&start, &end)?;
                    if exact.is_degenerate() {
                        continue;
                    }
                    edges.push(RegularisedEdge {
                        start,
                        end,
                        kind,
                        exact,
                    });
                }
            }
        }

        tracing::debug!(
            input = lines.len(),
            orientations = orientations.len(),
            output = edges.len(),
            "lines regularised"
        );
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn boundary(ax: f64, ay: f64, bx: f64, by: f64) -> BoundaryLine {
        BoundaryLine {
            cluster: 0,
            start: Point2::new(ax, ay),
            end: Point2::new(bx, by),
            support: 10,
        }
    }

    #[test]
    fn test_parallel_lines_collapse() {
        let lines = [
            boundary(0.0, 0.0, 5.0, 0.05),
            boundary(6.0, 0.2, 10.0, 0.15),
            boundary(0.0, 8.0, 10.0, 8.0),
        ];
        let config = RegulariserConfig {
            extension: 1.0,
            ..Default::default()
        };
        let edges = LineRegulariser.compute(&lines, &[], &config).unwrap();
        assert_eq!(edges.len(), 2);
        for e in &edges {
            assert_relative_eq!(e.start.y, e.end.y, epsilon = 1e-3);
            assert_eq!(e.kind, EdgeKind::Boundary);
        }
        // The merged pair spans both members plus the extension
        let merged = edges.iter().find(|e| e.start.y < 1.0).unwrap();
        assert_relative_eq!((merged.end - merged.start).norm(), 12.0, epsilon = 0.05);
    }

    #[test]
    fn test_intersection_line_dominates_offset() {
        let ridge = IntersectionLine {
            clusters: (0, 1),
            start: Point2::new(5.0, 0.0),
            end: Point2::new(5.0, 6.0),
        };
        let lines = [boundary(5.25, 0.0, 5.25, 6.0), boundary(4.9, 0.0, 4.9, 6.0)];
        let config = RegulariserConfig {
            extension: 0.5,
            ..Default::default()
        };
        let edges = LineRegulariser.compute(&lines, &[ridge], &config).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Intersection);
        assert_relative_eq!(edges[0].start.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(edges[0].end.x, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_near_perpendicular_lines_are_squared() {
        let lines = [
            boundary(0.0, 0.0, 10.0, 0.0),
            boundary(0.0, 0.0, 10.0, 0.0),
            boundary(3.0, 0.0, 3.1, 4.0),
        ];
        let edges = LineRegulariser
            .compute(&lines, &[], &RegulariserConfig::default())
            .unwrap();
        assert_eq!(edges.len(), 2);
        let vertical = edges.iter().find(|e| (e.end.x - e.start.x).abs() < 1.0).unwrap();
        assert_relative_eq!(vertical.start.x, vertical.end.x, epsilon = 1e-9);
    }

    #[test]
    fn test_distant_gaps_stay_apart() {
        let lines = [boundary(0.0, 0.0, 2.0, 0.0), boundary(10.0, 0.0, 12.0, 0.0)];
        let config = RegulariserConfig {
            extension: 1.0,
            ..Default::default()
        };
        let edges = LineRegulariser.compute(&lines, &[], &config).unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_no_lines() {
        let edges = LineRegulariser
            .compute(&[], &[], &RegulariserConfig::default())
            .unwrap();
        assert!(edges.is_empty());
    }
}
