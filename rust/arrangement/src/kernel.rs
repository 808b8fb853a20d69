// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Exact 2D kernel on a fixed integer grid.
//!
//! Coordinates are snapped once to multiples of [`GRID_RESOLUTION`] and kept
//! as `i64`. Orientation tests are evaluated in `i128` and never round, so
//! face adjacency derived from them is exact. The only rounding step is the
//! placement of a new vertex where two segments cross, which is snapped back
//! onto the grid.

use std::cmp::Ordering;

use nalgebra::Point2;
use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Grid spacing in coordinate units (0.1 mm for metric input)
pub const GRID_RESOLUTION: f64 = 1e-4;

/// Largest absolute grid coordinate; keeps every product below `i128::MAX`
pub const MAX_GRID_COORD: i64 = 1 << 40;

/// Point with integer grid coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
}

impl GridPoint {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Snap a floating point position to the nearest grid point
    pub fn snap(x: f64, y: f64) -> Result<Self> {
        Ok(Self {
            x: snap_coord(x)?,
            y: snap_coord(y)?,
        })
    }

    pub fn from_point(p: &Point2<f64>) -> Result<Self> {
        Self::snap(p.x, p.y)
    }

    /// Position in coordinate units
    pub fn to_point(self) -> Point2<f64> {
        Point2::new(
            self.x as f64 * GRID_RESOLUTION,
            self.y as f64 * GRID_RESOLUTION,
        )
    }

    fn sub(self, other: GridPoint) -> (i128, i128) {
        (
            self.x as i128 - other.x as i128,
            self.y as i128 - other.y as i128,
        )
    }
}

fn snap_coord(v: f64) -> Result<i64> {
    let scaled = (v / GRID_RESOLUTION).round();
    if !scaled.is_finite() || scaled.abs() > MAX_GRID_COORD as f64 {
        return Err(Error::CoordinateOverflow(v));
    }
    Ok(scaled as i64)
}

/// Directed segment between two grid points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridSegment {
    pub source: GridPoint,
    pub target: GridPoint,
}

impl GridSegment {
    pub const fn new(source: GridPoint, target: GridPoint) -> Self {
        Self { source, target }
    }

    /// Snap both endpoints of a floating point segment
    pub fn snap(a: &Point2<f64>, b: &Point2<f64>) -> Result<Self> {
        Ok(Self::new(GridPoint::from_point(a)?, GridPoint::from_point(b)?))
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.source == self.target
    }

    pub fn reversed(self) -> Self {
        Self::new(self.target, self.source)
    }

    /// Segment with `source < target`, and whether it was flipped
    pub fn normalized(self) -> (Self, bool) {
        if self.source <= self.target {
            (self, false)
        } else {
            (self.reversed(), true)
        }
    }

    /// Euclidean length in coordinate units
    pub fn length(&self) -> f64 {
        (self.target.to_point() - self.source.to_point()).norm()
    }

    /// Direction vector in grid units
    pub fn direction(&self) -> (i64, i64) {
        (
            self.target.x - self.source.x,
            self.target.y - self.source.y,
        )
    }
}

/// Twice the signed area of triangle `abc`; positive when `c` lies left of `ab`
#[inline]
pub fn orient(a: GridPoint, b: GridPoint, c: GridPoint) -> i128 {
    let (abx, aby) = b.sub(a);
    let (acx, acy) = c.sub(a);
    abx * acy - aby * acx
}

/// Order two direction vectors by counter-clockwise angle from the +x axis
pub fn angle_cmp(a: (i64, i64), b: (i64, i64)) -> Ordering {
    let half = |d: (i64, i64)| if d.1 > 0 || (d.1 == 0 && d.0 > 0) { 0u8 } else { 1u8 };
    half(a).cmp(&half(b)).then_with(|| {
        let cross = a.0 as i128 * b.1 as i128 - a.1 as i128 * b.0 as i128;
        0.cmp(&cross)
    })
}

/// Twice the signed area of a closed ring
pub fn ring_area2(ring: &[GridPoint]) -> i128 {
    let n = ring.len();
    let mut sum = 0i128;
    for i in 0..n {
        let p = ring[i];
        let q = ring[(i + 1) % n];
        sum += p.x as i128 * q.y as i128 - q.x as i128 * p.y as i128;
    }
    sum
}

/// Exact even-odd containment of `p` in a closed ring.
///
/// Points on the boundary give an unspecified answer; callers only query
/// points that are known to be off the ring.
pub fn ring_contains(ring: &[GridPoint], p: GridPoint) -> bool {
    ring_contains_scaled(ring, 1, p)
}

/// Even-odd containment against the ring scaled by `scale`.
///
/// Used with `scale = 2` to test segment midpoints without leaving the grid.
pub fn ring_contains_scaled(ring: &[GridPoint], scale: i64, p: GridPoint) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = GridPoint::new(ring[i].x * scale, ring[i].y * scale);
        let b = GridPoint::new(ring[(i + 1) % n].x * scale, ring[(i + 1) % n].y * scale);
        if (a.y > p.y) != (b.y > p.y) {
            // Crossing lies right of p when p is left of an upward edge
            let side = orient(a, b, p);
            let crosses = if b.y > a.y { side > 0 } else { side < 0 };
            if crosses {
                inside = !inside;
            }
        }
    }
    inside
}

/// Rounded integer division, halves away from zero
fn div_round(n: i128, d: i128) -> i128 {
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
    if n >= 0 {
        (n + d / 2) / d
    } else {
        -((-n + d / 2) / d)
    }
}

/// `p` lies strictly between the endpoints of `s`, given that it is collinear
fn strictly_inside(s: &GridSegment, p: GridPoint) -> bool {
    if p == s.source || p == s.target {
        return false;
    }
    let (lo_x, hi_x) = (s.source.x.min(s.target.x), s.source.x.max(s.target.x));
    let (lo_y, hi_y) = (s.source.y.min(s.target.y), s.source.y.max(s.target.y));
    p.x >= lo_x && p.x <= hi_x && p.y >= lo_y && p.y <= hi_y
}

/// Split points for a segment pair
pub type SplitPoints = SmallVec<[GridPoint; 2]>;

/// Points at which `s` and `t` must be split so that afterwards they meet at
/// most in shared endpoints.
///
/// Proper crossings are rounded onto the grid. Collinear overlaps split each
/// segment at the other's endpoints so the shared part becomes one piece.
pub fn split_points(s: &GridSegment, t: &GridSegment) -> (SplitPoints, SplitPoints) {
    let mut on_s = SplitPoints::new();
    let mut on_t = SplitPoints::new();
    if s.is_degenerate() || t.is_degenerate() {
        return (on_s, on_t);
    }

    let (a, b, c, d) = (s.source, s.target, t.source, t.target);
    let d1 = orient(c, d, a).signum();
    let d2 = orient(c, d, b).signum();
    let d3 = orient(a, b, c).signum();
    let d4 = orient(a, b, d).signum();

    if d1 == 0 && d2 == 0 {
        for p in [c, d] {
            if strictly_inside(s, p) {
                on_s.push(p);
            }
        }
        for p in [a, b] {
            if strictly_inside(t, p) {
                on_t.push(p);
            }
        }
        return (on_s, on_t);
    }

    if d1 * d2 < 0 && d3 * d4 < 0 {
        let p = crossing_point(s, t);
        if p != a && p != b {
            on_s.push(p);
        }
        if p != c && p != d {
            on_t.push(p);
        }
        return (on_s, on_t);
    }

    // Touching configurations: an endpoint lies on the other segment
    if d1 == 0 && strictly_inside(t, a) {
        on_t.push(a);
    }
    if d2 == 0 && strictly_inside(t, b) {
        on_t.push(b);
    }
    if d3 == 0 && strictly_inside(s, c) {
        on_s.push(c);
    }
    if d4 == 0 && strictly_inside(s, d) {
        on_s.push(d);
    }
    (on_s, on_t)
}

/// Crossing point of two properly crossing segments, rounded to the grid
fn crossing_point(s: &GridSegment, t: &GridSegment) -> GridPoint {
    let (rx, ry) = s.target.sub(s.source);
    let (qx, qy) = t.target.sub(t.source);
    let (wx, wy) = t.source.sub(s.source);
    let den = rx * qy - ry * qx;
    let num = wx * qy - wy * qx;
    GridPoint::new(
        (s.source.x as i128 + div_round(rx * num, den)) as i64,
        (s.source.y as i128 + div_round(ry * num, den)) as i64,
    )
}

/// Position of `p` along `s`, for ordering split points
pub fn projection(s: &GridSegment, p: GridPoint) -> i128 {
    let (dx, dy) = s.target.sub(s.source);
    let (px, py) = p.sub(s.source);
    px * dx + py * dy
}
