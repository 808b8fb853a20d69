// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! 2D polygon rings with holes (building footprints) and their triangulation

use crate::error::{Error, Result};
use crate::triangulation::earcut_rings;
use nalgebra::Point2;

/// Polygon with an outer ring and optional interior rings (holes).
///
/// Rings are stored open: the last vertex is not a repeat of the first.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRing {
    /// Outer boundary
    pub outer: Vec<Point2<f64>>,
    /// Holes
    pub interiors: Vec<Vec<Point2<f64>>>,
}

impl LinearRing {
    /// Create a ring without holes
    pub fn new(outer: Vec<Point2<f64>>) -> Self {
        Self {
            outer: open_ring(outer),
            interiors: Vec::new(),
        }
    }

    /// Create a ring with holes
    pub fn with_interiors(outer: Vec<Point2<f64>>, interiors: Vec<Vec<Point2<f64>>>) -> Self {
        Self {
            outer: open_ring(outer),
            interiors: interiors.into_iter().map(open_ring).collect(),
        }
    }

    /// Axis-aligned rectangle, counter-clockwise
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::new(vec![
            Point2::new(min_x, min_y),
            Point2::new(max_x, min_y),
            Point2::new(max_x, max_y),
            Point2::new(min_x, max_y),
        ])
    }

    /// Add a hole to the polygon
    pub fn add_interior(&mut self, hole: Vec<Point2<f64>>) {
        self.interiors.push(open_ring(hole));
    }

    /// Check that the outer ring and every hole have at least 3 finite vertices
    pub fn validate(&self) -> Result<()> {
        if self.outer.len() < 3 {
            return Err(Error::InvalidProfile(format!(
                "outer ring has {} vertices, need at least 3",
                self.outer.len()
            )));
        }
        let all_finite = self
            .rings()
            .flat_map(|r| r.iter())
            .all(|p| p.x.is_finite() && p.y.is_finite());
        if !all_finite {
            return Err(Error::InvalidProfile(
                "ring contains non-finite coordinates".to_string(),
            ));
        }
        if let Some(hole) = self.interiors.iter().find(|h| h.len() < 3) {
            return Err(Error::InvalidProfile(format!(
                "hole has {} vertices, need at least 3",
                hole.len()
            )));
        }
        if signed_area(&self.outer).abs() < 1e-12 {
            return Err(Error::InvalidProfile("outer ring has zero area".to_string()));
        }
        Ok(())
    }

    /// Iterate over all rings, outer first
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Point2<f64>>> {
        std::iter::once(&self.outer).chain(self.interiors.iter())
    }

    /// Return a copy with the outer ring counter-clockwise and holes clockwise
    pub fn oriented(&self) -> Self {
        let mut outer = self.outer.clone();
        if signed_area(&outer) < 0.0 {
            outer.reverse();
        }
        let interiors = self
            .interiors
            .iter()
            .map(|h| {
                let mut h = h.clone();
                if signed_area(&h) > 0.0 {
                    h.reverse();
                }
                h
            })
            .collect();
        Self { outer, interiors }
    }

    /// Area of the polygon (outer minus holes)
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|h| signed_area(h).abs()).sum();
        signed_area(&self.outer).abs() - holes
    }

    /// Bounding box as (min, max)
    pub fn bounds(&self) -> (Point2<f64>, Point2<f64>) {
        let mut min = Point2::new(f64::MAX, f64::MAX);
        let mut max = Point2::new(f64::MIN, f64::MIN);
        for p in &self.outer {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        (min, max)
    }

    /// Even-odd point containment over all rings
    pub fn contains(&self, p: &Point2<f64>) -> bool {
        self.rings().filter(|r| ring_contains(r, p)).count() % 2 == 1
    }

    /// Ear-clipped triangles of the ring and its holes
    pub fn triangulate(&self) -> Result<Triangulation> {
        if self.outer.len() < 3 {
            return Err(Error::InvalidProfile(format!(
                "footprint has {} vertices",
                self.outer.len()
            )));
        }
        let (points, indices) = earcut_rings(&self.outer, self.interiors.iter().map(Vec::as_slice))?;
        Ok(Triangulation { points, indices })
    }
}

/// Triangulated polygon result
#[derive(Debug, Clone)]
pub struct Triangulation {
    /// All vertices (outer + holes)
    pub points: Vec<Point2<f64>>,
    /// Triangle indices
    pub indices: Vec<usize>,
}

/// Shoelace signed area, positive for counter-clockwise rings
pub fn signed_area(ring: &[Point2<f64>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let p = &ring[i];
        let q = &ring[(i + 1) % ring.len()];
        sum += p.x * q.y - q.x * p.y;
    }
    sum / 2.0
}

/// Ray-casting containment test for a single ring
pub fn ring_contains(ring: &[Point2<f64>], p: &Point2<f64>) -> bool {
    let mut inside = false;
    if ring.is_empty() {
        return inside;
    }
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let pi = ring[i];
        let pj = ring[j];
        if ((pi.y > p.y) != (pj.y > p.y))
            && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Drop a closing vertex equal to the first one
fn open_ring(mut ring: Vec<Point2<f64>>) -> Vec<Point2<f64>> {
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}
