// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plane equations for roof segments
//!
//! A plane is stored as a unit normal `n` and offset `d` with `n·p + d = 0`.
//! Roof planes are kept with an upward-facing normal.

use crate::error::{Error, Result};
use nalgebra::{Matrix3, Point2, Point3, Vector2, Vector3};

/// Normals with a vertical component below this are treated as walls
const MIN_NORMAL_Z: f64 = 1e-6;

/// Plane in Hessian normal form
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal
    pub normal: Vector3<f64>,
    /// Offset, `normal·p + d = 0` on the plane
    pub d: f64,
}

impl Plane {
    /// Plane through `point` with the given (not necessarily unit) normal
    pub fn from_point_normal(point: &Point3<f64>, normal: &Vector3<f64>) -> Result<Self> {
        let normal = normal
            .try_normalize(1e-12)
            .ok_or_else(|| Error::DegeneratePlane("zero-length normal".to_string()))?;
        Ok(Self {
            normal,
            d: -normal.dot(&point.coords),
        })
    }

    /// Horizontal plane at height `z`
    pub fn horizontal(z: f64) -> Self {
        Self {
            normal: Vector3::z(),
            d: -z,
        }
    }

    /// Least-squares plane through the points (PCA on the covariance matrix).
    ///
    /// Returns the plane together with the smallest eigenvalue divided by the
    /// point count, a measure of local non-planarity.
    pub fn fit(points: &[Point3<f64>]) -> Result<(Self, f64)> {
        if points.len() < 3 {
            return Err(Error::DegeneratePlane(format!(
                "need at least 3 points, got {}",
                points.len()
            )));
        }

        let n = points.len() as f64;
        let centroid = points
            .iter()
            .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + p.coords)
            / n;

        let mut cov = Matrix3::<f64>::zeros();
        for p in points {
            let d = p.coords - centroid;
            cov += d * d.transpose();
        }

        // Smallest eigenvector is the normal
        let eig = cov.symmetric_eigen();
        let mut min_idx = 0;
        for i in 1..3 {
            if eig.eigenvalues[i] < eig.eigenvalues[min_idx] {
                min_idx = i;
            }
        }
        let mut sorted = [eig.eigenvalues[0], eig.eigenvalues[1], eig.eigenvalues[2]];
        sorted.sort_by(|a, b| a.total_cmp(b));
        if !(sorted[1] > 1e-12) {
            // All points coincide or lie on one line
            return Err(Error::DegeneratePlane(
                "points do not span a plane".to_string(),
            ));
        }

        let normal: Vector3<f64> = eig.eigenvectors.column(min_idx).into_owned();
        let mut plane = Self::from_point_normal(&Point3::from(centroid), &normal)?;
        plane.orient_up();
        Ok((plane, eig.eigenvalues[min_idx].max(0.0) / n))
    }

    /// Flip the plane so that its normal points upward
    pub fn orient_up(&mut self) {
        if self.normal.z < 0.0 {
            self.normal = -self.normal;
            self.d = -self.d;
        }
    }

    /// Signed distance from a point to the plane
    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) + self.d
    }

    /// Height of the plane above (x, y), or `None` for vertical planes
    #[inline]
    pub fn z_at(&self, x: f64, y: f64) -> Option<f64> {
        if self.normal.z.abs() < MIN_NORMAL_Z {
            return None;
        }
        Some(-(self.normal.x * x + self.normal.y * y + self.d) / self.normal.z)
    }

    /// Orthogonal projection of a point onto the plane
    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }

    /// Whether the normal is within `max_angle_deg` of vertical
    pub fn is_horizontal(&self, max_angle_deg: f64) -> bool {
        self.normal.z.abs() >= max_angle_deg.to_radians().cos()
    }

    /// Slope angle in degrees (0 = flat)
    pub fn slope_deg(&self) -> f64 {
        self.normal.z.abs().min(1.0).acos().to_degrees()
    }

    /// Plan-view line where this plane meets `other`.
    ///
    /// Returns a point on the line and its unit 2D direction, or `None` when
    /// the planes are parallel in plan (for example two horizontal planes).
    pub fn intersection_2d(&self, other: &Plane) -> Option<(Point2<f64>, Vector2<f64>)> {
        let dir3 = self.normal.cross(&other.normal);
        let dir = Vector2::new(dir3.x, dir3.y);
        let len = dir.norm();
        if len < 1e-9 {
            return None;
        }
        // Both planes as z = a x + b y + c; intersection satisfies
        // (a1 - a2) x + (b1 - b2) y + (c1 - c2) = 0
        let (a1, b1, c1) = self.slope_form()?;
        let (a2, b2, c2) = other.slope_form()?;
        let (a, b, c) = (a1 - a2, b1 - b2, c1 - c2);
        let g2 = a * a + b * b;
        if g2 < 1e-18 {
            return None;
        }
        let origin = Point2::new(-a * c / g2, -b * c / g2);
        Some((origin, dir / len))
    }

    /// Coefficients (a, b, c) with z = a x + b y + c
    fn slope_form(&self) -> Option<(f64, f64, f64)> {
        if self.normal.z.abs() < MIN_NORMAL_Z {
            return None;
        }
        let nz = self.normal.z;
        Some((-self.normal.x / nz, -self.normal.y / nz, -self.d / nz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_tilted_plane() {
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let (x, y) = (i as f64, j as f64);
                points.push(Point3::new(x, y, 0.5 * x + 2.0));
            }
        }
        let (plane, residual) = Plane::fit(&points).unwrap();
        assert!(plane.normal.z > 0.0);
        assert!(residual < 1e-12);
        assert_relative_eq!(plane.z_at(4.0, 7.0).unwrap(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(plane.slope_deg(), 0.5f64.atan().to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_fit_collinear_fails() {
        let points: Vec<_> = (0..10).map(|i| Point3::new(i as f64, 0.0, 1.0)).collect();
        assert!(Plane::fit(&points).is_err());
    }

    #[test]
    fn test_gable_intersection() {
        let left = Plane::from_point_normal(
            &Point3::new(0.0, 0.0, 3.0),
            &Vector3::new(-1.0, 0.0, 1.0),
        )
        .unwrap();
        let right = Plane::from_point_normal(
            &Point3::new(10.0, 0.0, 3.0),
            &Vector3::new(1.0, 0.0, 1.0),
        )
        .unwrap();
        let (origin, dir) = left.intersection_2d(&right).unwrap();
        assert_relative_eq!(origin.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(dir.x.abs(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(dir.y.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_horizontal_planes_do_not_intersect() {
        let a = Plane::horizontal(3.0);
        let b = Plane::horizontal(6.0);
        assert!(a.intersection_2d(&b).is_none());
        assert!(a.is_horizontal(1.0));
    }
}
