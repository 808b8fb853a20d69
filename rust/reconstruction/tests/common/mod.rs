// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic buildings shared by the integration tests.

#![allow(dead_code)]

use rooftop_geometry::{LinearRing, Point3};
use rooftop_reconstruction::Building;

/// Sample spacing of the synthetic point clouds
pub const SPACING: f64 = 0.25;

/// Points at the centres of a regular grid over `[x0, x1] x [y0, y1]`
pub fn grid(x0: f64, y0: f64, x1: f64, y1: f64, z: impl Fn(f64, f64) -> f64) -> Vec<Point3<f64>> {
    let nx = ((x1 - x0) / SPACING).round() as usize;
    let ny = ((y1 - y0) / SPACING).round() as usize;
    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let x = x0 + (i as f64 + 0.5) * SPACING;
            let y = y0 + (j as f64 + 0.5) * SPACING;
            points.push(Point3::new(x, y, z(x, y)));
        }
    }
    points
}

/// Flat ground points in a band of `width` around the rectangle
pub fn ground_annulus(x0: f64, y0: f64, x1: f64, y1: f64, width: f64, z: f64) -> Vec<Point3<f64>> {
    grid(x0 - width, y0 - width, x1 + width, y1 + width, |_, _| z)
        .into_iter()
        .filter(|p| !(p.x > x0 && p.x < x1 && p.y > y0 && p.y < y1))
        .collect()
}

/// 10 x 8 gable house on ground level 0: eaves at 3 along y = 0 and y = 8,
/// ridge at 5 along y = 4
pub fn gable() -> Building {
    let roof = grid(0.0, 0.0, 10.0, 8.0, |_, y| 3.0 + 0.5 * y.min(8.0 - y));
    let ground = ground_annulus(0.0, 0.0, 10.0, 8.0, 3.0, 0.0);
    Building::new("gable", LinearRing::rectangle(0.0, 0.0, 10.0, 8.0), roof, ground, 0.0)
}

/// Prism plus gable
pub const GABLE_VOLUME: f64 = 10.0 * 8.0 * 3.0 + 0.5 * 8.0 * 2.0 * 10.0;

/// 12 x 8 hip roof on ground level 0: eaves at 3 all round, every face at
/// slope 1:2, ridge at 5 from x = 4 to x = 8 along y = 4
pub fn hip() -> Building {
    let roof = grid(0.0, 0.0, 12.0, 8.0, |x, y| {
        3.0 + 0.5 * y.min(8.0 - y).min(x).min(12.0 - x)
    });
    let ground = ground_annulus(0.0, 0.0, 12.0, 8.0, 3.0, 0.0);
    Building::new("hip", LinearRing::rectangle(0.0, 0.0, 12.0, 8.0), roof, ground, 0.0)
}

/// Prism plus hip roof. The integral of the distance to the boundary of an
/// `a x b` rectangle (a >= b) is `b^2 (3a - b) / 12`.
pub const HIP_VOLUME: f64 = 12.0 * 8.0 * 3.0 + 0.5 * 64.0 * (36.0 - 8.0) / 12.0;

/// 10 x 8 flat roof at height 6
pub fn flat() -> Building {
    let roof = grid(0.0, 0.0, 10.0, 8.0, |_, _| 6.0);
    let ground = ground_annulus(0.0, 0.0, 10.0, 8.0, 3.0, 0.0);
    Building::new("flat", LinearRing::rectangle(0.0, 0.0, 10.0, 8.0), roof, ground, 0.0)
}

/// 10 x 8 block, flat at 4 for x < 5 and flat at 8 for x > 5
pub fn stepped() -> Building {
    let roof = grid(0.0, 0.0, 10.0, 8.0, |x, _| if x < 5.0 { 4.0 } else { 8.0 });
    let ground = ground_annulus(0.0, 0.0, 10.0, 8.0, 3.0, 0.0);
    Building::new("stepped", LinearRing::rectangle(0.0, 0.0, 10.0, 8.0), roof, ground, 0.0)
}

/// Roof points along a single line: no plane can be fit
pub fn collinear() -> Building {
    let roof = (0..40).map(|i| Point3::new(0.25 * f64::from(i), 4.0, 5.0)).collect();
    Building::new("collinear", LinearRing::rectangle(0.0, 0.0, 10.0, 8.0), roof, Vec::new(), 0.0)
}

/// Fewer points than a plane needs
pub fn sparse() -> Building {
    let roof = (0..5).map(|i| Point3::new(f64::from(i), f64::from(i % 2), 5.0)).collect();
    Building::new("sparse", LinearRing::rectangle(0.0, 0.0, 10.0, 8.0), roof, Vec::new(), 0.0)
}
