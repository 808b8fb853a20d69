// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Heightfield rasterisation of alpha shape triangles.

use rooftop_geometry::{LinearRing, Point2, Point3};

use crate::alpha_shape::AlphaShape;

/// Source of a heightfield sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RasterLabel {
    Roof(usize),
    Ground(usize),
}

/// One heightfield cell with data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub center: Point2<f64>,
    pub z: f64,
    pub label: Option<RasterLabel>,
}

/// Regular grid of heights with a parallel segment raster.
///
/// Cell `(i, j)` covers `[origin.x + i * cellsize, origin.x + (i + 1) * cellsize)`
/// in x and likewise in y; values are sampled at cell centres.
#[derive(Debug, Clone)]
pub struct Heightfield {
    pub origin: Point2<f64>,
    pub cellsize: f64,
    pub dimx: usize,
    pub dimy: usize,
    pub nodata: f32,
    values: Vec<f32>,
    labels: Vec<Option<RasterLabel>>,
}

impl Heightfield {
    pub const NODATA: f32 = -9999.0;

    /// Empty heightfield covering `[min, max]`
    pub fn new(min: Point2<f64>, max: Point2<f64>, cellsize: f64) -> Self {
        let dim = |extent: f64| ((extent / cellsize).ceil() as usize).max(1);
        let (dimx, dimy) = (dim(max.x - min.x), dim(max.y - min.y));
        Self {
            origin: min,
            cellsize,
            dimx,
            dimy,
            nodata: Self::NODATA,
            values: vec![Self::NODATA; dimx * dimy],
            labels: vec![None; dimx * dimy],
        }
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        j * self.dimx + i
    }

    pub fn cell_center(&self, i: usize, j: usize) -> Point2<f64> {
        Point2::new(
            self.origin.x + (i as f64 + 0.5) * self.cellsize,
            self.origin.y + (j as f64 + 0.5) * self.cellsize,
        )
    }

    /// Height of cell `(i, j)`, `None` for nodata or out of range
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.dimx || j >= self.dimy {
            return None;
        }
        let v = self.values[self.index(i, j)];
        (v != self.nodata).then_some(v as f64)
    }

    pub fn label(&self, i: usize, j: usize) -> Option<RasterLabel> {
        if i >= self.dimx || j >= self.dimy {
            return None;
        }
        self.labels[self.index(i, j)]
    }

    /// Number of cells holding a value
    pub fn data_count(&self) -> usize {
        self.values.iter().filter(|&&v| v != self.nodata).count()
    }

    /// Index range of cells whose centres may fall in `[lo, hi]`
    fn cell_range(&self, lo: f64, hi: f64, origin: f64, dim: usize) -> Option<(usize, usize)> {
        let first = ((lo - origin) / self.cellsize - 0.5).ceil().max(0.0);
        let last = ((hi - origin) / self.cellsize - 0.5).floor();
        if !(last >= first) || first >= dim as f64 {
            return None;
        }
        Some((first as usize, (last as usize).min(dim - 1)))
    }

    /// Write the interpolated height of `triangle` into every cell whose
    /// centre it covers.
    ///
    /// Roof samples keep the highest value; ground samples only fill cells
    /// without data.
    pub fn rasterise_triangle(&mut self, triangle: &[Point3<f64>; 3], label: RasterLabel) {
        let [a, b, c] = triangle;
        let det = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
        if det.abs() < 1e-12 {
            return;
        }
        let min_x = a.x.min(b.x).min(c.x);
        let max_x = a.x.max(b.x).max(c.x);
        let min_y = a.y.min(b.y).min(c.y);
        let max_y = a.y.max(b.y).max(c.y);
        let Some((i0, i1)) = self.cell_range(min_x, max_x, self.origin.x, self.dimx) else {
            return;
        };
        let Some((j0, j1)) = self.cell_range(min_y, max_y, self.origin.y, self.dimy) else {
            return;
        };

        const EPS: f64 = 1e-9;
        for j in j0..=j1 {
            for i in i0..=i1 {
                let p = self.cell_center(i, j);
                let l1 = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
                let l2 = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
                let l3 = 1.0 - l1 - l2;
                if l1 < -EPS || l2 < -EPS || l3 < -EPS {
                    continue;
                }
                let z = (l1 * a.z + l2 * b.z + l3 * c.z) as f32;
                let k = self.index(i, j);
                let current = self.values[k];
                let write = match label {
                    RasterLabel::Roof(_) => {
                        current == self.nodata
                            || matches!(self.labels[k], Some(RasterLabel::Ground(_)))
                            || z > current
                    }
                    RasterLabel::Ground(_) => current == self.nodata,
                };
                if write {
                    self.values[k] = z;
                    self.labels[k] = Some(label);
                }
            }
        }
    }

    /// Cells with data whose centres lie inside `polygon`
    pub fn cells_in(&self, polygon: &LinearRing) -> Vec<Cell> {
        if polygon.outer.len() < 3 {
            return Vec::new();
        }
        let tester = GridPipTester::new(polygon);
        let (min, max) = polygon.bounds();
        let (Some((i0, i1)), Some((j0, j1))) = (
            self.cell_range(min.x, max.x, self.origin.x, self.dimx),
            self.cell_range(min.y, max.y, self.origin.y, self.dimy),
        ) else {
            return Vec::new();
        };
        let mut cells = Vec::new();
        for j in j0..=j1 {
            for i in i0..=i1 {
                let Some(z) = self.get(i, j) else {
                    continue;
                };
                let center = self.cell_center(i, j);
                if tester.test(&center) {
                    cells.push(Cell {
                        center,
                        z,
                        label: self.label(i, j),
                    });
                }
            }
        }
        cells
    }

    /// Heights of the cells inside `polygon`
    pub fn samples_in(&self, polygon: &LinearRing) -> Vec<f64> {
        self.cells_in(polygon).into_iter().map(|c| c.z).collect()
    }
}

/// Point-in-polygon tester with edges bucketed into horizontal bands.
///
/// A point is inside when it is inside the outer ring and outside every hole.
pub struct GridPipTester {
    outer: BandedRing,
    holes: Vec<BandedRing>,
}

impl GridPipTester {
    const BANDS: usize = 20;

    pub fn new(polygon: &LinearRing) -> Self {
        Self {
            outer: BandedRing::new(&polygon.outer, Self::BANDS),
            holes: polygon
                .interiors
                .iter()
                .map(|h| BandedRing::new(h, Self::BANDS))
                .collect(),
        }
    }

    pub fn test(&self, p: &Point2<f64>) -> bool {
        self.outer.contains(p) && !self.holes.iter().any(|h| h.contains(p))
    }
}

struct BandedRing {
    min_y: f64,
    band_height: f64,
    bands: Vec<Vec<(Point2<f64>, Point2<f64>)>>,
}

impl BandedRing {
    fn new(ring: &[Point2<f64>], n_bands: usize) -> Self {
        let min_y = ring.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = ring.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let band_height = ((max_y - min_y) / n_bands as f64).max(f64::MIN_POSITIVE);
        let mut bands = vec![Vec::new(); n_bands];
        let band_of = |y: f64| (((y - min_y) / band_height) as usize).min(n_bands - 1);
        for k in 0..ring.len() {
            let (a, b) = (ring[k], ring[(k + 1) % ring.len()]);
            if a.y == b.y {
                continue;
            }
            for band in &mut bands[band_of(a.y.min(b.y))..=band_of(a.y.max(b.y))] {
                band.push((a, b));
            }
        }
        Self {
            min_y,
            band_height,
            bands,
        }
    }

    fn contains(&self, p: &Point2<f64>) -> bool {
        if self.bands.is_empty() || p.y < self.min_y {
            return false;
        }
        let band = ((p.y - self.min_y) / self.band_height) as usize;
        let Some(edges) = self.bands.get(band) else {
            return false;
        };
        let mut inside = false;
        for (a, b) in edges {
            if (a.y > p.y) != (b.y > p.y) {
                let x = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if p.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentRasteriser;

impl SegmentRasteriser {
    /// Rasterise the roof triangles, then the ground triangles where no roof
    /// sample exists, over the footprint and triangle extents.
    pub fn compute(
        &self,
        roof: &AlphaShape,
        ground: Option<&AlphaShape>,
        footprint: &LinearRing,
        cellsize: f64,
    ) -> Heightfield {
        let (mut min, mut max) = footprint.bounds();
        for p in std::iter::once(roof)
            .chain(ground)
            .flat_map(|s| s.triangles.iter())
            .flat_map(|t| t.triangles.iter().flatten())
        {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        let mut field = Heightfield::new(min, max, cellsize);
        for cluster in &roof.triangles {
            for t in &cluster.triangles {
                field.rasterise_triangle(t, RasterLabel::Roof(cluster.cluster));
            }
        }
        for cluster in ground.iter().flat_map(|g| g.triangles.iter()) {
            for t in &cluster.triangles {
                field.rasterise_triangle(t, RasterLabel::Ground(cluster.cluster));
            }
        }
        tracing::debug!(
            dimx = field.dimx,
            dimy = field.dimy,
            filled = field.data_count(),
            "heightfield rasterised"
        );
        field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alpha_shape::AlphaTriangles;
    use approx::assert_relative_eq;
    use rooftop_geometry::Plane;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Vec<[Point3<f64>; 3]> {
        let p = |x, y| Point3::new(x, y, z);
        vec![
            [p(x0, y0), p(x1, y0), p(x1, y1)],
            [p(x0, y0), p(x1, y1), p(x0, y1)],
        ]
    }

    fn shape(cluster: usize, triangles: Vec<[Point3<f64>; 3]>) -> AlphaShape {
        AlphaShape {
            rings: Vec::new(),
            triangles: vec![AlphaTriangles {
                cluster,
                plane: Plane::horizontal(0.0),
                triangles,
            }],
        }
    }

    #[test]
    fn test_pip_with_hole() {
        let mut polygon = LinearRing::rectangle(0.0, 0.0, 10.0, 10.0);
        polygon.add_interior(vec![
            Point2::new(4.0, 4.0),
            Point2::new(4.0, 6.0),
            Point2::new(6.0, 6.0),
            Point2::new(6.0, 4.0),
        ]);
        let tester = GridPipTester::new(&polygon);
        assert!(tester.test(&Point2::new(1.0, 1.0)));
        assert!(tester.test(&Point2::new(9.5, 5.0)));
        assert!(!tester.test(&Point2::new(5.0, 5.0)));
        assert!(!tester.test(&Point2::new(11.0, 5.0)));
        assert!(!tester.test(&Point2::new(5.0, -1.0)));
    }

    #[test]
    fn test_roof_over_ground() {
        let footprint = LinearRing::rectangle(0.0, 0.0, 4.0, 4.0);
        let roof = shape(0, square(0.0, 0.0, 4.0, 2.0, 6.0));
        let ground = shape(0, square(-1.0, -1.0, 5.0, 5.0, 0.5));
        let field = SegmentRasteriser.compute(&roof, Some(&ground), &footprint, 0.5);

        assert_relative_eq!(field.origin.x, -1.0);
        assert_eq!(field.dimx, 12);
        let cells = field.cells_in(&footprint);
        assert_eq!(cells.len(), 64);
        let roof_cells = cells
            .iter()
            .filter(|c| c.label == Some(RasterLabel::Roof(0)))
            .count();
        assert_eq!(roof_cells, 32);
        for c in &cells {
            let expected = if c.center.y < 2.0 { 6.0 } else { 0.5 };
            assert_relative_eq!(c.z, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sloped_interpolation() {
        let p = |x: f64, y: f64| Point3::new(x, y, 1.0 + 0.5 * x);
        let roof = shape(
            3,
            vec![
                [p(0.0, 0.0), p(4.0, 0.0), p(4.0, 4.0)],
                [p(0.0, 0.0), p(4.0, 4.0), p(0.0, 4.0)],
            ],
        );
        let footprint = LinearRing::rectangle(0.0, 0.0, 4.0, 4.0);
        let field = SegmentRasteriser.compute(&roof, None, &footprint, 1.0);
        assert_eq!(field.data_count(), 16);
        assert_relative_eq!(field.get(1, 2).unwrap(), 1.75, epsilon = 1e-6);
        assert_eq!(field.label(1, 2), Some(RasterLabel::Roof(3)));
        assert!(field.get(4, 0).is_none());
    }

    #[test]
    fn test_empty_shapes_give_nodata() {
        let footprint = LinearRing::rectangle(0.0, 0.0, 3.0, 2.0);
        let field = SegmentRasteriser.compute(&AlphaShape::default(), None, &footprint, 0.5);
        assert_eq!((field.dimx, field.dimy), (6, 4));
        assert_eq!(field.data_count(), 0);
        assert!(field.samples_in(&footprint).is_empty());
    }
}
