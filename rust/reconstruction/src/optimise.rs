// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Face labeling of the arrangement.
//!
//! Each footprint face takes a roof plane or the ground label. The energy is
//! a data term (heightfield misfit of the label's plane over the face's cells)
//! plus a smoothness term (shared boundary length between faces with
//! different labels). It is minimised by iterated conditional modes, sweeping
//! faces in key order until no label changes.

use std::cmp::Ordering;

use rooftop_arrangement::{Arrangement, ElevationStats, FaceKey, FaceLabel};
use rooftop_geometry::Plane;
use rustc_hash::FxHashMap;

use crate::config::GroundTieBreak;
use crate::error::Result;
use crate::raster::{Cell, Heightfield, RasterLabel};
use crate::segmentation::PlaneCluster;
use crate::stats::HeightSummary;

const MAX_SWEEPS: usize = 100;
const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimiserConfig {
    /// Weight of the data term; the smoothness term gets `1 - data_multiplier`
    pub data_multiplier: f64,
    /// Offer the ground label
    pub use_ground: bool,
    pub tie_break: GroundTieBreak,
}

impl Default for OptimiserConfig {
    fn default() -> Self {
        Self {
            data_multiplier: 0.888,
            use_ground: true,
            tie_break: GroundTieBreak::PreferRoof,
        }
    }
}

impl OptimiserConfig {
    pub fn smoothness_multiplier(&self) -> f64 {
        1.0 - self.data_multiplier
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimiserStats {
    pub sweeps: usize,
    /// Final energy
    pub energy: f64,
}

/// Elevation statistics of heightfield samples, `None` without samples
pub(crate) fn elevation_stats(samples: Vec<f64>) -> Option<ElevationStats> {
    let count = samples.len();
    let summary = HeightSummary::from_samples(samples)?;
    Some(ElevationStats {
        h_50p: summary.p50 as f32,
        h_70p: summary.p70 as f32,
        h_min: summary.min as f32,
        h_max: summary.max as f32,
        samples: count,
    })
}

struct FaceData {
    key: FaceKey,
    cells: Vec<Cell>,
    /// Neighbour index and shared boundary length
    neighbours: Vec<(usize, f64)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArrangementOptimiser;

impl ArrangementOptimiser {
    pub fn compute(
        &self,
        arrangement: &mut Arrangement,
        heightfield: &Heightfield,
        roof: &[PlaneCluster],
        ground_plane: Option<Plane>,
        config: &OptimiserConfig,
    ) -> Result<OptimiserStats> {
        let mut candidates: Vec<(FaceLabel, Plane)> = roof
            .iter()
            .map(|c| (FaceLabel::Plane(c.id), c.plane))
            .collect();
        if config.use_ground {
            if let Some(plane) = ground_plane {
                candidates.push((FaceLabel::Ground, plane));
            }
        }

        let keys: Vec<FaceKey> = arrangement.footprint_faces().collect();
        let slot: FxHashMap<FaceKey, usize> = keys.iter().enumerate().map(|(i, &k)| (k, i)).collect();
        let mut faces = Vec::with_capacity(keys.len());
        for &key in &keys {
            let polygon = arrangement.face_polygon(key)?;
            faces.push(FaceData {
                key,
                cells: heightfield.cells_in(&polygon),
                neighbours: Vec::new(),
            });
        }
        for ((a, b), length) in arrangement.adjacency()? {
            if let (Some(&i), Some(&j)) = (slot.get(&a), slot.get(&b)) {
                faces[i].neighbours.push((j, length));
                faces[j].neighbours.push((i, length));
            }
        }

        let cell_area = heightfield.cellsize * heightfield.cellsize;
        let data_cost: Vec<Vec<f64>> = faces
            .iter()
            .map(|f| {
                candidates
                    .iter()
                    .map(|(_, plane)| misfit(plane, &f.cells) * cell_area)
                    .collect()
            })
            .collect();
        let support: Vec<FxHashMap<FaceLabel, usize>> = faces.iter().map(|f| raster_support(&f.cells)).collect();

        let dm = config.data_multiplier;
        let sm = config.smoothness_multiplier();
        // On equal cost: more raster cells of the face produced by the
        // label, then the ground policy, then label order
        let prefer = |face: usize, a: usize, b: usize| -> Ordering {
            let (la, lb) = (candidates[a].0, candidates[b].0);
            let count = |l: FaceLabel| support[face].get(&l).copied().unwrap_or(0);
            count(lb)
                .cmp(&count(la))
                .then_with(|| match (la.is_ground(), lb.is_ground(), config.tie_break) {
                    (true, false, GroundTieBreak::PreferRoof) | (false, true, GroundTieBreak::PreferGround) => {
                        Ordering::Greater
                    }
                    (false, true, GroundTieBreak::PreferRoof) | (true, false, GroundTieBreak::PreferGround) => {
                        Ordering::Less
                    }
                    _ => Ordering::Equal,
                })
                .then(la.cmp(&lb))
        };
        let pick = |face: usize, costs: &[f64]| -> Option<usize> {
            let mut best: Option<usize> = None;
            for (c, &cost) in costs.iter().enumerate() {
                if !cost.is_finite() {
                    continue;
                }
                best = match best {
                    None => Some(c),
                    Some(b) => {
                        let tol = TIE_TOLERANCE * costs[b].abs().max(cost.abs()).max(1.0);
                        if cost < costs[b] - tol
                            || ((cost - costs[b]).abs() <= tol && prefer(face, c, b) == Ordering::Less)
                        {
                            Some(c)
                        } else {
                            Some(b)
                        }
                    }
                };
            }
            best
        };

        // Data-optimal start. Faces without samples start unlabeled and
        // take their label from the smoothness term in the sweeps.
        let mut labels: Vec<Option<usize>> = faces
            .iter()
            .enumerate()
            .map(|(i, f)| if f.cells.is_empty() { None } else { pick(i, &data_cost[i]) })
            .collect();

        let mut sweeps = 0;
        while sweeps < MAX_SWEEPS {
            sweeps += 1;
            let mut changed = false;
            for i in 0..faces.len() {
                let costs: Vec<f64> = (0..candidates.len())
                    .map(|c| {
                        let smooth: f64 = faces[i]
                            .neighbours
                            .iter()
                            .filter(|&&(n, _)| labels[n] != Some(c))
                            .map(|&(_, length)| length)
                            .sum();
                        dm * data_cost[i][c] + sm * smooth
                    })
                    .collect();
                let choice = pick(i, &costs);
                if choice.is_some() && choice != labels[i] {
                    labels[i] = choice;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let energy = faces
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let data = labels[i].map_or(0.0, |c| data_cost[i][c]);
                let smooth: f64 = f
                    .neighbours
                    .iter()
                    .filter(|&&(n, _)| n > i && labels[n] != labels[i])
                    .map(|&(_, length)| length)
                    .sum();
                dm * data + sm * smooth
            })
            .sum();

        for (i, face) in faces.iter().enumerate() {
            let info = arrangement.face_info_mut(face.key)?;
            match labels[i] {
                Some(c) => {
                    info.label = candidates[c].0;
                    info.plane = Some(candidates[c].1);
                }
                None => {
                    info.label = FaceLabel::Unlabeled;
                    info.plane = None;
                }
            }
            info.elevation = elevation_stats(face.cells.iter().map(|c| c.z).collect());
        }

        tracing::debug!(
            faces = faces.len(),
            labels = candidates.len(),
            sweeps,
            energy,
            "arrangement labeled"
        );
        Ok(OptimiserStats { sweeps, energy })
    }
}

/// Sum of absolute height differences between the cells and the plane;
/// infinite for planes without a height
fn misfit(plane: &Plane, cells: &[Cell]) -> f64 {
    let mut total = 0.0;
    for cell in cells {
        match plane.z_at(cell.center.x, cell.center.y) {
            Some(z) => total += (cell.z - z).abs(),
            None => return f64::INFINITY,
        }
    }
    total
}

/// Number of cells each label produced
fn raster_support(cells: &[Cell]) -> FxHashMap<FaceLabel, usize> {
    let mut counts = FxHashMap::default();
    for cell in cells {
        let label = match cell.label {
            Some(RasterLabel::Roof(id)) => FaceLabel::Plane(id),
            Some(RasterLabel::Ground(_)) => FaceLabel::Ground,
            None => continue,
        };
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}
