// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-building orchestration and the parallel batch driver.
//!
//! A building starts in its pre-assigned [`ExtrusionMode`]. `Skip` returns
//! at once and `Lod11Fallback` goes straight to the prism extruder. `Full`
//! segments the roof and ground points; too few points or no planes end in
//! `Skip`, a roof segmentation fault ends in the fallback. Ground points that
//! cannot be segmented leave the building without ground planes. After
//! segmentation the stages run in order on one labeled arrangement that
//! every requested level of detail is extruded from. A non-fatal error in
//! any of them discards the partial results and also routes the building to
//! the fallback.

use std::time::Instant;

use rayon::prelude::*;
use rooftop_arrangement::{Arrangement, GridSegment};
use rooftop_geometry::{MultiSolid, Plane};
use serde::Serialize;

use crate::alpha_shape::AlphaShaper;
use crate::building::{Building, ExtrusionMode, Lod, LodOutput};
use crate::config::ReconstructionConfig;
use crate::diagnostics::{DiagnosticsSink, TracingSink};
use crate::error::{ReconstructionError, Result};
use crate::extrude::extrude_lod;
use crate::fallback::extrude_lod11;
use crate::finish::{Finisher, MeshPropertyCalculator};
use crate::lines::{LineDetector, LineDetectorConfig, PlaneIntersector};
use crate::optimise::{ArrangementOptimiser, OptimiserConfig};
use crate::raster::SegmentRasteriser;
use crate::regularise::{LineRegulariser, RegulariserConfig};
use crate::segmentation::{PlaneCluster, PlaneDetection, PlaneDetector, RoofType};

/// Reports the duration of each stage to the sink
struct StageTimer<'a> {
    building_id: &'a str,
    sink: &'a dyn DiagnosticsSink,
}

impl StageTimer<'_> {
    fn time<T>(&self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.sink.stage_timing(self.building_id, stage, start.elapsed());
        out
    }
}

/// Reconstruct one building, logging through `tracing`.
pub fn reconstruct_building(building: &mut Building, config: &ReconstructionConfig) -> Result<()> {
    reconstruct_building_with(building, config, &TracingSink)
}

/// Reconstruct one building, reporting timings and fallbacks to `sink`.
///
/// Only an invalid configuration or a footprint the fallback cannot extrude
/// is returned as an error. All earlier results on `building` are cleared.
pub fn reconstruct_building_with(
    building: &mut Building,
    config: &ReconstructionConfig,
    sink: &dyn DiagnosticsSink,
) -> Result<()> {
    config.validate()?;
    building.reset_outputs();

    if building.pointcloud_insufficient {
        building.extrusion_mode = ExtrusionMode::Skip;
    }
    match building.extrusion_mode {
        ExtrusionMode::Skip => return Ok(()),
        ExtrusionMode::Lod11Fallback => return extrude_lod11(building, config),
        ExtrusionMode::Full => {}
    }

    let id = building.id.clone();
    let timer = StageTimer { building_id: &id, sink };

    let detector = config.plane_detector();
    let roof = match timer.time("PlaneDetector", || PlaneDetector.detect(&building.roof_points, &detector)) {
        Ok(roof) => roof,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => return fall_back(building, config, sink, &e),
    };
    // Ground points that cannot be fit only cost the ground planes
    let ground = timer
        .time("PlaneDetector_ground", || {
            PlaneDetector.detect(&building.ground_points, &detector)
        })
        .unwrap_or_else(|e| {
            tracing::warn!(building = %id, error = %e, "ground planes not detected");
            PlaneDetection::without_planes(RoofType::NoPlanes, building.ground_points.len(), None)
        });

    building.roof_type = Some(roof.roof_type);
    building.roof_n_planes = Some(roof.clusters.len());
    if let Some(elevation) = roof.elevation {
        building.roof_elevation_50p = Some(elevation.p50);
        building.roof_elevation_70p = Some(elevation.p70);
        building.roof_elevation_min = Some(elevation.min);
        building.roof_elevation_max = Some(elevation.max);
    }
    if roof.roof_type.is_insufficient() {
        tracing::debug!(building = %id, roof_type = %roof.roof_type, "skipping building");
        building.extrusion_mode = ExtrusionMode::Skip;
        return Ok(());
    }

    match reconstruct_full(building, config, &roof, &ground, &timer) {
        Ok(outputs) => {
            for (lod, output) in outputs {
                tracing::debug!(
                    building = %id,
                    lod = %lod,
                    solids = output.multisolid.len(),
                    volume = output.volume,
                    rmse = ?output.rmse,
                    "reconstructed"
                );
                building.set_output(lod, output);
            }
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            building.reset_outputs();
            fall_back(building, config, sink, &e)
        }
    }
}

fn fall_back(
    building: &mut Building,
    config: &ReconstructionConfig,
    sink: &dyn DiagnosticsSink,
    error: &ReconstructionError,
) -> Result<()> {
    tracing::warn!(building = %building.id, error = %error, "[reconstructor] LoD1.1 fallback");
    sink.fallback(&building.id, &error.to_string());
    extrude_lod11(building, config)
}

/// The largest ground cluster, ties going to the lower cluster id
fn dominant_plane(clusters: &[PlaneCluster]) -> Option<Plane> {
    clusters
        .iter()
        .max_by(|a, b| a.points.len().cmp(&b.points.len()).then(b.id.cmp(&a.id)))
        .map(|c| c.plane)
}

/// All stages after segmentation, returning the finished outputs in LOD
/// order
fn reconstruct_full(
    building: &Building,
    config: &ReconstructionConfig,
    roof: &PlaneDetection,
    ground: &PlaneDetection,
    timer: &StageTimer<'_>,
) -> Result<Vec<(Lod, LodOutput)>> {
    let use_ground = !building.ground_points.is_empty() && config.clip_ground;

    let roof_shape = timer.time("AlphaShaper", || AlphaShaper.compute(&roof.clusters, config.thres_alpha));
    let ground_shape = timer.time("AlphaShaper_ground", || {
        AlphaShaper.compute(&ground.clusters, config.thres_alpha)
    });

    let line_config = LineDetectorConfig {
        dist_thres: config.line_detect_epsilon,
        ..Default::default()
    };
    let boundary = timer.time("LineDetector", || LineDetector.detect(&roof_shape.rings, &line_config));
    let intersector_config = config.plane_intersector();
    let intersections = timer.time("PlaneIntersector", || {
        PlaneIntersector.compute(&roof.clusters, &roof.adjacency, &intersector_config)
    });

    let regulariser_config = RegulariserConfig {
        dist_threshold: config.thres_reg_line_dist,
        extension: config.thres_reg_line_ext,
        angle_threshold_deg: config.thres_reg_line_angle_deg,
    };
    let edges = timer.time("LineRegulariser", || {
        LineRegulariser.compute(&boundary, &intersections, &regulariser_config)
    })?;

    let heightfield = timer.time("SegmentRasteriser", || {
        SegmentRasteriser.compute(
            &roof_shape,
            use_ground.then_some(&ground_shape),
            &building.footprint,
            config.cellsize,
        )
    });

    let segments: Vec<GridSegment> = edges.iter().map(|e| e.exact).collect();
    let mut arrangement = timer.time("ArrangementBuilder", || {
        Arrangement::build(&building.footprint, &segments)
    })?;

    let optimiser_config = OptimiserConfig {
        data_multiplier: config.complexity_factor,
        use_ground,
        tie_break: config.ground_tie_break,
    };
    let ground_plane = use_ground.then(|| {
        dominant_plane(&ground.clusters).unwrap_or_else(|| Plane::horizontal(building.h_ground))
    });
    let stats = timer.time("ArrangementOptimiser", || {
        ArrangementOptimiser.compute(
            &mut arrangement,
            &heightfield,
            &roof.clusters,
            ground_plane,
            &optimiser_config,
        )
    })?;
    tracing::debug!(building = %building.id, sweeps = stats.sweeps, energy = stats.energy, "labeled arrangement");

    timer.time("extrude", || -> Result<Vec<(Lod, LodOutput)>> {
        let mut extruded: Vec<(Lod, MultiSolid)> = Vec::new();
        for lod in config.lods() {
            let solids = extrude_lod(
                &arrangement,
                &heightfield,
                lod,
                building.h_ground,
                config.lod13_step_height,
                config.fallback_default_height,
            )?;
            extruded.push((lod, solids));
        }

        // Height attributes of every LOD come from the LoD 2.2 roofs
        let heightmap = match extruded.iter().find(|(lod, _)| *lod == Lod::Lod22) {
            Some((_, solids)) => MeshPropertyCalculator.heightmap(solids, config.cellsize)?,
            None => None,
        };
        let finisher = Finisher {
            roof_points: &building.roof_points,
            heightmap: heightmap.as_ref(),
            z_offset: building.z_offset,
            compute_validity: config.compute_validity,
        };
        extruded
            .into_iter()
            .map(|(lod, solids)| finisher.finish(solids, lod).map(|out| (lod, out)))
            .collect()
    })
}

/// Outcome counts of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub full: usize,
    pub fallback: usize,
    pub skipped: usize,
    /// Buildings whose error was turned into `Skip`, included in `skipped`
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Reconstruct many buildings in parallel.
///
/// The configuration is validated once up front. A building whose
/// reconstruction returns an error is logged, cleared and marked `Skip`;
/// the rest of the batch carries on.
pub fn reconstruct_batch(
    buildings: &mut [Building],
    config: &ReconstructionConfig,
    sink: &dyn DiagnosticsSink,
) -> Result<BatchSummary> {
    config.validate()?;
    let start = Instant::now();

    let failed: usize = buildings
        .par_iter_mut()
        .map(|building| match reconstruct_building_with(building, config, sink) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!(building = %building.id, error = %e, "reconstruction failed");
                building.reset_outputs();
                building.extrusion_mode = ExtrusionMode::Skip;
                1
            }
        })
        .sum();

    let mut summary = BatchSummary {
        total: buildings.len(),
        failed,
        ..Default::default()
    };
    for building in buildings.iter() {
        match building.extrusion_mode {
            ExtrusionMode::Full => summary.full += 1,
            ExtrusionMode::Lod11Fallback => summary.fallback += 1,
            ExtrusionMode::Skip => summary.skipped += 1,
        }
    }
    summary.elapsed_ms = start.elapsed().as_millis() as u64;

    tracing::debug!(
        total = summary.total,
        full = summary.full,
        fallback = summary.fallback,
        skipped = summary.skipped,
        failed = summary.failed,
        elapsed_ms = summary.elapsed_ms,
        "batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rooftop_geometry::{Point3, Vector3};

    fn cluster(id: usize, n: usize, z: f64) -> PlaneCluster {
        PlaneCluster {
            id,
            plane: Plane::horizontal(z),
            points: vec![Point3::new(0.0, 0.0, z); n],
            horizontal: true,
        }
    }

    #[test]
    fn test_dominant_plane() {
        assert!(dominant_plane(&[]).is_none());
        let plane = dominant_plane(&[cluster(0, 5, 1.0), cluster(1, 9, 2.0), cluster(2, 9, 3.0)]).unwrap();
        assert!((plane.signed_distance(&Point3::new(0.0, 0.0, 2.0))).abs() < 1e-12);
        assert!(plane.normal.dot(&Vector3::z()) > 0.0);
    }
}
