// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! LoD 1.1 fallback: the footprint extruded to one flat roof height.

use rooftop_geometry::{extrude_ring, MultiSolid};

use crate::building::{Building, ExtrusionMode};
use crate::config::ReconstructionConfig;
use crate::error::Result;
use crate::finish::{Finisher, MeshPropertyCalculator};
use crate::stats::HeightSummary;

/// Roof height of the prism: the building's rough 70th percentile, else the
/// 70th percentile of its roof points, else the default height above ground.
fn prism_height(building: &Building, config: &ReconstructionConfig) -> f64 {
    let default = building.h_ground + config.fallback_default_height;
    let h = building
        .h_roof_70p_rough
        .or_else(|| {
            let z = building.roof_points.iter().map(|p| p.z).collect();
            HeightSummary::from_samples(z).map(|s| s.p70)
        })
        .unwrap_or(default);
    if h.is_finite() && h > building.h_ground {
        h
    } else {
        default
    }
}

/// Replace every selected LOD of `building` with a single prism of its
/// footprint and mark it as a fallback.
///
/// A footprint that cannot be extruded is returned as an error.
pub fn extrude_lod11(building: &mut Building, config: &ReconstructionConfig) -> Result<()> {
    let h_roof = prism_height(building, config);
    let prism = extrude_ring(&building.footprint, building.h_ground, h_roof)?;
    let multisolid: MultiSolid = std::iter::once((0, prism)).collect();

    let heightmap = MeshPropertyCalculator.heightmap(&multisolid, config.cellsize)?;
    let finisher = Finisher {
        roof_points: &building.roof_points,
        heightmap: heightmap.as_ref(),
        z_offset: building.z_offset,
        compute_validity: config.compute_validity,
    };
    let outputs = config
        .lods()
        .into_iter()
        .map(|lod| finisher.finish(multisolid.clone(), lod).map(|out| (lod, out)))
        .collect::<Result<Vec<_>>>()?;

    for (lod, output) in outputs {
        building.set_output(lod, output);
    }
    building.extrusion_mode = ExtrusionMode::Lod11Fallback;
    building.roof_elevation_70p = Some(h_roof);
    Ok(())
}
