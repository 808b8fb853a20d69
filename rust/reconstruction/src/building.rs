// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The building unit: inputs, reconstruction outcome and attributes.

use std::collections::BTreeMap;
use std::fmt;

use rooftop_geometry::{LinearRing, MultiSolid, Point3};
use serde::{Deserialize, Serialize};

use crate::segmentation::RoofType;

/// How a building was (or will be) extruded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrusionMode {
    /// Full LoD 1.2 / 1.3 / 2.2 reconstruction
    #[default]
    Full,
    /// Flat prism of the footprint for every LOD
    Lod11Fallback,
    /// No geometry
    Skip,
}

/// Level of detail of a reconstructed model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lod {
    Lod12,
    Lod13,
    Lod22,
}

impl Lod {
    pub const ALL: [Lod; 3] = [Lod::Lod12, Lod::Lod13, Lod::Lod22];

    /// Numeric selector as used in the configuration (12, 13, 22)
    pub fn code(&self) -> u8 {
        match self {
            Lod::Lod12 => 12,
            Lod::Lod13 => 13,
            Lod::Lod22 => 22,
        }
    }
}

impl fmt::Display for Lod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lod::Lod12 => write!(f, "LoD1.2"),
            Lod::Lod13 => write!(f, "LoD1.3"),
            Lod::Lod22 => write!(f, "LoD2.2"),
        }
    }
}

/// Geometry and quality attributes of one level of detail.
#[derive(Debug, Clone, Default)]
pub struct LodOutput {
    pub multisolid: MultiSolid,
    /// Root mean square distance of the roof points to the mesh
    pub rmse: Option<f64>,
    /// Total volume over all solids
    pub volume: f64,
    pub solid_volumes: BTreeMap<usize, f64>,
    /// Validation result, `None` when validation is disabled
    pub val3dity: Option<String>,
}

/// One building: inputs supplied by the caller and everything the pipeline
/// writes back.
///
/// Points and footprint are in a local frame; `z_offset` is added back to
/// reported heights.
#[derive(Debug, Clone)]
pub struct Building {
    pub id: String,
    pub footprint: LinearRing,
    pub roof_points: Vec<Point3<f64>>,
    pub ground_points: Vec<Point3<f64>>,
    pub h_ground: f64,
    /// Rough roof height from an earlier stage, if known
    pub h_roof_70p_rough: Option<f64>,
    pub z_offset: f64,
    /// Set by the caller when the point cloud is known to be unusable
    pub pointcloud_insufficient: bool,

    pub extrusion_mode: ExtrusionMode,
    pub roof_type: Option<RoofType>,
    pub roof_elevation_50p: Option<f64>,
    pub roof_elevation_70p: Option<f64>,
    pub roof_elevation_min: Option<f64>,
    pub roof_elevation_max: Option<f64>,
    pub roof_n_planes: Option<usize>,

    pub lod12: Option<LodOutput>,
    pub lod13: Option<LodOutput>,
    pub lod22: Option<LodOutput>,
}

impl Building {
    pub fn new(
        id: impl Into<String>,
        footprint: LinearRing,
        roof_points: Vec<Point3<f64>>,
        ground_points: Vec<Point3<f64>>,
        h_ground: f64,
    ) -> Self {
        Self {
            id: id.into(),
            footprint,
            roof_points,
            ground_points,
            h_ground,
            h_roof_70p_rough: None,
            z_offset: 0.0,
            pointcloud_insufficient: false,
            extrusion_mode: ExtrusionMode::Full,
            roof_type: None,
            roof_elevation_50p: None,
            roof_elevation_70p: None,
            roof_elevation_min: None,
            roof_elevation_max: None,
            roof_n_planes: None,
            lod12: None,
            lod13: None,
            lod22: None,
        }
    }

    pub fn with_rough_roof_height(mut self, h: f64) -> Self {
        self.h_roof_70p_rough = Some(h);
        self
    }

    pub fn with_z_offset(mut self, z_offset: f64) -> Self {
        self.z_offset = z_offset;
        self
    }

    pub fn output(&self, lod: Lod) -> Option<&LodOutput> {
        match lod {
            Lod::Lod12 => self.lod12.as_ref(),
            Lod::Lod13 => self.lod13.as_ref(),
            Lod::Lod22 => self.lod22.as_ref(),
        }
    }

    pub fn set_output(&mut self, lod: Lod, output: LodOutput) {
        match lod {
            Lod::Lod12 => self.lod12 = Some(output),
            Lod::Lod13 => self.lod13 = Some(output),
            Lod::Lod22 => self.lod22 = Some(output),
        }
    }

    /// Forget all results of an earlier run. Inputs and the pre-assigned
    /// extrusion mode are kept.
    pub fn reset_outputs(&mut self) {
        self.roof_type = None;
        self.roof_elevation_50p = None;
        self.roof_elevation_70p = None;
        self.roof_elevation_min = None;
        self.roof_elevation_max = None;
        self.roof_n_planes = None;
        self.lod12 = None;
        self.lod13 = None;
        self.lod22 = None;
    }
}
