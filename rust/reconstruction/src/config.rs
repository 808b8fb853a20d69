// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction parameters.
//!
//! [`ReconstructionConfig`] is deserialized from JSON with every field
//! optional; missing fields take the defaults below.

use serde::{Deserialize, Serialize};

use crate::building::Lod;
use crate::error::{ReconstructionError, Result};
use crate::lines::PlaneIntersectorConfig;
use crate::segmentation::PlaneDetectorConfig;

/// Which label wins when a face costs the same as roof and as ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTieBreak {
    #[default]
    PreferRoof,
    PreferGround,
}

/// Reconstruction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Neighbourhood size of the plane segmenter.
    pub plane_detect_k: usize,
    /// Minimum number of points in a plane.
    pub plane_detect_min_points: usize,
    /// Maximum point to plane distance while growing a region.
    pub plane_detect_epsilon: f64,
    /// Minimum |cos| between a point normal and the region normal.
    pub plane_detect_normal_angle: f64,
    /// Stop growing after this many planes.
    pub lod11_fallback_planes: usize,
    /// Segmenter time budget in milliseconds.
    pub lod11_fallback_time_ms: u64,
    /// Alpha shape circumradius threshold.
    pub thres_alpha: f64,
    /// Split distance of the boundary line detector.
    pub line_detect_epsilon: f64,
    /// Minimum neighbour links between two planes before they are
    /// intersected.
    pub thres_intersect_min_links: usize,
    /// Plan distance of the points that bound an intersection line.
    pub thres_intersect_dist: f64,
    /// Offset threshold when clustering parallel lines.
    pub thres_reg_line_dist: f64,
    /// Extension applied to regularised segments.
    pub thres_reg_line_ext: f64,
    /// Orientation tolerance in degrees when clustering lines.
    pub thres_reg_line_angle_deg: f64,
    /// Heightfield cell size.
    pub cellsize: f64,
    /// Minimum height jump kept as a step edge in LoD 1.3.
    pub lod13_step_height: f64,
    /// Trade-off between data fit and smoothness, 1 = data only.
    pub complexity_factor: f64,
    /// Allow ground labels in the optimiser.
    pub clip_ground: bool,
    /// Requested level of detail: 0 (all), 12, 13 or 22.
    pub lod: u8,
    /// Run the solid validator on the finished meshes.
    pub compute_validity: bool,
    pub ground_tie_break: GroundTieBreak,
    /// Roof height above ground used by the fallback when no roof height is
    /// known at all.
    pub fallback_default_height: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            plane_detect_k: 15,
            plane_detect_min_points: 15,
            plane_detect_epsilon: 0.3,
            plane_detect_normal_angle: 0.75,
            lod11_fallback_planes: 900,
            lod11_fallback_time_ms: 1_800_000,
            thres_alpha: 0.5,
            line_detect_epsilon: 0.4,
            thres_intersect_min_links: 5,
            thres_intersect_dist: 1.0,
            thres_reg_line_dist: 0.5,
            thres_reg_line_ext: 3.0,
            thres_reg_line_angle_deg: 5.0,
            cellsize: 0.5,
            lod13_step_height: 3.0,
            complexity_factor: 0.888,
            clip_ground: true,
            lod: 0,
            compute_validity: true,
            ground_tie_break: GroundTieBreak::PreferRoof,
            fallback_default_height: 3.0,
        }
    }
}

impl ReconstructionConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReconstructionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("plane_detect_epsilon", self.plane_detect_epsilon),
            ("line_detect_epsilon", self.line_detect_epsilon),
            ("thres_intersect_dist", self.thres_intersect_dist),
            ("thres_reg_line_dist", self.thres_reg_line_dist),
            ("thres_reg_line_angle_deg", self.thres_reg_line_angle_deg),
            ("cellsize", self.cellsize),
            ("lod13_step_height", self.lod13_step_height),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ReconstructionError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        let non_negative = [
            ("thres_alpha", self.thres_alpha),
            ("thres_reg_line_ext", self.thres_reg_line_ext),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ReconstructionError::InvalidConfig(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        if !(self.fallback_default_height.is_finite() && self.fallback_default_height > 0.0) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "fallback_default_height must be positive, got {}",
                self.fallback_default_height
            )));
        }
        if self.plane_detect_k < 2 {
            return Err(ReconstructionError::InvalidConfig(format!(
                "plane_detect_k must be at least 2, got {}",
                self.plane_detect_k
            )));
        }
        if self.plane_detect_min_points < 3 {
            return Err(ReconstructionError::InvalidConfig(format!(
                "plane_detect_min_points must be at least 3, got {}",
                self.plane_detect_min_points
            )));
        }
        if !(self.plane_detect_normal_angle > 0.0 && self.plane_detect_normal_angle <= 1.0) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "plane_detect_normal_angle must be in (0, 1], got {}",
                self.plane_detect_normal_angle
            )));
        }
        if !(0.0..=1.0).contains(&self.complexity_factor) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "complexity_factor must be in [0, 1], got {}",
                self.complexity_factor
            )));
        }
        if !matches!(self.lod, 0 | 12 | 13 | 22) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "lod must be one of 0, 12, 13, 22, got {}",
                self.lod
            )));
        }
        Ok(())
    }

    /// Levels of detail selected by `lod`, in ascending order
    pub fn lods(&self) -> Vec<Lod> {
        match self.lod {
            12 => vec![Lod::Lod12],
            13 => vec![Lod::Lod13],
            22 => vec![Lod::Lod22],
            _ => vec![Lod::Lod12, Lod::Lod13, Lod::Lod22],
        }
    }

    /// Segmenter parameters, shared by the roof and the ground points
    pub fn plane_detector(&self) -> PlaneDetectorConfig {
        PlaneDetectorConfig {
            k: self.plane_detect_k,
            min_points: self.plane_detect_min_points,
            epsilon: self.plane_detect_epsilon,
            normal_threshold: self.plane_detect_normal_angle,
            with_limits: true,
            limit_n_regions: self.lod11_fallback_planes,
            limit_n_milliseconds: self.lod11_fallback_time_ms,
        }
    }

    pub fn plane_intersector(&self) -> PlaneIntersectorConfig {
        PlaneIntersectorConfig {
            min_neighbour_points: self.thres_intersect_min_links,
            dist_thres: self.thres_intersect_dist,
        }
    }
}
