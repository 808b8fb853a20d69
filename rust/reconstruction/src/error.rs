// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for reconstruction
pub type Result<T> = std::result::Result<T, ReconstructionError>;

/// Errors raised by the reconstruction stages
#[derive(Error, Debug)]
pub enum ReconstructionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Plane segmentation failed: {0}")]
    Segmentation(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] rooftop_geometry::Error),

    #[error("Arrangement error: {0}")]
    Arrangement(#[from] rooftop_arrangement::Error),
}

impl ReconstructionError {
    /// Contract violations that must reach the caller instead of being
    /// recovered by the fallback extruder
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconstructionError::InvalidConfig(_))
    }
}
