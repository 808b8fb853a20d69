// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for arrangement operations.

use crate::keys::{FaceKey, HalfEdgeKey};

/// Result type alias for arrangement operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or editing an arrangement.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The footprint has no outer ring.
    #[error("footprint is empty")]
    EmptyFootprint,

    /// The footprint collapses on the grid or is otherwise unusable.
    #[error("degenerate footprint: {0}")]
    DegenerateFootprint(String),

    /// A coordinate is not finite or does not fit the integer grid.
    #[error("coordinate {0} cannot be represented on the grid")]
    CoordinateOverflow(f64),

    /// The half-edge structure violates an internal invariant.
    #[error("inconsistent arrangement: {0}")]
    Inconsistent(String),

    /// Face key not found in the arena.
    #[error("face not found: {0:?}")]
    FaceNotFound(FaceKey),

    /// Half-edge key not found in the arena.
    #[error("half-edge not found: {0:?}")]
    HalfEdgeNotFound(HalfEdgeKey),
}
