// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # rooftop arrangement
//!
//! Exact planar subdivision of a building footprint by roof lines.
//!
//! Vertices, half-edges and faces live in slot maps with stable keys. All
//! coordinates sit on a fixed integer grid and every predicate is evaluated
//! exactly, so neighbouring faces always share identical edges and no sliver
//! faces appear from rounding. The public surface is small:
//!
//! - [`Arrangement::build`] overlays the footprint and roof line segments
//! - [`Arrangement::dissolve`] merges faces across edges chosen by a predicate
//! - [`Arrangement::snap`] removes dangling edges and collinear vertices
//! - face queries ([`Arrangement::face_polygon`], [`Arrangement::adjacency`],
//!   [`Arrangement::face_boundary`], ...) feed labeling and extrusion

pub mod arena;
pub mod construction;
pub mod disjoint_set;
pub mod dissolve;
pub mod error;
pub mod geometry;
pub mod kernel;
pub mod keys;
pub mod snap;

pub use arena::{Arrangement, ElevationStats, FaceData, FaceInfo, FaceLabel, HalfEdgeData};
pub use disjoint_set::DisjointSet;
pub use error::{Error, Result};
pub use geometry::EdgeView;
pub use kernel::{GridPoint, GridSegment, GRID_RESOLUTION};
pub use keys::{FaceKey, HalfEdgeKey, VertexKey};
