// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! rooftop geometry
//!
//! Footprint polygons, polygonal solids, plane equations, earcutr
//! triangulation and flat extrusion, with nalgebra for the vector math.

pub mod error;
pub mod extrusion;
pub mod mesh;
pub mod plane;
pub mod profile;
pub mod triangulation;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point2, Point3, Vector2, Vector3};

pub use error::{Error, Result};
pub use extrusion::extrude_ring;
pub use mesh::{FaceAttributes, Mesh, MultiSolid, Polygon3, SurfaceType, TriangleMesh};
pub use plane::Plane;
pub use profile::{LinearRing, Triangulation};
pub use triangulation::earcut_rings;
