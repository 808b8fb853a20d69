// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! rooftop reconstruction
//!
//! Building models at LoD 1.2, 1.3 and 2.2 from a classified point cloud
//! and a footprint. Roof points are segmented into planes, the plane
//! boundaries and intersections become regularised lines that cut the
//! footprint into an exact arrangement, every face gets a roof plane or
//! ground by energy minimisation against a heightfield, and each level of
//! detail is extruded from that one labeled arrangement. Buildings the
//! segmenter cannot handle get a flat LoD 1.1 prism instead.
//!
//! ```no_run
//! use rooftop_geometry::{LinearRing, Point3};
//! use rooftop_reconstruction::{reconstruct_building, Building, Lod, ReconstructionConfig};
//!
//! let footprint = LinearRing::rectangle(0.0, 0.0, 10.0, 8.0);
//! let roof: Vec<Point3<f64>> = Vec::new(); // classified roof points
//! let mut building = Building::new("b1", footprint, roof, Vec::new(), 0.0);
//! reconstruct_building(&mut building, &ReconstructionConfig::default())?;
//! if let Some(lod22) = building.output(Lod::Lod22) {
//!     println!("volume {:.1}, rmse {:?}", lod22.volume, lod22.rmse);
//! }
//! # Ok::<(), rooftop_reconstruction::ReconstructionError>(())
//! ```

pub mod alpha_shape;
pub mod building;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extrude;
pub mod fallback;
pub mod finish;
pub mod lines;
pub mod optimise;
pub mod pipeline;
pub mod raster;
pub mod regularise;
pub mod segmentation;
mod stats;

pub use alpha_shape::{AlphaRing, AlphaShape, AlphaShaper};
pub use building::{Building, ExtrusionMode, Lod, LodOutput};
pub use config::{GroundTieBreak, ReconstructionConfig};
pub use diagnostics::{DiagnosticsSink, NoopSink, TracingSink};
pub use error::{ReconstructionError, Result};
pub use extrude::{extrude_lod, ArrangementExtruder};
pub use fallback::extrude_lod11;
pub use finish::{
    Finisher, MeshPropertyCalculator, MeshTriangulator, PointCloudMeshDistance, SolidValidator,
    TriangulatedSolids,
};
pub use lines::{BoundaryLine, IntersectionLine, LineDetector, PlaneIntersector};
pub use optimise::{ArrangementOptimiser, OptimiserConfig};
pub use pipeline::{reconstruct_batch, reconstruct_building, reconstruct_building_with, BatchSummary};
pub use raster::{Heightfield, SegmentRasteriser};
pub use regularise::{LineRegulariser, RegularisedEdge};
pub use segmentation::{PlaneCluster, PlaneDetection, PlaneDetector, RoofType};
pub use stats::HeightSummary;
