// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arrangement key types for arena-based storage.
//!
//! Keys are created by `slotmap::SlotMap` and stay valid while the arrangement
//! they came from is alive. Dissolve and snap build a new arrangement, so keys
//! of the previous one must not be reused afterwards.

use slotmap::new_key_type;

new_key_type! {
    /// Key for a vertex (exact grid point).
    pub struct VertexKey;

    /// Key for a directed half-edge.
    pub struct HalfEdgeKey;

    /// Key for a face (bounded region or the unbounded face).
    pub struct FaceKey;
}
