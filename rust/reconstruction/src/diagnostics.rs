// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagnostics sink for per-stage timings and recovered faults.
//!
//! The pipeline never depends on a concrete reporter. Every method has a
//! no-op default so a sink only implements what it cares about.

use std::time::Duration;

/// Receiver of pipeline diagnostics. Shared between rayon workers.
pub trait DiagnosticsSink: Sync {
    /// A stage of the pipeline finished for `building_id`
    fn stage_timing(&self, _building_id: &str, _stage: &'static str, _elapsed: Duration) {}

    /// The building was routed to the fallback extruder
    fn fallback(&self, _building_id: &str, _reason: &str) {}
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticsSink for NoopSink {}

/// Logs stage timings at debug level. Fallbacks are already logged as
/// warnings by the pipeline itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn stage_timing(&self, building_id: &str, stage: &'static str, elapsed: Duration) {
        tracing::debug!(
            building = building_id,
            stage,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "[reconstructor t]"
        );
    }
}
