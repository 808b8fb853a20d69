// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Order statistics on height samples.

use std::cmp::Ordering;

/// Percentile by quickselect (nearest rank, `q` in [0, 1]).
///
/// Reorders `v`. Returns `None` for an empty slice.
pub(crate) fn percentile_in_place(v: &mut [f64], q: f64) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let k = ((v.len() - 1) as f64 * q).round() as usize;
    let (_, nth, _) = v.select_nth_unstable_by(k, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(*nth)
}

/// 50th and 70th percentile, minimum and maximum of a sample set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightSummary {
    pub p50: f64,
    pub p70: f64,
    pub min: f64,
    pub max: f64,
}

impl HeightSummary {
    pub(crate) fn from_samples(mut values: Vec<f64>) -> Option<Self> {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let p50 = percentile_in_place(&mut values, 0.5)?;
        let p70 = percentile_in_place(&mut values, 0.7)?;
        Some(Self { p50, p70, min, max })
    }
}
