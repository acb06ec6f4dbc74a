// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Timestats sink seam.
//!
//! At present resolution the engine pushes one summary record per presented
//! surface frame and one per display frame to an external statistics
//! collector. [`TimeStatsSink`] is the contract; both methods default to
//! no-ops so implementations only pick up the records they aggregate.

use crate::jank::JankType;
use crate::time::Timestamp;

/// Summary pushed for each presented surface frame.
#[derive(Clone, Debug)]
pub struct SurfacePresentRecord {
    /// Uid owning the layer, for per-app aggregation.
    pub owner_uid: u32,
    /// Layer name, for per-layer grouping.
    pub layer_name: String,
    /// Present time the predictor promised.
    pub predicted_present: Timestamp,
    /// Present time the display delivered.
    pub actual_present: Timestamp,
    /// Final jank verdict for the frame.
    pub jank: JankType,
    /// Whether the frame went through GPU composition.
    pub gpu_composition: bool,
}

/// Summary pushed for each resolved display frame.
#[derive(Clone, Copy, Debug)]
pub struct DisplayPresentRecord {
    /// Present time the predictor promised for the composited frame.
    pub predicted_present: Timestamp,
    /// Present time the display delivered.
    pub actual_present: Timestamp,
    /// Final jank verdict for the display frame.
    pub jank: JankType,
}

/// Receives per-frame summaries at present resolution.
///
/// Methods default to no-ops.
pub trait TimeStatsSink: Send + Sync {
    /// Called once per presented surface frame.
    fn record_surface(&self, record: &SurfacePresentRecord) {
        _ = record;
    }

    /// Called once per resolved display frame.
    fn record_display(&self, record: &DisplayPresentRecord) {
        _ = record;
    }
}

/// A [`TimeStatsSink`] that discards all records.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTimeStats;

impl TimeStatsSink for NoopTimeStats {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_records() {
        let sink = NoopTimeStats;
        sink.record_surface(&SurfacePresentRecord {
            owner_uid: 1000,
            layer_name: "L".into(),
            predicted_present: Timestamp(16),
            actual_present: Timestamp(16),
            jank: JankType::NONE,
            gpu_composition: false,
        });
        sink.record_display(&DisplayPresentRecord {
            predicted_present: Timestamp(16),
            actual_present: Timestamp(16),
            jank: JankType::NONE,
        });
    }
}
