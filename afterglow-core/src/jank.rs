// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Jank taxonomy and classification.
//!
//! [`JankType`] is a bitmask: a single frame can carry several causes at once
//! (a prediction error on top of a scheduling slip, for instance).
//!
//! The classification functions here are pure: they read no clocks and touch
//! no state, so identical inputs always produce bit-identical verdicts. The
//! frame state machines call them at present resolution.
//!
//! # Verdict composition
//!
//! A display frame's verdict combines its ready metadata (did composition
//! meet its deadline?) with its present metadata (did the display show it
//! when predicted?). The two dimensions separate compositor-side jank from
//! display-side jank. A surface frame then attributes its own verdict
//! against the ambient display verdict: a compositor that missed its
//! deadline drags every surface in that vsync with it, while an app that
//! missed its own deadline only janks itself.

use bitflags::bitflags;

use crate::time::{Duration, Timestamp};
use crate::timing::{FramePresentMetadata, FrameReadyMetadata, FrameStartMetadata, JankThresholds};

bitflags! {
    /// Causes of jank observed on a frame. Multiple bits may be set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct JankType: u32 {
        /// No jank.
        const NONE = 0;
        /// The app finished its frame after its deadline.
        const APP_DEADLINE_MISSED = 1 << 0;
        /// The compositor finished composition after its deadline.
        const COMPOSITOR_DEADLINE_MISSED = 1 << 1;
        /// Composition finished on time but the display presented late.
        const DISPLAY_HAL = 1 << 2;
        /// The app queued buffers faster than the display consumed them; the
        /// previous buffer was latched in the vsync where this one was due.
        const APP_BUFFER_STUFFING = 1 << 3;
        /// The present landed a whole vsync away from the prediction.
        const PREDICTION_ERROR = 1 << 4;
        /// The compositor ran against a misaligned vsync.
        const COMPOSITOR_SCHEDULING = 1 << 5;
        /// Jank observed but the cause could not be determined (typically
        /// missing predictions).
        const UNKNOWN = 1 << 6;
    }
}

/// Compares an actual start time to its prediction.
#[must_use]
pub fn classify_start(
    actual: Timestamp,
    predicted: Timestamp,
    threshold: Duration,
) -> FrameStartMetadata {
    let delta = actual - predicted;
    if delta.abs() <= threshold {
        FrameStartMetadata::OnTimeStart
    } else if delta > Duration::ZERO {
        FrameStartMetadata::LateStart
    } else {
        FrameStartMetadata::EarlyStart
    }
}

/// Compares an actual finish time to its predicted deadline.
///
/// Finishing early is on time: the only goal of any stage is to meet the
/// deadline, so no `EarlyFinish` exists.
#[must_use]
pub fn classify_ready(
    actual_end: Timestamp,
    predicted_end: Timestamp,
    threshold: Duration,
) -> FrameReadyMetadata {
    if actual_end <= predicted_end + threshold {
        FrameReadyMetadata::OnTimeFinish
    } else {
        FrameReadyMetadata::LateFinish
    }
}

/// Compares an actual present time to its prediction.
#[must_use]
pub fn classify_present(
    actual: Timestamp,
    predicted: Timestamp,
    threshold: Duration,
) -> FramePresentMetadata {
    let delta = actual - predicted;
    if delta.abs() <= threshold {
        FramePresentMetadata::OnTimePresent
    } else if delta > Duration::ZERO {
        FramePresentMetadata::LatePresent
    } else {
        FramePresentMetadata::EarlyPresent
    }
}

/// Whether the present deviated from its prediction by a whole number of
/// vsync periods (within the present threshold).
///
/// A whole-period slip means the timestamps were internally consistent and
/// only the vsync the predictor aimed at was wrong, which points at the
/// prediction rather than at scheduling.
fn slipped_whole_periods(deviation: Duration, vsync_period: Duration, threshold: Duration) -> bool {
    let period = vsync_period.nanos();
    if period <= 0 {
        return false;
    }
    let dev = deviation.abs().nanos();
    if dev < period - threshold.nanos() {
        return false;
    }
    let rem = dev % period;
    rem <= threshold.nanos() || rem >= period - threshold.nanos()
}

/// Classifies a display frame's jank from its ready and present metadata.
///
/// `actual_present` and `predicted_present` feed the whole-period slip check
/// that separates prediction errors from scheduling drift.
#[must_use]
pub fn classify_display_jank(
    ready: FrameReadyMetadata,
    present: FramePresentMetadata,
    actual_present: Timestamp,
    predicted_present: Timestamp,
    vsync_period: Duration,
    thresholds: JankThresholds,
) -> JankType {
    use FramePresentMetadata as P;
    use FrameReadyMetadata as R;

    let deviation = actual_present - predicted_present;
    match (ready, present) {
        (R::OnTimeFinish, P::OnTimePresent) => JankType::NONE,
        (R::LateFinish, P::LatePresent) => JankType::COMPOSITOR_DEADLINE_MISSED,
        (R::OnTimeFinish, P::LatePresent) => JankType::DISPLAY_HAL,
        (R::OnTimeFinish | R::LateFinish, P::EarlyPresent) => {
            let mut jank = JankType::COMPOSITOR_SCHEDULING;
            if slipped_whole_periods(deviation, vsync_period, thresholds.present) {
                jank |= JankType::PREDICTION_ERROR;
            }
            jank
        }
        (R::LateFinish, P::OnTimePresent) => {
            if deviation.abs() <= vsync_period {
                JankType::NONE
            } else {
                JankType::PREDICTION_ERROR
            }
        }
        (R::UnknownFinish, _) | (_, P::UnknownPresent) => JankType::UNKNOWN,
    }
}

/// Attributes a surface frame's jank against the ambient display verdict.
///
/// `last_latch_time` is when the previous buffer from the same layer was
/// latched; the stuffing check fires when that latch landed inside the vsync
/// interval this frame was predicted for.
#[must_use]
pub fn classify_surface_jank(
    ready: FrameReadyMetadata,
    presented: bool,
    last_latch_time: Timestamp,
    predicted_present: Timestamp,
    vsync_period: Duration,
    display_jank: JankType,
) -> JankType {
    if display_jank.contains(JankType::COMPOSITOR_DEADLINE_MISSED) {
        return JankType::COMPOSITOR_DEADLINE_MISSED;
    }
    if ready == FrameReadyMetadata::LateFinish {
        return JankType::APP_DEADLINE_MISSED;
    }
    if presented && last_latch_time.is_set() && predicted_present.is_set() {
        let window_start = predicted_present - vsync_period;
        if last_latch_time >= window_start && last_latch_time <= predicted_present {
            return JankType::APP_BUFFER_STUFFING;
        }
    }
    if display_jank.contains(JankType::DISPLAY_HAL) {
        return JankType::DISPLAY_HAL;
    }
    JankType::NONE
}
