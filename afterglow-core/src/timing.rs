// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Timing model shared across the frame timeline.
//!
//! This module defines the types that flow between the token registry, the
//! per-frame state machines, and the jank classifier:
//!
//! - [`TimelineItem`] — a `(start, end, present)` timestamp triple, used for
//!   both predictions and measured actuals
//! - [`PredictionState`] — how a frame's predictions were resolved
//! - [`FrameStartMetadata`] / [`FrameReadyMetadata`] / [`FramePresentMetadata`]
//!   — three independent classifications of actual vs predicted timestamps
//! - [`JankThresholds`] — the slack allowed before an actual counts as off
//!
//! # Data flow
//!
//! The vsync predictor mints a [`TimelineItem`] of predictions and registers
//! it with the token registry. As the frame moves through the compositor, the
//! matching actuals triple fills in stage by stage. Once the display fence
//! signals, the classifier compares the two triples and produces the three
//! metadata verdicts plus a jank bitmask.

use crate::time::{Duration, Timestamp};

/// A `(start, end, present)` timestamp triple.
///
/// Used both for predictions made ahead of a vsync and for the actuals
/// measured as the frame moves through the pipeline. Unfilled stages hold
/// [`Timestamp::ZERO`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TimelineItem {
    /// When work on the frame starts (app main thread, or compositor wake).
    pub start_time: Timestamp,
    /// When the frame's work is done (buffer ready, or composition sent off).
    pub end_time: Timestamp,
    /// When the frame reaches the screen.
    pub present_time: Timestamp,
}

impl TimelineItem {
    /// A fully-unset triple.
    pub const UNSET: Self = Self {
        start_time: Timestamp::ZERO,
        end_time: Timestamp::ZERO,
        present_time: Timestamp::ZERO,
    };

    /// Creates a triple from raw nanosecond values.
    #[must_use]
    pub const fn new(start_time: i64, end_time: i64, present_time: i64) -> Self {
        Self {
            start_time: Timestamp(start_time),
            end_time: Timestamp(end_time),
            present_time: Timestamp(present_time),
        }
    }

    /// Returns the smallest set timestamp of the triple, or
    /// [`Timestamp::ZERO`] when nothing is set.
    #[must_use]
    pub const fn base_time(self) -> Timestamp {
        self.start_time
            .min_set(self.end_time)
            .min_set(self.present_time)
    }
}

/// How a frame's predictions were resolved at creation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredictionState {
    /// Predictions were obtained from the live token registry.
    Valid,
    /// The token was known to have been issued but is no longer retained.
    Expired,
    /// No token was supplied.
    None,
}

/// How the frame's actual start compares to its predicted start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameStartMetadata {
    /// Started within the threshold of the prediction.
    OnTimeStart,
    /// Started later than predicted.
    LateStart,
    /// Started earlier than predicted.
    EarlyStart,
    /// Initial state, or no predictions to compare against.
    UnknownStart,
}

/// How the frame's actual finish compares to its predicted deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameReadyMetadata {
    /// Finished before the deadline. Finishing early is on time: the only
    /// goal of any stage is to meet its deadline.
    OnTimeFinish,
    /// Finished after the deadline.
    LateFinish,
    /// Initial state, or no predictions to compare against.
    UnknownFinish,
}

/// How the frame's actual present compares to its predicted present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FramePresentMetadata {
    /// Presented within the threshold of the prediction.
    OnTimePresent,
    /// Presented later than predicted.
    LatePresent,
    /// Presented earlier than predicted.
    EarlyPresent,
    /// Initial state, or no predictions to compare against.
    UnknownPresent,
}

/// Slack allowed between an actual timestamp and its prediction before the
/// actual is classified as early or late.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JankThresholds {
    /// Slack around the predicted start time.
    pub start: Duration,
    /// Slack past the predicted deadline.
    pub deadline: Duration,
    /// Slack around the predicted present time.
    pub present: Duration,
}

impl JankThresholds {
    /// The default slack: 2 ms for each stage.
    pub const DEFAULT: Self = Self {
        start: Duration::from_millis(2),
        deadline: Duration::from_millis(2),
        present: Duration::from_millis(2),
    };
}

impl Default for JankThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}
