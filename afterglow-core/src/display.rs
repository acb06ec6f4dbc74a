// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-vsync display frame.
//!
//! A [`DisplayFrame`] aggregates one compositor timeline with the surface
//! frames composited during that vsync. It moves through three states:
//!
//! ```text
//! Open ──set_compositor_present──► AwaitingFence ──fence signal──► Resolved
//! ```
//!
//! While `Open` it accepts surface frames. Finalizing records the compositor's
//! end time and grades the start/ready metadata. Resolution happens strictly
//! after the display fence signals: the frame grades its present metadata,
//! classifies its own jank, and cascades the verdict into every surface frame
//! so per-surface attribution can tell ambient compositor jank from app jank.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::Mutex;

use crate::jank::{JankType, classify_display_jank, classify_present, classify_ready, classify_start};
use crate::protocol::{self, ProtocolViolation};
use crate::stats::{DisplayPresentRecord, TimeStatsSink};
use crate::surface::SurfaceFrame;
use crate::time::{Duration, Timestamp};
use crate::timing::{
    FramePresentMetadata, FrameReadyMetadata, FrameStartMetadata, JankThresholds, PredictionState,
    TimelineItem,
};
use crate::token::INVALID_TOKEN;
use crate::trace::DisplayFrameEvent;

/// Starting capacity for the surface-frame list. Typical scenes composite
/// around this many layers per vsync.
pub(crate) const INITIAL_SURFACE_FRAMES: usize = 10;

/// Where a display frame is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    /// Accepting surface frames; compositor is still working on the vsync.
    Open,
    /// Finalized and queued against its present fence.
    AwaitingFence,
    /// Fence signaled; verdicts assigned; frame is history.
    Resolved,
}

struct State {
    lifecycle: Lifecycle,
    token: i64,
    vsync_period: Duration,
    prediction_state: PredictionState,
    predictions: TimelineItem,
    actuals: TimelineItem,
    jank: JankType,
    start_metadata: FrameStartMetadata,
    ready_metadata: FrameReadyMetadata,
    present_metadata: FramePresentMetadata,
    surface_frames: Vec<Arc<SurfaceFrame>>,
}

/// One vsync's worth of composition: the compositor timeline plus every
/// surface frame composited in it.
pub struct DisplayFrame {
    stats: Arc<dyn TimeStatsSink>,
    thresholds: JankThresholds,
    state: Mutex<State>,
}

impl std::fmt::Debug for DisplayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("DisplayFrame")
            .field("token", &state.token)
            .field("lifecycle", &state.lifecycle)
            .field("surface_frames", &state.surface_frames.len())
            .finish_non_exhaustive()
    }
}

impl DisplayFrame {
    pub(crate) fn new(stats: Arc<dyn TimeStatsSink>, thresholds: JankThresholds) -> Self {
        Self {
            stats,
            thresholds,
            state: Mutex::new(State {
                lifecycle: Lifecycle::Open,
                token: INVALID_TOKEN,
                vsync_period: Duration::ZERO,
                prediction_state: PredictionState::None,
                predictions: TimelineItem::UNSET,
                actuals: TimelineItem::UNSET,
                jank: JankType::NONE,
                start_metadata: FrameStartMetadata::UnknownStart,
                ready_metadata: FrameReadyMetadata::UnknownFinish,
                present_metadata: FramePresentMetadata::UnknownPresent,
                surface_frames: Vec::new(),
            }),
        }
    }

    /// Seeds the frame from the compositor's wake-up: token, vsync period,
    /// the display-side predictions resolved for that token, and the wake
    /// time as the actual start.
    pub(crate) fn on_compositor_wake(
        &self,
        token: i64,
        vsync_period: Duration,
        predictions: Option<TimelineItem>,
        wake_time: Timestamp,
    ) {
        let mut state = self.state.lock().unwrap();
        state.token = token;
        state.vsync_period = vsync_period;
        match predictions {
            Some(predictions) => {
                state.prediction_state = PredictionState::Valid;
                state.predictions = predictions;
            }
            None => {
                state.prediction_state = PredictionState::Expired;
                state.predictions = TimelineItem::UNSET;
            }
        }
        state.actuals.start_time = wake_time;
    }

    /// Appends a surface frame in arrival order. Rejected once the frame has
    /// been finalized.
    pub(crate) fn add_surface_frame(&self, surface_frame: Arc<SurfaceFrame>) {
        let mut state = self.state.lock().unwrap();
        if state.lifecycle != Lifecycle::Open {
            protocol::report(&ProtocolViolation::FrameAlreadyFinalized { token: state.token });
            return;
        }
        if state.surface_frames.is_empty() {
            state.surface_frames.reserve(INITIAL_SURFACE_FRAMES);
        }
        state.surface_frames.push(surface_frame);
    }

    /// Finalizes the frame at compositor present: records the actual end
    /// time and grades start/ready metadata against the predictions.
    pub(crate) fn on_compositor_present(&self, end_time: Timestamp) {
        let mut state = self.state.lock().unwrap();
        if state.lifecycle != Lifecycle::Open {
            protocol::report(&ProtocolViolation::DuplicatePresent { token: state.token });
            return;
        }
        state.actuals.end_time = end_time;
        if state.prediction_state == PredictionState::Valid {
            state.start_metadata = classify_start(
                state.actuals.start_time,
                state.predictions.start_time,
                self.thresholds.start,
            );
            state.ready_metadata =
                classify_ready(end_time, state.predictions.end_time, self.thresholds.deadline);
        }
        state.lifecycle = Lifecycle::AwaitingFence;
    }

    /// Freezes an abandoned frame without a compositor present: the caller
    /// woke for a new vsync while this one was still open. No end time is
    /// recorded and start/ready metadata stay unknown, so resolution will
    /// classify the frame as [`JankType::UNKNOWN`].
    pub(crate) fn finalize_implicit(&self) {
        let mut state = self.state.lock().unwrap();
        if state.lifecycle == Lifecycle::Open {
            state.lifecycle = Lifecycle::AwaitingFence;
        }
    }

    /// Resolves the frame once its fence has signaled: grades present
    /// metadata, classifies jank, cascades into the surface frames, and
    /// pushes the display summary to timestats.
    pub(crate) fn on_present(&self, signal_time: Timestamp) {
        let mut state = self.state.lock().unwrap();
        if state.lifecycle == Lifecycle::Resolved {
            protocol::report(&ProtocolViolation::DuplicatePresent { token: state.token });
            return;
        }
        state.actuals.present_time = signal_time;
        if state.prediction_state == PredictionState::Valid && signal_time.is_set() {
            state.present_metadata = classify_present(
                signal_time,
                state.predictions.present_time,
                self.thresholds.present,
            );
            state.jank = classify_display_jank(
                state.ready_metadata,
                state.present_metadata,
                signal_time,
                state.predictions.present_time,
                state.vsync_period,
                self.thresholds,
            );
        } else {
            state.jank = JankType::UNKNOWN;
        }
        state.lifecycle = Lifecycle::Resolved;

        let jank = state.jank;
        let vsync_period = state.vsync_period;
        let record = DisplayPresentRecord {
            predicted_present: state.predictions.present_time,
            actual_present: signal_time,
            jank,
        };
        let surface_frames = state.surface_frames.clone();
        drop(state);

        for surface_frame in &surface_frames {
            surface_frame.on_present(signal_time, jank, vsync_period);
        }
        self.stats.record_display(&record);
    }

    /// Builds the trace event for this frame.
    pub(crate) fn display_event(&self) -> DisplayFrameEvent {
        let state = self.state.lock().unwrap();
        DisplayFrameEvent {
            token: state.token,
            vsync_period: state.vsync_period,
            predictions: state.predictions,
            actuals: state.actuals,
            jank: state.jank,
            present_metadata: state.present_metadata,
        }
    }

    /// The smallest set timestamp across this frame and all of its surface
    /// frames, used to render dumps relative to a common origin.
    #[must_use]
    pub fn base_time(&self) -> Timestamp {
        let (mut base, surface_frames) = {
            let state = self.state.lock().unwrap();
            (
                state.predictions.base_time().min_set(state.actuals.base_time()),
                state.surface_frames.clone(),
            )
        };
        for surface_frame in &surface_frames {
            base = base.min_set(surface_frame.base_time());
        }
        base
    }

    /// Whether this frame or any contained surface frame carries jank.
    #[must_use]
    pub fn is_janky(&self) -> bool {
        let (jank, surface_frames) = {
            let state = self.state.lock().unwrap();
            (state.jank, state.surface_frames.clone())
        };
        !jank.is_empty() || surface_frames.iter().any(|sf| sf.is_janky())
    }

    /// Appends this frame and all its surface frames, timestamps relative to
    /// `base_time`.
    pub fn dump_all(&self, out: &mut String, base_time: Timestamp) {
        self.dump(out, base_time);
    }

    /// Appends this frame only if it (or a contained surface frame) is
    /// janky. `janky_count` tracks the running number of janky frames dumped.
    pub fn dump_jank(&self, out: &mut String, base_time: Timestamp, janky_count: &mut u32) {
        if !self.is_janky() {
            return;
        }
        *janky_count += 1;
        let _ = writeln!(out, "janky frame #{janky_count}:");
        self.dump(out, base_time);
    }

    fn dump(&self, out: &mut String, base_time: Timestamp) {
        let (state_line, prediction_line, actual_line, surface_frames) = {
            let state = self.state.lock().unwrap();
            (
                format!(
                    "display frame: token={} vsync={:.2}ms jank={:?}",
                    state.token,
                    state.vsync_period.as_millis_f64(),
                    state.jank,
                ),
                format!(
                    "  prediction({:?}): start={} end={} present={}",
                    state.prediction_state,
                    rel_millis(state.predictions.start_time, base_time),
                    rel_millis(state.predictions.end_time, base_time),
                    rel_millis(state.predictions.present_time, base_time),
                ),
                format!(
                    "  actual: start={} end={} present={}",
                    rel_millis(state.actuals.start_time, base_time),
                    rel_millis(state.actuals.end_time, base_time),
                    rel_millis(state.actuals.present_time, base_time),
                ),
                state.surface_frames.clone(),
            )
        };
        let _ = writeln!(out, "{state_line}");
        let _ = writeln!(out, "{prediction_line}");
        let _ = writeln!(out, "{actual_line}");
        for surface_frame in &surface_frames {
            surface_frame.dump(out, "  ", base_time);
        }
    }

    /// Token of the compositor-side prediction.
    #[must_use]
    pub fn token(&self) -> i64 {
        self.state.lock().unwrap().token
    }

    /// Vsync period in effect during this frame.
    #[must_use]
    pub fn vsync_period(&self) -> Duration {
        self.state.lock().unwrap().vsync_period
    }

    /// How the compositor-side predictions were resolved.
    #[must_use]
    pub fn prediction_state(&self) -> PredictionState {
        self.state.lock().unwrap().prediction_state
    }

    /// The predicted compositor timeline.
    #[must_use]
    pub fn predictions(&self) -> TimelineItem {
        self.state.lock().unwrap().predictions
    }

    /// The measured compositor timeline so far.
    #[must_use]
    pub fn actuals(&self) -> TimelineItem {
        self.state.lock().unwrap().actuals
    }

    /// The display frame's jank verdict (empty until resolved).
    #[must_use]
    pub fn jank_type(&self) -> JankType {
        self.state.lock().unwrap().jank
    }

    /// How the actual start compared to the prediction.
    #[must_use]
    pub fn start_metadata(&self) -> FrameStartMetadata {
        self.state.lock().unwrap().start_metadata
    }

    /// How the actual finish compared to the predicted deadline.
    #[must_use]
    pub fn ready_metadata(&self) -> FrameReadyMetadata {
        self.state.lock().unwrap().ready_metadata
    }

    /// How the actual present compared to the prediction.
    #[must_use]
    pub fn present_metadata(&self) -> FramePresentMetadata {
        self.state.lock().unwrap().present_metadata
    }

    /// The surface frames composited in this vsync, in arrival order.
    #[must_use]
    pub fn surface_frames(&self) -> Vec<Arc<SurfaceFrame>> {
        self.state.lock().unwrap().surface_frames.clone()
    }

    /// Whether the frame has been resolved against its fence.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.lock().unwrap().lifecycle == Lifecycle::Resolved
    }
}

/// Renders a timestamp relative to `base` in fractional milliseconds, or
/// `n/a` for the unset sentinel.
pub(crate) fn rel_millis(t: Timestamp, base: Timestamp) -> String {
    if t.is_set() {
        format!("{:.2}ms", (t - base).as_millis_f64())
    } else {
        "n/a".into()
    }
}
