// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-timeline facade.
//!
//! [`FrameTimeline`] is what the compositor talks to. It owns the token
//! registry, the currently open [`DisplayFrame`], the FIFO of frames waiting
//! on their present fences, and the bounded history of resolved frames. The
//! compositor drives it in a fixed per-vsync order:
//!
//! ```text
//! set_compositor_wakeup ─► create_surface_frame* ─► add_surface_frame* ─► set_compositor_present
//! ```
//!
//! Fences are drained opportunistically at every compositor present and at
//! every dump: each signaled frame classifies itself, cascades verdicts into
//! its surface frames, fans out to the timestats and trace sinks, and lands
//! in the history. The drain is strictly FIFO — a later fence that signals
//! before an earlier one waits, so history order always matches submission
//! order.
//!
//! Every ingress call is soft: out-of-protocol calls are logged at warn and
//! dropped (see [`crate::protocol`]), never surfaced to the compositor.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clock::{Clock, MonotonicClock};
use crate::display::DisplayFrame;
use crate::fence::PresentFence;
use crate::protocol::{self, ProtocolViolation};
use crate::stats::{NoopTimeStats, TimeStatsSink};
use crate::surface::SurfaceFrame;
use crate::time::{Duration, Timestamp};
use crate::timing::{JankThresholds, PredictionState, TimelineItem};
use crate::token::TokenManager;
use crate::trace::{FRAME_TIMELINE_DATA_SOURCE, FrameTraceSink, NoopTraceSink};

/// Default bound on the resolved-frame history.
pub const DEFAULT_MAX_DISPLAY_FRAMES: usize = 64;

/// Wiring for a [`FrameTimeline`] instance.
///
/// The defaults discard stats and trace output and read a real monotonic
/// clock; tests swap in capture sinks and a
/// [`ManualClock`](crate::clock::ManualClock).
pub struct FrameTimelineConfig {
    /// Classification slack for start/deadline/present comparisons.
    pub thresholds: JankThresholds,
    /// Bound on the resolved-frame history.
    pub max_display_frames: usize,
    /// Receives per-frame summaries at present resolution.
    pub stats: Arc<dyn TimeStatsSink>,
    /// Receives trace events once the data source is registered.
    pub trace: Arc<dyn FrameTraceSink>,
    /// Source of "now" for prediction retention.
    pub clock: Arc<dyn Clock>,
}

impl Default for FrameTimelineConfig {
    fn default() -> Self {
        Self {
            thresholds: JankThresholds::default(),
            max_display_frames: DEFAULT_MAX_DISPLAY_FRAMES,
            stats: Arc::new(NoopTimeStats),
            trace: Arc::new(NoopTraceSink),
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

struct PendingPresent {
    /// `None` models a null or pre-signaled fence: the frame resolves at the
    /// next drain using its own best timestamp.
    fence: Option<Arc<dyn PresentFence>>,
    frame: Arc<DisplayFrame>,
}

struct Inner {
    current: Option<Arc<DisplayFrame>>,
    pending: VecDeque<PendingPresent>,
    history: VecDeque<Arc<DisplayFrame>>,
    max_display_frames: usize,
}

/// The frame-timeline engine.
///
/// One instance per compositor. All ingress operations take the facade mutex
/// for their duration; the token registry is self-synchronized and is never
/// called with the facade mutex held.
pub struct FrameTimeline {
    token_manager: TokenManager,
    stats: Arc<dyn TimeStatsSink>,
    trace: Arc<dyn FrameTraceSink>,
    trace_registered: AtomicBool,
    thresholds: JankThresholds,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for FrameTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("FrameTimeline")
            .field("open", &inner.current.is_some())
            .field("pending", &inner.pending.len())
            .field("history", &inner.history.len())
            .finish_non_exhaustive()
    }
}

impl Default for FrameTimeline {
    fn default() -> Self {
        Self::new(FrameTimelineConfig::default())
    }
}

impl FrameTimeline {
    /// Creates an engine with the given wiring.
    #[must_use]
    pub fn new(config: FrameTimelineConfig) -> Self {
        Self {
            token_manager: TokenManager::new(config.clock),
            stats: config.stats,
            trace: config.trace,
            trace_registered: AtomicBool::new(false),
            thresholds: config.thresholds,
            inner: Mutex::new(Inner {
                current: None,
                pending: VecDeque::new(),
                history: VecDeque::new(),
                max_display_frames: config.max_display_frames.max(1),
            }),
        }
    }

    /// The token registry the vsync predictor mints against.
    #[must_use]
    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    /// Registers the trace data source. Called once the system is fully
    /// booted; trace events are discarded until then so process-wide
    /// collectors stay out of early startup and unit tests.
    pub fn on_boot_finished(&self) {
        self.register_data_source();
    }

    /// One-shot data-source registration; later calls are no-ops.
    pub fn register_data_source(&self) {
        if !self.trace_registered.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                data_source = FRAME_TIMELINE_DATA_SOURCE,
                "registered frame timeline trace data source"
            );
        }
    }

    /// Creates a surface frame for a buffer referencing `token`.
    ///
    /// No token means no predictions ([`PredictionState::None`]); a token
    /// the registry no longer resolves means [`PredictionState::Expired`].
    #[must_use]
    pub fn create_surface_frame(
        &self,
        token: Option<i64>,
        owner_pid: i32,
        owner_uid: u32,
        layer_name: impl Into<String>,
        debug_name: impl Into<String>,
    ) -> Arc<SurfaceFrame> {
        let (prediction_state, predictions) = match token {
            None => (PredictionState::None, TimelineItem::UNSET),
            Some(token) => match self.token_manager.predictions_for_token(token) {
                Some(predictions) => (PredictionState::Valid, predictions),
                None => (PredictionState::Expired, TimelineItem::UNSET),
            },
        };
        Arc::new(SurfaceFrame::new(
            token,
            owner_pid,
            owner_uid,
            layer_name.into(),
            debug_name.into(),
            prediction_state,
            predictions,
            self.stats.clone(),
            self.thresholds,
        ))
    }

    /// Adds a surface frame to the currently open display frame.
    pub fn add_surface_frame(&self, surface_frame: Arc<SurfaceFrame>) {
        let inner = self.inner.lock().unwrap();
        match &inner.current {
            Some(current) => current.add_surface_frame(surface_frame),
            None => protocol::report(&ProtocolViolation::NoOpenDisplayFrame {
                layer: surface_frame.layer_name().to_owned(),
            }),
        }
    }

    /// Opens the display frame for a new vsync.
    ///
    /// A previous frame still open at this point is finalized implicitly
    /// with a null fence — a new wake means the compositor is done with it.
    pub fn set_compositor_wakeup(&self, token: i64, wake_time: Timestamp, vsync_period: Duration) {
        if wake_time.nanos() < 0 {
            protocol::report(&ProtocolViolation::NegativeTimestamp {
                field: "wake_time",
                nanos: wake_time.nanos(),
            });
            return;
        }
        // Resolve predictions before taking the facade lock; the registry is
        // self-synchronized.
        let predictions = self.token_manager.predictions_for_token(token);

        let mut inner = self.inner.lock().unwrap();
        if let Some(previous) = inner.current.take() {
            previous.finalize_implicit();
            inner.pending.push_back(PendingPresent {
                fence: None,
                frame: previous,
            });
        }

        let frame = Arc::new(DisplayFrame::new(self.stats.clone(), self.thresholds));
        frame.on_compositor_wake(token, vsync_period, predictions, wake_time);
        inner.current = Some(frame);
        self.drain_pending(&mut inner);
    }

    /// Finalizes the current display frame at compositor present time and
    /// queues it against `fence`. `None` models a null or pre-signaled
    /// fence. Signaled fences are drained afterwards.
    pub fn set_compositor_present(
        &self,
        end_time: Timestamp,
        fence: Option<Arc<dyn PresentFence>>,
    ) {
        if end_time.nanos() < 0 {
            protocol::report(&ProtocolViolation::NegativeTimestamp {
                field: "end_time",
                nanos: end_time.nanos(),
            });
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.current.take() {
            Some(frame) => {
                frame.on_compositor_present(end_time);
                inner.pending.push_back(PendingPresent { fence, frame });
            }
            None => protocol::report(&ProtocolViolation::PresentWithoutWakeup {
                nanos: end_time.nanos(),
            }),
        }
        self.drain_pending(&mut inner);
    }

    /// Rebounds the history to at most `max` frames, evicting oldest first.
    pub fn set_max_display_frames(&self, max: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_display_frames = max.max(1);
        Self::evict(&mut inner);
    }

    /// Restores the default history bound and clears engine state.
    ///
    /// A still-open frame is finalized implicitly, signaled fences are
    /// drained (so nothing resolvable is silently discarded), and the
    /// history is cleared. Frames whose fences have not signaled stay in the
    /// pending queue; they resolve at a later drain.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(previous) = inner.current.take() {
            previous.finalize_implicit();
            inner.pending.push_back(PendingPresent {
                fence: None,
                frame: previous,
            });
        }
        self.drain_pending(&mut inner);
        inner.history.clear();
        inner.max_display_frames = DEFAULT_MAX_DISPLAY_FRAMES;
    }

    /// Dump entry point for the text-dump CLI.
    ///
    /// Recognizes `-all` (entire history) and `-jank` (janky frames only);
    /// anything else appends usage text.
    pub fn parse_args(&self, args: &[&str], result: &mut String) {
        let mut all = false;
        let mut jank = false;
        let mut unknown = false;
        for arg in args {
            match *arg {
                "-all" => all = true,
                "-jank" => jank = true,
                _ => unknown = true,
            }
        }
        if unknown || (!all && !jank) {
            result.push_str("usage: [-all] [-jank]\n");
        }
        if all {
            self.dump_all(result);
        } else if jank {
            self.dump_jank(result);
        }
    }

    /// Resolved display frames, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Arc<DisplayFrame>> {
        self.inner.lock().unwrap().history.iter().cloned().collect()
    }

    /// Number of frames still waiting on their present fences.
    #[must_use]
    pub fn pending_presents(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    fn dump_all(&self, result: &mut String) {
        let mut inner = self.inner.lock().unwrap();
        self.drain_pending(&mut inner);
        let _ = writeln!(result, "frame timeline: {} display frames", inner.history.len());
        for frame in &inner.history {
            frame.dump_all(result, frame.base_time());
            result.push('\n');
        }
    }

    fn dump_jank(&self, result: &mut String) {
        let mut inner = self.inner.lock().unwrap();
        self.drain_pending(&mut inner);
        let mut janky_count = 0u32;
        for frame in &inner.history {
            frame.dump_jank(result, frame.base_time(), &mut janky_count);
        }
        let _ = writeln!(result, "janky display frames: {janky_count}");
    }

    /// Walks the pending queue in FIFO order, resolving every frame whose
    /// fence has signaled. Stops at the first unsignaled fence: presents are
    /// surfaced strictly in display-frame order, even when a later fence
    /// signals first.
    fn drain_pending(&self, inner: &mut Inner) {
        loop {
            let signal_time = match inner.pending.front() {
                None => break,
                Some(entry) => match &entry.fence {
                    Some(fence) => match fence.signal_time() {
                        Some(signal_time) => signal_time,
                        None => break,
                    },
                    // Null fence: resolve with the frame's own best stamp.
                    None => {
                        let actuals = entry.frame.actuals();
                        if actuals.end_time.is_set() {
                            actuals.end_time
                        } else {
                            actuals.start_time
                        }
                    }
                },
            };
            let entry = inner.pending.pop_front().expect("front checked above");
            entry.frame.on_present(signal_time);

            if self.trace_registered.load(Ordering::SeqCst) {
                let display_event = entry.frame.display_event();
                let display_token = display_event.token;
                self.trace.on_display_frame(&display_event);
                for surface_frame in entry.frame.surface_frames() {
                    self.trace.on_surface_frame(&surface_frame.trace_event(display_token));
                }
            }

            inner.history.push_back(entry.frame);
            Self::evict(inner);
        }
    }

    fn evict(inner: &mut Inner) {
        while inner.history.len() > inner.max_display_frames {
            inner.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fence::ManualFence;
    use crate::jank::JankType;
    use crate::surface::PresentState;
    use crate::token::TokenManager;
    use crate::trace::{DisplayFrameEvent, SurfaceFrameEvent};

    const VSYNC: Duration = Duration::from_nanos(16_666_666);

    fn ms(v: i64) -> Timestamp {
        Timestamp(v * 1_000_000)
    }

    fn timeline() -> (Arc<ManualClock>, FrameTimeline) {
        let clock = Arc::new(ManualClock::new(Timestamp(1)));
        let timeline = FrameTimeline::new(FrameTimelineConfig {
            clock: clock.clone(),
            ..FrameTimelineConfig::default()
        });
        (clock, timeline)
    }

    /// Runs one clean vsync through the facade and resolves it at `fence_time`.
    fn push_resolved_frame(ft: &FrameTimeline, fence_time: Timestamp) {
        let token = ft.token_manager().generate_token(TimelineItem::new(
            1,
            10_000_000,
            16_000_000,
        ));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        ft.set_compositor_present(ms(10), Some(Arc::new(ManualFence::signaled(fence_time))));
    }

    #[test]
    fn clean_vsync_lands_in_history() {
        let (_clock, ft) = timeline();
        push_resolved_frame(&ft, ms(16));
        let history = ft.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_resolved());
        assert_eq!(history[0].jank_type(), JankType::NONE);
        assert_eq!(ft.pending_presents(), 0);
    }

    #[test]
    fn surface_frame_without_open_display_frame_is_dropped() {
        let (_clock, ft) = timeline();
        let sf = ft.create_surface_frame(None, 1, 2, "L", "L#0");
        // No wakeup yet; the call is logged and dropped.
        ft.add_surface_frame(sf);
        assert!(ft.history().is_empty());
    }

    #[test]
    fn double_compositor_present_is_dropped() {
        let (_clock, ft) = timeline();
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(1, 10_000_000, 16_000_000));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        ft.set_compositor_present(ms(10), Some(Arc::new(ManualFence::signaled(ms(16)))));
        ft.set_compositor_present(ms(12), Some(Arc::new(ManualFence::signaled(ms(17)))));
        assert_eq!(ft.history().len(), 1);
    }

    #[test]
    fn token_resolution_grades_prediction_state() {
        let (clock, ft) = timeline();
        let pred = TimelineItem::new(1, 8_000_000, 16_000_000);
        let token = ft.token_manager().generate_token(pred);

        let sf = ft.create_surface_frame(Some(token), 1, 2, "L", "L#0");
        assert_eq!(sf.prediction_state(), PredictionState::Valid);
        assert_eq!(sf.predictions(), pred);

        let sf = ft.create_surface_frame(None, 1, 2, "L", "L#1");
        assert_eq!(sf.prediction_state(), PredictionState::None);
        assert_eq!(sf.predictions(), TimelineItem::UNSET);

        clock.advance(TokenManager::RETENTION.nanos() + 1);
        let sf = ft.create_surface_frame(Some(token), 1, 2, "L", "L#2");
        assert_eq!(sf.prediction_state(), PredictionState::Expired);
        assert_eq!(sf.predictions(), TimelineItem::UNSET);
    }

    #[test]
    fn drain_is_strictly_fifo() {
        let (_clock, ft) = timeline();
        let slow = Arc::new(ManualFence::new());

        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(1, 10_000_000, 16_000_000));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        ft.set_compositor_present(ms(10), Some(slow.clone()));

        // Second frame's fence signals before the first's.
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(16_000_000, 26_000_000, 33_000_000));
        ft.set_compositor_wakeup(token, ms(16), VSYNC);
        ft.set_compositor_present(ms(26), Some(Arc::new(ManualFence::signaled(ms(33)))));

        // Both wait behind the unsignaled head.
        assert_eq!(ft.history().len(), 0);
        assert_eq!(ft.pending_presents(), 2);

        slow.signal(ms(16));
        // Next ingress call drains both, in order.
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(33_000_000, 43_000_000, 50_000_000));
        ft.set_compositor_wakeup(token, ms(33), VSYNC);

        let history = ft.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].actuals().present_time, ms(16));
        assert_eq!(history[1].actuals().present_time, ms(33));
    }

    #[test]
    fn double_wakeup_implicitly_finalizes_previous_frame() {
        let (_clock, ft) = timeline();
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(1, 10_000_000, 16_000_000));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        // No compositor present; next wake abandons the frame.
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(16_000_000, 26_000_000, 33_000_000));
        ft.set_compositor_wakeup(token, ms(16), VSYNC);

        let history = ft.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].jank_type(), JankType::UNKNOWN);
    }

    #[test]
    fn null_fence_resolves_at_end_time() {
        let (_clock, ft) = timeline();
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(1, 10_000_000, 16_000_000));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        ft.set_compositor_present(ms(10), None);

        let history = ft.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].actuals().present_time, ms(10));
    }

    #[test]
    fn history_bound_evicts_oldest() {
        let (_clock, ft) = timeline();
        ft.set_max_display_frames(3);
        for i in 0..5 {
            push_resolved_frame(&ft, ms(16 + i));
        }
        let history = ft.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].actuals().present_time, ms(18));
        assert_eq!(history[2].actuals().present_time, ms(20));
    }

    #[test]
    fn reset_restores_default_bound_and_clears_history() {
        let (_clock, ft) = timeline();
        ft.set_max_display_frames(2);
        push_resolved_frame(&ft, ms(16));
        push_resolved_frame(&ft, ms(17));
        ft.reset();
        assert!(ft.history().is_empty());

        for i in 0..70 {
            push_resolved_frame(&ft, ms(16 + i));
        }
        assert_eq!(ft.history().len(), DEFAULT_MAX_DISPLAY_FRAMES);
    }

    #[test]
    fn reset_keeps_unsignaled_frames_pending() {
        let (_clock, ft) = timeline();
        let fence = Arc::new(ManualFence::new());
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(1, 10_000_000, 16_000_000));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        ft.set_compositor_present(ms(10), Some(fence.clone()));

        ft.reset();
        assert_eq!(ft.pending_presents(), 1);

        fence.signal(ms(16));
        push_resolved_frame(&ft, ms(33));
        assert_eq!(ft.history().len(), 2);
    }

    #[test]
    fn parse_args_dispatches_and_reports_usage() {
        let (_clock, ft) = timeline();
        push_resolved_frame(&ft, ms(16));

        let mut out = String::new();
        ft.parse_args(&["-all"], &mut out);
        assert!(out.contains("frame timeline: 1 display frames"), "got: {out}");
        assert!(out.contains("display frame: token="), "got: {out}");

        let mut out = String::new();
        ft.parse_args(&["-jank"], &mut out);
        assert!(out.contains("janky display frames: 0"), "got: {out}");

        let mut out = String::new();
        ft.parse_args(&["-frobnicate"], &mut out);
        assert!(out.contains("usage:"), "got: {out}");
    }

    #[test]
    fn dump_drains_signaled_fences() {
        let (_clock, ft) = timeline();
        let fence = Arc::new(ManualFence::new());
        let token = ft
            .token_manager()
            .generate_token(TimelineItem::new(1, 10_000_000, 16_000_000));
        ft.set_compositor_wakeup(token, Timestamp(1), VSYNC);
        ft.set_compositor_present(ms(10), Some(fence.clone()));
        assert!(ft.history().is_empty());

        fence.signal(ms(16));
        let mut out = String::new();
        ft.parse_args(&["-all"], &mut out);
        assert_eq!(ft.history().len(), 1);
    }

    #[test]
    fn trace_events_flow_after_registration() {
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct Capture {
            display: StdMutex<Vec<DisplayFrameEvent>>,
            surface: StdMutex<Vec<SurfaceFrameEvent>>,
        }
        impl FrameTraceSink for Capture {
            fn on_display_frame(&self, event: &DisplayFrameEvent) {
                self.display.lock().unwrap().push(*event);
            }
            fn on_surface_frame(&self, event: &SurfaceFrameEvent) {
                self.surface.lock().unwrap().push(event.clone());
            }
        }

        let capture = Arc::new(Capture::default());
        let ft = FrameTimeline::new(FrameTimelineConfig {
            clock: Arc::new(ManualClock::new(Timestamp(1))),
            trace: capture.clone(),
            ..FrameTimelineConfig::default()
        });

        // Before registration: resolved frames emit nothing.
        push_resolved_frame(&ft, ms(16));
        assert!(capture.display.lock().unwrap().is_empty());

        ft.on_boot_finished();
        let display_token = ft
            .token_manager()
            .generate_token(TimelineItem::new(16_000_000, 26_000_000, 33_000_000));
        let surface_token = ft
            .token_manager()
            .generate_token(TimelineItem::new(16_000_000, 24_000_000, 33_000_000));
        ft.set_compositor_wakeup(display_token, ms(16), VSYNC);
        let sf = ft.create_surface_frame(Some(surface_token), 1234, 1000, "L", "L#0");
        sf.set_acquire_fence_time(ms(24));
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);
        ft.add_surface_frame(sf);
        ft.set_compositor_present(ms(26), Some(Arc::new(ManualFence::signaled(ms(33)))));

        let display = capture.display.lock().unwrap();
        let surface = capture.surface.lock().unwrap();
        assert_eq!(display.len(), 1);
        assert_eq!(display[0].token, display_token);
        assert_eq!(surface.len(), 1);
        assert_eq!(surface[0].display_token, display_token);
        assert_eq!(surface[0].token, surface_token);
        assert_eq!(surface[0].layer_name, "L");
    }
}
