// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-layer per-buffer frame record.
//!
//! A [`SurfaceFrame`] is created at the compositor boundary when a buffer
//! referencing a token shows up. The compositor fills in the actual
//! timestamps stage by stage (app start, queue, acquire fence) and records
//! whether the buffer was latched and shown or superseded. Once the owning
//! display frame's present fence signals, [`SurfaceFrame::on_present`]
//! freezes the record: it classifies the frame against its predictions,
//! attributes jank, and pushes the summary to the timestats sink.
//!
//! Construction is the facade's privilege — it alone can resolve a token
//! into predictions and supply the sink and thresholds.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::Mutex;

use crate::display::rel_millis;
use crate::jank::{JankType, classify_present, classify_ready, classify_surface_jank};
use crate::protocol::{self, ProtocolViolation};
use crate::stats::{SurfacePresentRecord, TimeStatsSink};
use crate::time::{Duration, Timestamp};
use crate::timing::{
    FramePresentMetadata, FrameReadyMetadata, JankThresholds, PredictionState, TimelineItem,
};
use crate::token::INVALID_TOKEN;
use crate::trace::SurfaceFrameEvent;

/// What became of the buffer behind a surface frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PresentState {
    /// The buffer was latched and composited into a display frame.
    Presented,
    /// The buffer was latched but superseded before reaching the screen.
    Dropped,
    /// Initial state; the compositor has not decided yet.
    Unknown,
}

impl PresentState {
    const fn name(self) -> &'static str {
        match self {
            Self::Presented => "Presented",
            Self::Dropped => "Dropped",
            Self::Unknown => "Unknown",
        }
    }
}

struct State {
    present_state: PresentState,
    actuals: TimelineItem,
    actual_queue_time: Timestamp,
    last_latch_time: Timestamp,
    gpu_composition: bool,
    jank: Option<JankType>,
    present_metadata: FramePresentMetadata,
    ready_metadata: FrameReadyMetadata,
}

/// One layer's buffer within one vsync.
///
/// Mutable fields are written by the compositor thread until present
/// resolution and guarded by the frame's own mutex so dump and trace readers
/// can observe them safely at any time.
pub struct SurfaceFrame {
    token: i64,
    owner_pid: i32,
    owner_uid: u32,
    layer_name: String,
    debug_name: String,
    prediction_state: PredictionState,
    predictions: TimelineItem,
    thresholds: JankThresholds,
    stats: Arc<dyn TimeStatsSink>,
    state: Mutex<State>,
}

impl std::fmt::Debug for SurfaceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceFrame")
            .field("token", &self.token)
            .field("layer_name", &self.layer_name)
            .field("prediction_state", &self.prediction_state)
            .finish_non_exhaustive()
    }
}

impl SurfaceFrame {
    pub(crate) fn new(
        token: Option<i64>,
        owner_pid: i32,
        owner_uid: u32,
        layer_name: String,
        debug_name: String,
        prediction_state: PredictionState,
        predictions: TimelineItem,
        stats: Arc<dyn TimeStatsSink>,
        thresholds: JankThresholds,
    ) -> Self {
        Self {
            token: token.unwrap_or(INVALID_TOKEN),
            owner_pid,
            owner_uid,
            layer_name,
            debug_name,
            prediction_state,
            predictions,
            thresholds,
            stats,
            state: Mutex::new(State {
                present_state: PresentState::Unknown,
                actuals: TimelineItem::UNSET,
                actual_queue_time: Timestamp::ZERO,
                last_latch_time: Timestamp::ZERO,
                gpu_composition: false,
                jank: None,
                present_metadata: FramePresentMetadata::UnknownPresent,
                ready_metadata: FrameReadyMetadata::UnknownFinish,
            }),
        }
    }

    /// Records when the app began working on the frame, if it reported one.
    pub fn set_actual_start_time(&self, start_time: Timestamp) {
        if !valid_timestamp("start_time", start_time) {
            return;
        }
        self.state.lock().unwrap().actuals.start_time = start_time;
    }

    /// Records when the compositor received the buffer.
    pub fn set_actual_queue_time(&self, queue_time: Timestamp) {
        if !valid_timestamp("queue_time", queue_time) {
            return;
        }
        self.state.lock().unwrap().actual_queue_time = queue_time;
    }

    /// Records the acquire-fence signal time — the moment the buffer's
    /// contents became usable. This is the frame's actual end time.
    pub fn set_acquire_fence_time(&self, acquire_fence_time: Timestamp) {
        if !valid_timestamp("acquire_fence_time", acquire_fence_time) {
            return;
        }
        self.state.lock().unwrap().actuals.end_time = acquire_fence_time;
    }

    /// Marks whether the frame was composited by the GPU.
    pub fn set_gpu_composition(&self, gpu_composition: bool) {
        self.state.lock().unwrap().gpu_composition = gpu_composition;
    }

    /// Transitions the buffer out of [`PresentState::Unknown`].
    ///
    /// `last_latch_time` is when the previous buffer from the same layer was
    /// latched; it feeds the buffer-stuffing check and is retained only for
    /// [`PresentState::Presented`]. Repeating the current state is a no-op;
    /// contradicting a settled state is logged and ignored.
    pub fn set_present_state(&self, present_state: PresentState, last_latch_time: Timestamp) {
        if !valid_timestamp("last_latch_time", last_latch_time) {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if state.present_state == present_state {
            return;
        }
        if state.present_state != PresentState::Unknown {
            protocol::report(&ProtocolViolation::PresentStateSettled {
                current: state.present_state.name(),
                requested: present_state.name(),
            });
            return;
        }
        state.present_state = present_state;
        if present_state == PresentState::Presented {
            state.last_latch_time = last_latch_time;
        }
    }

    /// Resolves the frame once the owning display frame's fence has signaled.
    ///
    /// `display_jank` is the display frame's own verdict, passed down so the
    /// per-surface attribution can distinguish ambient compositor jank from
    /// the app's. Dropped and undecided buffers are left untouched: they
    /// never presented, so no present time or verdict applies.
    pub(crate) fn on_present(
        &self,
        present_time: Timestamp,
        display_jank: JankType,
        vsync_period: Duration,
    ) {
        let mut state = self.state.lock().unwrap();
        if state.jank.is_some() {
            protocol::report(&ProtocolViolation::DuplicatePresent { token: self.token });
            return;
        }
        if state.present_state != PresentState::Presented {
            return;
        }

        state.actuals.present_time = present_time;

        if self.prediction_state == PredictionState::Valid && present_time.is_set() {
            state.ready_metadata = if state.actuals.end_time.is_set() {
                classify_ready(
                    state.actuals.end_time,
                    self.predictions.end_time,
                    self.thresholds.deadline,
                )
            } else {
                FrameReadyMetadata::UnknownFinish
            };
            state.present_metadata = classify_present(
                present_time,
                self.predictions.present_time,
                self.thresholds.present,
            );
            state.jank = Some(classify_surface_jank(
                state.ready_metadata,
                true,
                state.last_latch_time,
                self.predictions.present_time,
                vsync_period,
                display_jank,
            ));
        } else {
            state.jank = Some(JankType::UNKNOWN);
        }

        let record = SurfacePresentRecord {
            owner_uid: self.owner_uid,
            layer_name: self.layer_name.clone(),
            predicted_present: self.predictions.present_time,
            actual_present: present_time,
            jank: state.jank.unwrap_or(JankType::UNKNOWN),
            gpu_composition: state.gpu_composition,
        };
        drop(state);
        self.stats.record_surface(&record);
    }

    /// Builds the trace event for this frame. `display_token` links it to the
    /// parent display frame on the consumer side.
    pub(crate) fn trace_event(&self, display_token: i64) -> SurfaceFrameEvent {
        let state = self.state.lock().unwrap();
        SurfaceFrameEvent {
            display_token,
            token: self.token,
            owner_pid: self.owner_pid,
            owner_uid: self.owner_uid,
            layer_name: self.layer_name.clone(),
            predictions: self.predictions,
            actuals: state.actuals,
            jank: state.jank.unwrap_or(JankType::UNKNOWN),
            present_state: state.present_state,
        }
    }

    /// The smallest set timestamp across this frame's predictions, actuals,
    /// and queue time.
    #[must_use]
    pub fn base_time(&self) -> Timestamp {
        let state = self.state.lock().unwrap();
        self.predictions
            .base_time()
            .min_set(state.actuals.base_time())
            .min_set(state.actual_queue_time)
    }

    /// Appends a human-readable rendition of this frame, timestamps relative
    /// to `base_time`.
    pub fn dump(&self, out: &mut String, indent: &str, base_time: Timestamp) {
        let state = self.state.lock().unwrap();
        let jank = match state.jank {
            Some(jank) => format!("{jank:?}"),
            None => "unclassified".into(),
        };
        let _ = writeln!(
            out,
            "{indent}surface frame: {} layer={:?} owner={}/{} token={} state={} jank={jank}",
            self.debug_name,
            self.layer_name,
            self.owner_pid,
            self.owner_uid,
            self.token,
            state.present_state.name(),
        );
        let _ = writeln!(
            out,
            "{indent}  prediction({:?}): start={} end={} present={}",
            self.prediction_state,
            rel_millis(self.predictions.start_time, base_time),
            rel_millis(self.predictions.end_time, base_time),
            rel_millis(self.predictions.present_time, base_time),
        );
        let _ = writeln!(
            out,
            "{indent}  actual: start={} queue={} end={} present={} last_latch={}",
            rel_millis(state.actuals.start_time, base_time),
            rel_millis(state.actual_queue_time, base_time),
            rel_millis(state.actuals.end_time, base_time),
            rel_millis(state.actuals.present_time, base_time),
            rel_millis(state.last_latch_time, base_time),
        );
    }

    /// Token this frame's predictions were minted under, or the invalid
    /// sentinel.
    #[must_use]
    pub fn token(&self) -> i64 {
        self.token
    }

    /// Pid of the owning process.
    #[must_use]
    pub fn owner_pid(&self) -> i32 {
        self.owner_pid
    }

    /// Uid of the owning process.
    #[must_use]
    pub fn owner_uid(&self) -> u32 {
        self.owner_uid
    }

    /// Layer this frame's buffer belongs to.
    #[must_use]
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// How this frame's predictions were resolved.
    #[must_use]
    pub fn prediction_state(&self) -> PredictionState {
        self.prediction_state
    }

    /// The predicted timeline.
    #[must_use]
    pub fn predictions(&self) -> TimelineItem {
        self.predictions
    }

    /// The measured timeline so far.
    #[must_use]
    pub fn actuals(&self) -> TimelineItem {
        self.state.lock().unwrap().actuals
    }

    /// When the compositor received the buffer.
    #[must_use]
    pub fn actual_queue_time(&self) -> Timestamp {
        self.state.lock().unwrap().actual_queue_time
    }

    /// Current present disposition.
    #[must_use]
    pub fn present_state(&self) -> PresentState {
        self.state.lock().unwrap().present_state
    }

    /// The jank verdict, or `None` while the frame is unclassified.
    #[must_use]
    pub fn jank_type(&self) -> Option<JankType> {
        self.state.lock().unwrap().jank
    }

    /// Returns `true` once classified as anything other than jank-free.
    #[must_use]
    pub fn is_janky(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .jank
            .is_some_and(|jank| !jank.is_empty())
    }

    /// How the actual present compared to the prediction.
    #[must_use]
    pub fn present_metadata(&self) -> FramePresentMetadata {
        self.state.lock().unwrap().present_metadata
    }

    /// How the actual finish compared to the predicted deadline.
    #[must_use]
    pub fn ready_metadata(&self) -> FrameReadyMetadata {
        self.state.lock().unwrap().ready_metadata
    }
}

/// Validates an incoming timestamp; negative values are a protocol violation
/// and the call that carried them is dropped.
fn valid_timestamp(field: &'static str, t: Timestamp) -> bool {
    if t.nanos() < 0 {
        protocol::report(&ProtocolViolation::NegativeTimestamp {
            field,
            nanos: t.nanos(),
        });
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::NoopTimeStats;

    const VSYNC: Duration = Duration::from_nanos(16_666_666);

    fn frame(prediction_state: PredictionState, predictions: TimelineItem) -> SurfaceFrame {
        SurfaceFrame::new(
            Some(7),
            1234,
            1000,
            "L".into(),
            "L#0".into(),
            prediction_state,
            predictions,
            Arc::new(NoopTimeStats),
            JankThresholds::default(),
        )
    }

    fn ms(v: i64) -> Timestamp {
        Timestamp(v * 1_000_000)
    }

    #[test]
    fn missing_token_uses_invalid_sentinel() {
        let sf = SurfaceFrame::new(
            None,
            1,
            2,
            "L".into(),
            "L#0".into(),
            PredictionState::None,
            TimelineItem::UNSET,
            Arc::new(NoopTimeStats),
            JankThresholds::default(),
        );
        assert_eq!(sf.token(), INVALID_TOKEN);
    }

    #[test]
    fn actuals_fill_in_per_stage() {
        let sf = frame(PredictionState::Valid, TimelineItem::new(0, 8_000_000, 16_000_000));
        sf.set_actual_start_time(Timestamp(1_000_000));
        sf.set_actual_queue_time(ms(7));
        sf.set_acquire_fence_time(ms(8));

        let actuals = sf.actuals();
        assert_eq!(actuals.start_time, Timestamp(1_000_000));
        assert_eq!(actuals.end_time, ms(8));
        assert!(!actuals.present_time.is_set());
        assert_eq!(sf.actual_queue_time(), ms(7));
    }

    #[test]
    fn negative_timestamps_are_dropped() {
        let sf = frame(PredictionState::Valid, TimelineItem::UNSET);
        sf.set_actual_queue_time(Timestamp(-5));
        assert!(!sf.actual_queue_time().is_set());
    }

    #[test]
    fn present_state_transitions_once() {
        let sf = frame(PredictionState::Valid, TimelineItem::UNSET);
        assert_eq!(sf.present_state(), PresentState::Unknown);

        sf.set_present_state(PresentState::Presented, ms(5));
        assert_eq!(sf.present_state(), PresentState::Presented);

        // Re-entry is idempotent; contradiction is ignored.
        sf.set_present_state(PresentState::Presented, ms(6));
        sf.set_present_state(PresentState::Dropped, Timestamp::ZERO);
        assert_eq!(sf.present_state(), PresentState::Presented);
    }

    #[test]
    fn on_time_presented_frame_classifies_clean() {
        let sf = frame(PredictionState::Valid, TimelineItem::new(0, 8_000_000, 16_000_000));
        sf.set_actual_queue_time(ms(7));
        sf.set_acquire_fence_time(ms(8));
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);

        sf.on_present(ms(16), JankType::NONE, VSYNC);

        assert_eq!(sf.jank_type(), Some(JankType::NONE));
        assert!(!sf.is_janky());
        assert_eq!(sf.ready_metadata(), FrameReadyMetadata::OnTimeFinish);
        assert_eq!(sf.present_metadata(), FramePresentMetadata::OnTimePresent);
        assert_eq!(sf.actuals().present_time, ms(16));
    }

    #[test]
    fn dropped_frame_gets_no_present_time_or_verdict() {
        let sf = frame(PredictionState::Valid, TimelineItem::new(0, 8_000_000, 16_000_000));
        sf.set_present_state(PresentState::Dropped, Timestamp::ZERO);

        sf.on_present(ms(16), JankType::NONE, VSYNC);

        assert!(!sf.actuals().present_time.is_set());
        assert_eq!(sf.jank_type(), None);
    }

    #[test]
    fn inherits_compositor_deadline_miss() {
        let sf = frame(PredictionState::Valid, TimelineItem::new(0, 8_000_000, 16_000_000));
        sf.set_acquire_fence_time(ms(8));
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);

        sf.on_present(ms(32), JankType::COMPOSITOR_DEADLINE_MISSED, VSYNC);

        assert_eq!(sf.jank_type(), Some(JankType::COMPOSITOR_DEADLINE_MISSED));
    }

    #[test]
    fn expired_predictions_classify_unknown() {
        let sf = frame(PredictionState::Expired, TimelineItem::UNSET);
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);

        sf.on_present(ms(16), JankType::NONE, VSYNC);

        assert_eq!(sf.jank_type(), Some(JankType::UNKNOWN));
        assert_eq!(sf.present_metadata(), FramePresentMetadata::UnknownPresent);
        assert_eq!(sf.ready_metadata(), FrameReadyMetadata::UnknownFinish);
    }

    #[test]
    fn duplicate_resolution_is_ignored() {
        let sf = frame(PredictionState::Valid, TimelineItem::new(0, 8_000_000, 16_000_000));
        sf.set_acquire_fence_time(ms(8));
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);

        sf.on_present(ms(16), JankType::NONE, VSYNC);
        sf.on_present(ms(33), JankType::DISPLAY_HAL, VSYNC);

        assert_eq!(sf.actuals().present_time, ms(16));
        assert_eq!(sf.jank_type(), Some(JankType::NONE));
    }

    #[test]
    fn stats_record_carries_verdict() {
        use std::sync::Mutex as StdMutex;

        #[derive(Default)]
        struct Capture {
            records: StdMutex<Vec<SurfacePresentRecord>>,
        }
        impl TimeStatsSink for Capture {
            fn record_surface(&self, record: &SurfacePresentRecord) {
                self.records.lock().unwrap().push(record.clone());
            }
        }

        let capture = Arc::new(Capture::default());
        let sf = SurfaceFrame::new(
            Some(9),
            1,
            1000,
            "L".into(),
            "L#0".into(),
            PredictionState::Valid,
            TimelineItem::new(0, 8_000_000, 16_000_000),
            capture.clone(),
            JankThresholds::default(),
        );
        sf.set_acquire_fence_time(ms(8));
        sf.set_gpu_composition(true);
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);
        sf.on_present(ms(16), JankType::NONE, VSYNC);

        let records = capture.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].layer_name, "L");
        assert_eq!(records[0].owner_uid, 1000);
        assert_eq!(records[0].actual_present, ms(16));
        assert_eq!(records[0].jank, JankType::NONE);
        assert!(records[0].gpu_composition);
    }

    #[test]
    fn base_time_is_smallest_set_timestamp() {
        let sf = frame(
            PredictionState::Valid,
            TimelineItem::new(2_000_000, 8_000_000, 16_000_000),
        );
        sf.set_actual_queue_time(Timestamp(1_500_000));
        assert_eq!(sf.base_time(), Timestamp(1_500_000));
    }

    #[test]
    fn dump_renders_relative_timestamps() {
        let sf = frame(PredictionState::Valid, TimelineItem::new(0, 8_000_000, 16_000_000));
        sf.set_actual_queue_time(ms(7));
        sf.set_acquire_fence_time(ms(8));
        sf.set_present_state(PresentState::Presented, Timestamp::ZERO);
        sf.on_present(ms(16), JankType::NONE, VSYNC);

        let mut out = String::new();
        sf.dump(&mut out, "  ", Timestamp::ZERO);
        assert!(out.contains("layer=\"L\""), "got: {out}");
        assert!(out.contains("state=Presented"), "got: {out}");
        assert!(out.contains("present=16.00ms"), "got: {out}");
    }
}
