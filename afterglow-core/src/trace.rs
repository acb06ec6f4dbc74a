// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trace events emitted at present resolution.
//!
//! Every resolved display frame produces one [`DisplayFrameEvent`] plus one
//! [`SurfaceFrameEvent`] per contained surface frame. Surface events point at
//! their parent by token only — the trace consumer stitches frames back
//! together on its side, and no pointer ever crosses the seam.
//!
//! [`FrameTraceSink`] is the collector contract. All methods default to
//! no-ops, so a sink only implements the events it consumes. Emission is
//! gated behind the facade's one-shot data-source registration
//! (`on_boot_finished`), which keeps process-wide collectors out of unit
//! tests.

use crate::jank::JankType;
use crate::surface::PresentState;
use crate::time::Duration;
use crate::timing::{FramePresentMetadata, TimelineItem};

/// Name under which the engine registers its trace data source.
pub const FRAME_TIMELINE_DATA_SOURCE: &str = "compositor.frametimeline";

/// Emitted once per resolved display frame.
#[derive(Clone, Copy, Debug)]
pub struct DisplayFrameEvent {
    /// Token of the compositor-side prediction this frame ran against.
    pub token: i64,
    /// Vsync period in effect during the frame.
    pub vsync_period: Duration,
    /// Predicted `(start, end, present)` triple.
    pub predictions: TimelineItem,
    /// Measured `(start, end, present)` triple.
    pub actuals: TimelineItem,
    /// Final jank verdict.
    pub jank: JankType,
    /// How the actual present compared to the prediction.
    pub present_metadata: FramePresentMetadata,
}

/// Emitted once per surface frame when its display frame resolves.
#[derive(Clone, Debug)]
pub struct SurfaceFrameEvent {
    /// Token of the owning display frame, for stitching on the consumer side.
    pub display_token: i64,
    /// Token of the app-side prediction, or the invalid sentinel.
    pub token: i64,
    /// Pid of the process that owns the layer.
    pub owner_pid: i32,
    /// Uid of the process that owns the layer.
    pub owner_uid: u32,
    /// Layer the buffer belongs to.
    pub layer_name: String,
    /// Predicted `(start, end, present)` triple.
    pub predictions: TimelineItem,
    /// Measured `(start, end, present)` triple.
    pub actuals: TimelineItem,
    /// Final jank verdict, or [`JankType::UNKNOWN`] if never classified.
    pub jank: JankType,
    /// Whether the buffer was presented or dropped.
    pub present_state: PresentState,
}

/// Receives frame-timeline trace events.
///
/// All methods have default no-op implementations.
pub trait FrameTraceSink: Send + Sync {
    /// Called once per resolved display frame.
    fn on_display_frame(&self, event: &DisplayFrameEvent) {
        _ = event;
    }

    /// Called once per surface frame, after its display frame's event.
    fn on_surface_frame(&self, event: &SurfaceFrameEvent) {
        _ = event;
    }
}

/// A [`FrameTraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTraceSink;

impl FrameTraceSink for NoopTraceSink {}
