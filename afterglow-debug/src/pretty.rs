// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`FrameTraceSink`] and writes one line per
//! event to a [`Write`](std::io::Write) destination (default: stderr).
//! Timestamps are printed in microseconds.

use std::io::Write;
use std::sync::Mutex;

use afterglow_core::time::Timestamp;
use afterglow_core::trace::{DisplayFrameEvent, FrameTraceSink, SurfaceFrameEvent};

/// Writes human-readable trace lines to a [`Write`](std::io::Write)
/// destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: Mutex<W>,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consumes the sink and returns the underlying writer.
    pub fn into_writer(self) -> W {
        self.writer.into_inner().unwrap()
    }
}

fn us(t: Timestamp) -> f64 {
    t.nanos() as f64 / 1000.0
}

impl<W: Write + Send> FrameTraceSink for PrettyPrintSink<W> {
    fn on_display_frame(&self, e: &DisplayFrameEvent) {
        let mut writer = self.writer.lock().unwrap();
        let _ = writeln!(
            writer,
            "[display] token={} jank={:?} present={:.1}µs predicted={:.1}µs meta={:?}",
            e.token,
            e.jank,
            us(e.actuals.present_time),
            us(e.predictions.present_time),
            e.present_metadata,
        );
    }

    fn on_surface_frame(&self, e: &SurfaceFrameEvent) {
        let mut writer = self.writer.lock().unwrap();
        let _ = writeln!(
            writer,
            "[surface] layer={:?} owner={}/{} token={} display={} state={:?} jank={:?}",
            e.layer_name,
            e.owner_pid,
            e.owner_uid,
            e.token,
            e.display_token,
            e.present_state,
            e.jank,
        );
    }
}
