// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a
//! [`RecorderSink`](super::recorder::RecorderSink) and writes
//! [Chrome Trace Event Format][spec] JSON to the given writer, suitable for
//! loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
//!
//! Display frames become complete (`X`) events spanning wake → present on
//! one track; surface frames land on a per-process track keyed by owner pid,
//! linked to their display frame through the `display_token` arg.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use afterglow_core::timing::TimelineItem;

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as a Chrome Trace Event Format JSON array.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::DisplayFrame(e) => {
                let (ts, dur) = span_us(e.actuals);
                events.push(json!({
                    "ph": "X",
                    "name": "DisplayFrame",
                    "cat": "FrameTimeline",
                    "ts": ts,
                    "dur": dur,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "token": e.token,
                        "vsync_period_ns": e.vsync_period.nanos(),
                        "jank": format!("{:?}", e.jank),
                        "present": format!("{:?}", e.present_metadata),
                        "predicted_present_us": nanos_to_us(e.predictions.present_time.nanos()),
                    }
                }));
            }
            RecordedEvent::SurfaceFrame(e) => {
                let (ts, dur) = span_us(e.actuals);
                events.push(json!({
                    "ph": "X",
                    "name": e.layer_name,
                    "cat": "FrameTimeline",
                    "ts": ts,
                    "dur": dur,
                    "pid": e.owner_pid,
                    "tid": 0,
                    "args": {
                        "token": e.token,
                        "display_token": e.display_token,
                        "owner_uid": e.owner_uid,
                        "jank": format!("{:?}", e.jank),
                        "present_state": format!("{:?}", e.present_state),
                        "predicted_present_us": nanos_to_us(e.predictions.present_time.nanos()),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

/// Picks a `(ts, dur)` span in microseconds from an actuals triple: the
/// earliest set stamp to the present (or to the earliest stamp again when no
/// present was recorded, yielding a zero-length span).
fn span_us(actuals: TimelineItem) -> (f64, f64) {
    let start = actuals.base_time();
    let end = if actuals.present_time.is_set() {
        actuals.present_time
    } else {
        start
    };
    let ts = nanos_to_us(start.nanos());
    let dur = nanos_to_us(end.nanos().saturating_sub(start.nanos()));
    (ts, dur)
}

fn nanos_to_us(nanos: i64) -> f64 {
    nanos as f64 / 1000.0
}
