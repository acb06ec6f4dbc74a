// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Records a live timeline and exports the trace.

use std::sync::Arc;

use afterglow_core::clock::ManualClock;
use afterglow_core::fence::ManualFence;
use afterglow_core::surface::PresentState;
use afterglow_core::time::{Duration, Timestamp};
use afterglow_core::timeline::{FrameTimeline, FrameTimelineConfig};
use afterglow_core::timing::TimelineItem;

use afterglow_debug::chrome;
use afterglow_debug::recorder::{RecordedEvent, RecorderSink, decode};

const VSYNC: Duration = Duration::from_nanos(16_666_666);

fn ms(v: i64) -> Timestamp {
    Timestamp(v * 1_000_000)
}

#[test]
fn recorded_vsync_round_trips_through_chrome_export() {
    let recorder = Arc::new(RecorderSink::new());
    let timeline = FrameTimeline::new(FrameTimelineConfig {
        clock: Arc::new(ManualClock::new(Timestamp(1))),
        trace: recorder.clone(),
        ..FrameTimelineConfig::default()
    });
    timeline.on_boot_finished();

    let display_token = timeline
        .token_manager()
        .generate_token(TimelineItem::new(0, 10_000_000, 16_000_000));
    let surface_token = timeline
        .token_manager()
        .generate_token(TimelineItem::new(0, 8_000_000, 16_000_000));

    timeline.set_compositor_wakeup(display_token, Timestamp(1), VSYNC);
    let sf = timeline.create_surface_frame(Some(surface_token), 1234, 1000, "status-bar", "sb#0");
    sf.set_actual_queue_time(ms(7));
    sf.set_acquire_fence_time(ms(8));
    sf.set_present_state(PresentState::Presented, Timestamp::ZERO);
    timeline.add_surface_frame(sf);
    timeline.set_compositor_present(ms(10), Some(Arc::new(ManualFence::signaled(ms(16)))));

    // One display event followed by its surface event.
    let bytes = recorder.bytes();
    let events: Vec<_> = decode(&bytes).collect();
    assert_eq!(events.len(), 2);
    let display_event = match &events[0] {
        RecordedEvent::DisplayFrame(e) => *e,
        other => panic!("expected DisplayFrame first, got {other:?}"),
    };
    match &events[1] {
        RecordedEvent::SurfaceFrame(e) => {
            assert_eq!(e.display_token, display_event.token);
            assert_eq!(e.layer_name, "status-bar");
            assert_eq!(e.actuals.present_time, ms(16));
        }
        other => panic!("expected SurfaceFrame second, got {other:?}"),
    }

    // And the recording exports to parseable Chrome trace JSON.
    let mut out = Vec::new();
    chrome::export(&bytes, &mut out).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[1]["name"], "status-bar");
}
