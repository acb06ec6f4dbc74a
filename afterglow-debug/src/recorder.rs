// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`FrameTraceSink`] and encodes events into a
//! byte buffer as little-endian records. [`decode`] reads them back as an
//! iterator of [`RecordedEvent`]. Strings are length-prefixed; timestamps
//! are raw nanoseconds.

use std::sync::Mutex;

use afterglow_core::jank::JankType;
use afterglow_core::surface::PresentState;
use afterglow_core::time::{Duration, Timestamp};
use afterglow_core::timing::{FramePresentMetadata, TimelineItem};
use afterglow_core::trace::{DisplayFrameEvent, FrameTraceSink, SurfaceFrameEvent};

const TAG_DISPLAY_FRAME: u8 = 1;
const TAG_SURFACE_FRAME: u8 = 2;

/// A [`FrameTraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Mutex<Vec<u8>>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into_inner().unwrap()
    }
}

// -- encoding helpers -------------------------------------------------------

fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    write_u32(buf, len);
    buf.extend_from_slice(&bytes[..len as usize]);
}

fn write_timeline(buf: &mut Vec<u8>, item: TimelineItem) {
    write_i64(buf, item.start_time.nanos());
    write_i64(buf, item.end_time.nanos());
    write_i64(buf, item.present_time.nanos());
}

fn present_metadata_tag(m: FramePresentMetadata) -> u8 {
    match m {
        FramePresentMetadata::OnTimePresent => 0,
        FramePresentMetadata::LatePresent => 1,
        FramePresentMetadata::EarlyPresent => 2,
        FramePresentMetadata::UnknownPresent => 3,
    }
}

fn present_state_tag(s: PresentState) -> u8 {
    match s {
        PresentState::Presented => 0,
        PresentState::Dropped => 1,
        PresentState::Unknown => 2,
    }
}

impl FrameTraceSink for RecorderSink {
    fn on_display_frame(&self, event: &DisplayFrameEvent) {
        let mut buf = self.buf.lock().unwrap();
        buf.push(TAG_DISPLAY_FRAME);
        write_i64(&mut buf, event.token);
        write_i64(&mut buf, event.vsync_period.nanos());
        write_timeline(&mut buf, event.predictions);
        write_timeline(&mut buf, event.actuals);
        write_u32(&mut buf, event.jank.bits());
        buf.push(present_metadata_tag(event.present_metadata));
    }

    fn on_surface_frame(&self, event: &SurfaceFrameEvent) {
        let mut buf = self.buf.lock().unwrap();
        buf.push(TAG_SURFACE_FRAME);
        write_i64(&mut buf, event.display_token);
        write_i64(&mut buf, event.token);
        write_i32(&mut buf, event.owner_pid);
        write_u32(&mut buf, event.owner_uid);
        write_str(&mut buf, &event.layer_name);
        write_timeline(&mut buf, event.predictions);
        write_timeline(&mut buf, event.actuals);
        write_u32(&mut buf, event.jank.bits());
        buf.push(present_state_tag(event.present_state));
    }
}

// -- decoder ----------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`DisplayFrameEvent`].
    DisplayFrame(DisplayFrameEvent),
    /// A [`SurfaceFrameEvent`].
    SurfaceFrame(SurfaceFrameEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`]. Stops at the first malformed or unknown record.
#[must_use]
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_i32(&mut self) -> Option<i32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = i32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_i64(&mut self) -> Option<i64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = i64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_str(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        if self.remaining() < len {
            return None;
        }
        let s = String::from_utf8(self.data[self.pos..self.pos + len].to_vec()).ok()?;
        self.pos += len;
        Some(s)
    }

    fn read_timeline(&mut self) -> Option<TimelineItem> {
        Some(TimelineItem {
            start_time: Timestamp(self.read_i64()?),
            end_time: Timestamp(self.read_i64()?),
            present_time: Timestamp(self.read_i64()?),
        })
    }

    fn read_jank(&mut self) -> Option<JankType> {
        JankType::from_bits(self.read_u32()?)
    }

    fn read_present_metadata(&mut self) -> Option<FramePresentMetadata> {
        Some(match self.read_u8()? {
            0 => FramePresentMetadata::OnTimePresent,
            1 => FramePresentMetadata::LatePresent,
            2 => FramePresentMetadata::EarlyPresent,
            _ => FramePresentMetadata::UnknownPresent,
        })
    }

    fn read_present_state(&mut self) -> Option<PresentState> {
        Some(match self.read_u8()? {
            0 => PresentState::Presented,
            1 => PresentState::Dropped,
            _ => PresentState::Unknown,
        })
    }

    fn decode_display_frame(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::DisplayFrame(DisplayFrameEvent {
            token: self.read_i64()?,
            vsync_period: Duration::from_nanos(self.read_i64()?),
            predictions: self.read_timeline()?,
            actuals: self.read_timeline()?,
            jank: self.read_jank()?,
            present_metadata: self.read_present_metadata()?,
        }))
    }

    fn decode_surface_frame(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SurfaceFrame(SurfaceFrameEvent {
            display_token: self.read_i64()?,
            token: self.read_i64()?,
            owner_pid: self.read_i32()?,
            owner_uid: self.read_u32()?,
            layer_name: self.read_str()?,
            predictions: self.read_timeline()?,
            actuals: self.read_timeline()?,
            jank: self.read_jank()?,
            present_state: self.read_present_state()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_DISPLAY_FRAME => self.decode_display_frame(),
            TAG_SURFACE_FRAME => self.decode_surface_frame(),
            _ => None, // unknown tag → stop iteration
        }
    }
}
