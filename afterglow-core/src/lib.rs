// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-timeline engine for display compositors.
//!
//! `afterglow_core` correlates three overlapping streams of timing data —
//! predictions minted by a vsync scheduler, actual timestamps collected from
//! app buffer submissions, and compositor wake/present timestamps resolved
//! via display fences — into one record per vsync. Each record is graded
//! on-time / early / late, diagnosed for jank, fanned out to trace and
//! timestats sinks, and retained in a bounded history for diagnostic dump.
//!
//! # Architecture
//!
//! The engine is passive: the compositor drives it in a fixed per-vsync
//! order and fences are observed, never waited on.
//!
//! ```text
//!   VsyncPredictor ──► TokenManager::generate_token() ──► token
//!                                                           │
//!   app buffer (token) ──► FrameTimeline::create_surface_frame()
//!                                                           │
//!   set_compositor_wakeup() ──► DisplayFrame (Open) ◄── add_surface_frame()*
//!                                      │
//!   set_compositor_present(fence) ──► AwaitingFence ──► pending FIFO
//!                                                           │
//!   fence signals ──► drain ──► Resolved ──► jank verdicts ──► sinks ──► history
//! ```
//!
//! **[`token`]** — Registry binding monotonically increasing tokens to
//! prediction tuples, retained for 120 ms.
//!
//! **[`surface`]** — Per-layer per-buffer [`SurfaceFrame`](surface::SurfaceFrame)
//! record: predicted vs actual timestamps, present disposition, per-frame
//! jank verdict.
//!
//! **[`display`]** — Per-vsync [`DisplayFrame`](display::DisplayFrame)
//! aggregate owning the compositor timeline and the composited surface
//! frames; drives per-surface verdicts at present resolution.
//!
//! **[`jank`]** — The jank bitmask and the pure classification functions.
//!
//! **[`timeline`]** — The [`FrameTimeline`](timeline::FrameTimeline) facade:
//! ingress API, pending-present FIFO, bounded history, dump.
//!
//! **[`timing`]** / **[`time`]** — Timestamp triples, metadata verdicts,
//! thresholds, and the nanosecond timestamp types.
//!
//! **[`fence`]** / **[`stats`]** / **[`trace`]** / **[`clock`]** — Seams to
//! the display fence primitive, the timestats collector, the trace
//! collector, and the wall clock.

pub mod clock;
pub mod display;
pub mod fence;
pub mod jank;
pub mod protocol;
pub mod stats;
pub mod surface;
pub mod time;
pub mod timeline;
pub mod timing;
pub mod token;
pub mod trace;
