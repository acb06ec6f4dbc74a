// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Soft protocol-violation reporting.
//!
//! The engine sits in the compositor's critical path, so nothing here may
//! fail the caller: an out-of-protocol call is logged at warn, dropped, and
//! the invariants are kept. [`ProtocolViolation`] enumerates the ways the
//! ingress protocol can be broken.

use thiserror::Error;

/// An ingress call that broke the per-vsync protocol.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// `add_surface_frame` arrived with no display frame open.
    #[error("no display frame is open; surface frame for layer {layer:?} dropped")]
    NoOpenDisplayFrame {
        /// Layer the orphaned surface frame belongs to.
        layer: String,
    },
    /// A surface frame arrived after the display frame was finalized.
    #[error("display frame for token {token} already finalized; surface frame dropped")]
    FrameAlreadyFinalized {
        /// Token of the finalized display frame.
        token: i64,
    },
    /// `set_compositor_present` arrived with no display frame open.
    #[error("no display frame is open; compositor present at {nanos}ns dropped")]
    PresentWithoutWakeup {
        /// End time the dropped call carried.
        nanos: i64,
    },
    /// A timestamp was negative.
    #[error("negative timestamp {nanos}ns for {field}; call dropped")]
    NegativeTimestamp {
        /// Which timestamp field was being set.
        field: &'static str,
        /// The offending value.
        nanos: i64,
    },
    /// A present-state transition out of a terminal state.
    #[error("present state already {current}; transition to {requested} ignored")]
    PresentStateSettled {
        /// The state the frame is already in.
        current: &'static str,
        /// The state the caller asked for.
        requested: &'static str,
    },
    /// A frame was asked to resolve its present twice.
    #[error("present already resolved for token {token}; duplicate resolution ignored")]
    DuplicatePresent {
        /// Token of the frame.
        token: i64,
    },
}

/// Logs a violation at warn level. The offending call is dropped by the
/// caller; this never propagates.
pub(crate) fn report(violation: &ProtocolViolation) {
    tracing::warn!(%violation, "frame timeline protocol violation");
}
