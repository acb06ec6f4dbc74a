// Copyright 2026 the Afterglow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Token registry binding vsync predictions to opaque tokens.
//!
//! The vsync predictor mints a token per prediction tuple; apps pass the
//! token back alongside their buffers, and the engine resolves it to the
//! original predictions when the frame is created. Predictions are only
//! useful near their vsync, so the registry retains them for a short window
//! ([`TokenManager::RETENTION`]) and expires them lazily.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::clock::Clock;
use crate::time::{Duration, Timestamp};
use crate::timing::TimelineItem;

/// Token value that never identifies a real prediction.
pub const INVALID_TOKEN: i64 = -1;

struct Record {
    inserted: Timestamp,
    predictions: TimelineItem,
}

struct Registry {
    /// Key-ordered by token; tokens are monotonic, so this is also
    /// insertion-time order, which keeps the sweep a prefix removal.
    records: BTreeMap<i64, Record>,
    next_token: i64,
}

/// Mints monotonically increasing tokens bound to prediction tuples and
/// serves lookups until expiry.
///
/// Both operations are safe to call from any thread; a single mutex guards
/// the registry, and lookups hold it only long enough to copy the triple out.
pub struct TokenManager {
    registry: Mutex<Registry>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager").finish_non_exhaustive()
    }
}

impl TokenManager {
    /// How long a prediction stays resolvable after insertion.
    pub const RETENTION: Duration = Duration::from_millis(120);

    /// Creates a registry reading "now" from the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Mutex::new(Registry {
                records: BTreeMap::new(),
                next_token: INVALID_TOKEN + 1,
            }),
            clock,
        }
    }

    /// Assigns the next token to `predictions`, sweeps expired entries, and
    /// returns the token.
    ///
    /// Tokens are strictly monotonically increasing and never reissued.
    pub fn generate_token(&self, predictions: TimelineItem) -> i64 {
        let now = self.clock.now();
        let mut registry = self.registry.lock().unwrap();
        Self::sweep(&mut registry, now);
        let token = registry.next_token;
        registry.next_token += 1;
        registry.records.insert(
            token,
            Record {
                inserted: now,
                predictions,
            },
        );
        token
    }

    /// Returns the stored predictions for `token` if they are still within
    /// the retention window. Does not sweep; expiration on the read path is
    /// purely a timestamp comparison.
    #[must_use]
    pub fn predictions_for_token(&self, token: i64) -> Option<TimelineItem> {
        let now = self.clock.now();
        let registry = self.registry.lock().unwrap();
        let record = registry.records.get(&token)?;
        if record.inserted + Self::RETENTION < now {
            return None;
        }
        Some(record.predictions)
    }

    fn sweep(registry: &mut Registry, now: Timestamp) {
        // Tokens are time-ordered, so expired entries form a prefix.
        let live = registry
            .records
            .iter()
            .find(|(_, r)| r.inserted + Self::RETENTION >= now)
            .map(|(token, _)| *token);
        match live {
            Some(first_live) => {
                registry.records = registry.records.split_off(&first_live);
            }
            None => registry.records.clear(),
        }
    }
}
