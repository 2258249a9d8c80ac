//! In-process monotonic position counter tagged with the epoch of the view
//! that created it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Configuration identifying which log instance is authorized to sequence
/// at a given epoch, and the position it should start from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SequencerConfig {
    pub epoch: u64,
    pub secret: String,
    pub init_position: u64,
}

/// Vends positions to appenders under a specific view epoch.
///
/// Created when a view naming this instance as active sequencer is
/// installed; discarded when superseded. Any backend write at a sequenced
/// position must carry an epoch `>=` this sequencer's epoch or the backend
/// will reject it with a stale-epoch signal.
#[derive(Debug)]
pub struct Sequencer {
    epoch: u64,
    position: AtomicU64,
}

impl Sequencer {
    pub fn new(epoch: u64, init_position: u64) -> Self {
        Self {
            epoch,
            position: AtomicU64::new(init_position),
        }
    }

    /// If `advance`, atomically return the current position and increment
    /// it; otherwise return the current position unchanged.
    ///
    /// Concurrent `check_tail(true)` calls are totally ordered by the
    /// atomic increment: the multiset of returned positions is exactly
    /// `{init_position, init_position + 1, ...}` with no duplicates or gaps.
    pub fn check_tail(&self, advance: bool) -> u64 {
        if advance {
            self.position.fetch_add(1, Ordering::SeqCst)
        } else {
            self.position.load(Ordering::SeqCst)
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
