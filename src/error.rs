//! Error types for the striping and view-management core.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core.
///
/// `Conflict` is intentionally not a caller-visible failure: the
/// view-transition protocol absorbs it internally and resolves to success
/// once a newer view is installed (see `Striper::propose_view`).
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// An operation used an epoch older than the object's current seal.
    #[error("stale epoch on object {object}: caller epoch {epoch} is behind the current seal")]
    StaleEpoch { object: String, epoch: u64 },

    /// `ObjectMap::map` found no stripe covering the position.
    #[error("position {position} is not mapped by the current view")]
    PositionUnmapped { position: u64 },

    /// The object has been sealed and rejects further writes.
    #[error("object {object} is read-only at epoch {epoch}")]
    ReadOnlyEntry { object: String, epoch: u64 },

    /// A conditional write lost a race against a prior writer.
    #[error("position {position} on object {object} was already written")]
    AlreadyWritten { object: String, position: u64 },

    /// A read targeted a position nothing has ever written.
    #[error("position {position} on object {object} has not been written")]
    NotWritten { object: String, position: u64 },

    /// A read targeted a filled or trimmed position.
    #[error("position {position} on object {object} is invalid (filled or trimmed)")]
    InvalidEntry { object: String, position: u64 },

    /// A view proposal at `epoch` lost to a concurrent proposer. Internal
    /// to the view-transition protocol; never returned from a public
    /// `Striper` method.
    #[error("view proposal at epoch {epoch} was preempted")]
    Conflict { epoch: u64 },

    /// Returned to waiters when the Striper is torn down.
    #[error("striper is shutting down")]
    Shutdown,

    /// The named log already exists.
    #[error("log {name} already exists")]
    NameConflict { name: String },

    /// The named log does not exist or was deleted.
    #[error("log {name} not found")]
    LogNotFound { name: String },

    /// View bytes could not be decoded.
    #[error("failed to decode view at epoch {epoch}: {reason}")]
    ViewDecode { epoch: u64, reason: String },

    /// Any non-classified backend failure.
    #[error("backend error: {0}")]
    BackendError(String),

    /// Internal invariant violation; should never occur in a correct build.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the distinguished stale-epoch signal the Striper uses to
    /// drive a view refresh.
    pub fn is_stale_epoch(&self) -> bool {
        matches!(self, Error::StaleEpoch { .. })
    }

    /// True when the error means a position has no current mapping.
    pub fn is_position_unmapped(&self) -> bool {
        matches!(self, Error::PositionUnmapped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_epoch_is_classified() {
        let err = Error::StaleEpoch {
            object: "log.0.0".into(),
            epoch: 3,
        };
        assert!(err.is_stale_epoch());
        assert!(!err.is_position_unmapped());
    }

    #[test]
    fn position_unmapped_is_classified() {
        let err = Error::PositionUnmapped { position: 40 };
        assert!(err.is_position_unmapped());
        assert!(!err.is_stale_epoch());
    }

    #[test]
    fn conflict_displays_epoch() {
        let err = Error::Conflict { epoch: 5 };
        assert_eq!(err.to_string(), "view proposal at epoch 5 was preempted");
    }
}
