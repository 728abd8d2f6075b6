//! Crate-level error types for command validation, event storage and
//! projection maintenance.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::ExpectedVersion;

/// Stable symbolic code attached to every caller-facing failure.
///
/// The string form (see [`ErrorCode::as_str`]) is part of the public
/// contract and must not change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The aggregate identifier is the nil UUID.
    InvalidIdentifier,
    /// A required string field is empty or whitespace-only.
    RequiredFieldMissing,
    /// A coordinate is NaN or infinite.
    InvalidCoordinate,
    /// A referenced foreign identifier is the nil UUID.
    ReferenceInvalid,
    /// A referenced foreign identifier is not in the supplied existence set.
    ReferenceNotFound,
    /// An external key (post code number, official id) already belongs to
    /// another entity.
    DuplicateKey,
    /// `create` was called on an aggregate that already has an identifier.
    AlreadyCreated,
    /// A mutation was attempted on an aggregate that was never created.
    NotInitialized,
    /// `delete` was called on an aggregate that is already deleted.
    AlreadyDeleted,
    /// An update was attempted on a deleted aggregate.
    CannotUpdateDeleted,
    /// The requested values equal the current values.
    NoChanges,
    /// The event log rejected an append because the stream moved on.
    ConcurrencyConflict,
}

impl ErrorCode {
    /// Returns the stable string form of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidIdentifier => "INVALID_IDENTIFIER",
            Self::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            Self::InvalidCoordinate => "INVALID_COORDINATE",
            Self::ReferenceInvalid => "REFERENCE_INVALID",
            Self::ReferenceNotFound => "REFERENCE_NOT_FOUND",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::AlreadyCreated => "ALREADY_CREATED",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyDeleted => "ALREADY_DELETED",
            Self::CannotUpdateDeleted => "CANNOT_UPDATE_DELETED",
            Self::NoChanges => "NO_CHANGES",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command rejected by aggregate validation.
///
/// Exactly one `CommandError` is reported per invocation, even when several
/// rules are violated. A rejected command never mutates the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("{code}: {message}")]
pub struct CommandError {
    /// Symbolic code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error returned by an [`EventStore`](crate::storage::EventStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stream length did not match the expected version.
    ///
    /// The caller should reload the aggregate and retry the command.
    #[error("concurrency conflict on stream {stream_id}: expected {expected}, found length {actual}")]
    ConcurrencyConflict {
        stream_id: Uuid,
        expected: ExpectedVersion,
        actual: u64,
    },

    /// An event could not be encoded or decoded.
    #[error("event codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A live subscriber fell behind the feed buffer and missed events.
    ///
    /// The subscriber must resubscribe from its last checkpoint.
    #[error("subscriber lagged behind the live feed by {skipped} events")]
    Lagged { skipped: u64 },

    /// Storage-layer I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned when a load → command → save cycle fails.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// Command rejected by aggregate logic.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Loading or persisting events failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExecuteError {
    /// The symbolic code of the failure, if it is a caller-facing outcome.
    ///
    /// Codec and I/O failures have no code; they are infrastructure faults.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Command(e) => Some(e.code),
            Self::Store(StoreError::ConcurrencyConflict { .. }) => {
                Some(ErrorCode::ConcurrencyConflict)
            }
            Self::Store(_) => None,
        }
    }
}

/// Error raised while applying a stored event to a projection.
///
/// Both variants are contract violations: the event log handed the
/// projection something the command side could never have produced.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// A tracked event's payload did not decode into its domain event type.
    #[error("failed to decode {event_type} at global position {global_position}: {source}")]
    Decode {
        event_type: String,
        global_position: u64,
        #[source]
        source: serde_json::Error,
    },

    /// Applying the event would leave a lookup table inconsistent.
    #[error("projection invariant violated: {0}")]
    Invariant(String),
}

/// Error that stops a projection from catching up or following the feed.
#[derive(Debug, thiserror::Error)]
pub enum CatchUpError {
    /// Subscribing to or reading from the event log failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The projection rejected an event. Its position was not advanced.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Reading or writing the checkpoint file failed.
    #[error("projection checkpoint I/O failed: {0}")]
    Checkpoint(#[from] std::io::Error),

    /// The live loop task panicked or was cancelled.
    #[error("live loop task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_display_includes_code_and_message() {
        let err = CommandError::new(ErrorCode::NoChanges, "nothing to update");
        assert_eq!(err.to_string(), "NO_CHANGES: nothing to update");
    }

    #[test]
    fn error_code_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::CannotUpdateDeleted).unwrap();
        assert_eq!(json, "\"CANNOT_UPDATE_DELETED\"");
        assert_eq!(
            ErrorCode::CannotUpdateDeleted.as_str(),
            "CANNOT_UPDATE_DELETED"
        );

        for code in [ErrorCode::InvalidCoordinate, ErrorCode::DuplicateKey] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn execute_error_maps_conflict_to_code() {
        let err = ExecuteError::from(StoreError::ConcurrencyConflict {
            stream_id: Uuid::nil(),
            expected: ExpectedVersion::Exact(1),
            actual: 2,
        });
        assert_eq!(err.code(), Some(ErrorCode::ConcurrencyConflict));
    }

    #[test]
    fn execute_error_domain_displays_inner() {
        let err = ExecuteError::from(CommandError::new(ErrorCode::AlreadyDeleted, "gone"));
        assert_eq!(err.to_string(), "ALREADY_DELETED: gone");
        assert_eq!(err.code(), Some(ErrorCode::AlreadyDeleted));
    }

    #[test]
    fn io_errors_have_no_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = ExecuteError::from(StoreError::from(io_err));
        assert!(err.to_string().contains("file missing"));
        assert_eq!(err.code(), None);
    }

    // Errors cross task boundaries in the live loop.
    const _: () = {
        #[allow(dead_code)]
        fn assert_send_sync<T: Send + Sync>() {}

        #[allow(dead_code)]
        fn check() {
            assert_send_sync::<ExecuteError>();
            assert_send_sync::<StoreError>();
            assert_send_sync::<ProjectionError>();
            assert_send_sync::<CatchUpError>();
        }
    };
}
