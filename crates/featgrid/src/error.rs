//! Error types for ticket encoding and batch reassembly.
//!
//! Three failure families exist and all of them are surfaced to the immediate
//! caller:
//!
//! - [`EncodingError`]: the request could not be turned into a ticket (or a
//!   ticket/batch could not be built or decoded). Raised synchronously and
//!   never retried.
//! - [`TransportError`]: the response stream failed upstream. This crate only
//!   carries the failure through; retrying is the transport's business (see
//!   [`crate::RetryPolicy`]).
//! - [`ReassemblyError`]: the response stream did not line up with the
//!   request (truncated, overrun, missing or malformed columns). Fatal to the
//!   current consumption; no partial grid is ever returned.
//!
//! [`Error`] unifies the three for [`crate::consume`]. With the `tonic`
//! feature, [`Error`] converts into a `tonic::Status` and a `tonic::Status`
//! converts into a [`TransportError`].

use core::fmt;

/// Result alias defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type returned by [`crate::consume`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
}

/// The request (or a wire message) violates the closed schema.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// A window whose `start` is greater than its `end`.
    #[error("window `{name}` is inverted: start {start} > end {end}")]
    InvertedWindow { name: String, start: i64, end: i64 },

    /// A window bound that does not fit in an `i16`.
    #[error("window `{name}` bound {value} is outside [-32768, 32767]")]
    BoundOutOfRange { name: String, value: i64 },

    #[error("invalid entity id {id:?}: {reason}")]
    InvalidEntityId { id: String, reason: &'static str },

    #[error("invalid window name {name:?}: {reason}")]
    InvalidWindowName { name: String, reason: &'static str },

    /// Two windows in one request share a name; response columns are keyed by
    /// name so the second one could never be told apart.
    #[error("duplicate window name `{name}`")]
    DuplicateWindow { name: String },

    #[error("unsupported ticket version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A batch row was built with the wrong number of cells.
    #[error("row has {found} cells but the batch has {expected} columns")]
    CellCountMismatch { expected: usize, found: usize },

    #[error("batch exceeds the addressable row range")]
    RowOverflow,

    /// A column grew past what `u32` offsets can address.
    #[error("column `{name}` exceeds the addressable offset range")]
    ColumnOverflow { name: String },

    #[error("decode failed: {reason}")]
    Decode { reason: String },
}

impl From<prost::DecodeError> for EncodingError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }
}

/// Coarse classification of upstream failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransportCode {
    /// The service could not be reached.
    Unavailable,
    /// The stream was cut (cancelled, aborted, deadline).
    Interrupted,
    /// The service has no data for a requested id/window.
    NotFound,
    /// Any other failure reported by the service.
    Upstream,
}

impl fmt::Display for TransportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::NotFound => write!(f, "not found"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// A failure that originated in the transport or on the serving side.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("transport {code}: {message}")]
pub struct TransportError {
    pub code: TransportCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: TransportCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportCode::Unavailable, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(TransportCode::Interrupted, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportCode::NotFound, message)
    }
}

impl From<core::convert::Infallible> for TransportError {
    fn from(never: core::convert::Infallible) -> Self {
        match never {}
    }
}

/// The response stream does not reassemble into the requested grid.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("stream truncated: received {received} of {expected} rows")]
    Truncated { received: usize, expected: usize },

    #[error(
        "row overrun: batch of {batch_rows} rows at offset {offset} exceeds {expected} requested ids"
    )]
    RowOverrun {
        offset: usize,
        batch_rows: usize,
        expected: usize,
    },

    #[error("missing column `{name}`")]
    MissingColumn { name: String },

    #[error("malformed column `{name}`: {reason}")]
    MalformedColumn { name: String, reason: String },

    /// Only raised when [`crate::ReassemblyConfig::reject_empty_cells`] is set.
    #[error("empty cell for id `{id}` in window `{window}`")]
    EmptyCell { id: String, window: String },
}

#[cfg(feature = "tonic")]
impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Encoding(e) => tonic::Status::invalid_argument(e.to_string()),
            Error::Transport(e) => match e.code {
                TransportCode::Unavailable => tonic::Status::unavailable(e.message),
                TransportCode::Interrupted => tonic::Status::aborted(e.message),
                TransportCode::NotFound => tonic::Status::not_found(e.message),
                TransportCode::Upstream => tonic::Status::internal(e.message),
            },
            Error::Reassembly(e) => tonic::Status::data_loss(e.to_string()),
        }
    }
}

#[cfg(feature = "tonic")]
impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;

        let code = match status.code() {
            Code::Unavailable => TransportCode::Unavailable,
            Code::Cancelled | Code::Aborted | Code::DeadlineExceeded => TransportCode::Interrupted,
            Code::NotFound => TransportCode::NotFound,
            _ => TransportCode::Upstream,
        };
        Self::new(code, status.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembly_messages_name_the_failure() {
        let err = ReassemblyError::MissingColumn { name: "f1".into() };
        assert_eq!(err.to_string(), "missing column `f1`");

        let err = ReassemblyError::Truncated {
            received: 2,
            expected: 3,
        };
        assert_eq!(err.to_string(), "stream truncated: received 2 of 3 rows");
    }

    #[test]
    fn transport_error_is_wrapped_unchanged() {
        let err: Error = TransportError::unavailable("connection refused").into();
        assert_eq!(
            err,
            Error::Transport(TransportError::new(
                TransportCode::Unavailable,
                "connection refused"
            ))
        );
        assert_eq!(err.to_string(), "transport unavailable: connection refused");
    }

    #[cfg(feature = "tonic")]
    #[test]
    fn status_round_trip_keeps_the_code() {
        let status = tonic::Status::unavailable("down");
        let err = TransportError::from(status);
        assert_eq!(err.code, TransportCode::Unavailable);

        let status: tonic::Status = Error::from(err).into();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert_eq!(status.message(), "down");

        let status: tonic::Status = Error::from(ReassemblyError::MissingColumn {
            name: "f".into(),
        })
        .into();
        assert_eq!(status.code(), tonic::Code::DataLoss);
    }
}
