//! Error types for the streaming library.

use std::fmt;

/// Errors that can occur across the streaming stack.
///
/// Variants map to specific failure modes:
///
/// - **Transport**: [`Io`](Self::Io) — socket/network failures. A transport
///   failure terminates the task that owns the socket; nothing is retried.
/// - **Control channel**: [`Parse`](Self::Parse) — malformed request or
///   response text. Malformed messages are dropped without a reply.
/// - **Data channel**: [`TruncatedPacket`](Self::TruncatedPacket) — a
///   datagram shorter than the fixed media header. Dropped by the receiver.
/// - **Session**: [`SourceNotFound`](Self::SourceNotFound) — a SETUP named a
///   video file that cannot be opened (answered with 404).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a control-channel message.
    #[error("control message parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// Datagram shorter than the 12-byte media packet header.
    #[error("truncated media packet ({len} bytes, header needs 12)")]
    TruncatedPacket { len: usize },

    /// The video source named by a SETUP request could not be opened.
    #[error("video source not found: {0}")]
    SourceNotFound(String),

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of control-message parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no start line).
    EmptyMessage,
    /// Request line did not have the expected `Method Resource Version` format.
    InvalidRequestLine,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// The request verb is not one of the five supported methods.
    UnknownMethod(String),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::UnknownMethod(m) => write!(f, "unknown method: {m}"),
        }
    }
}

/// Convenience alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
