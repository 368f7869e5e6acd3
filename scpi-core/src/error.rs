use thiserror::Error;

/// Main error type for SCPI transport operations
///
/// The transport layer never panics across its boundary; every fallible
/// operation returns one of these variants so callers can decide whether
/// to retry. No operation in this layer retries on its own.
#[derive(Error, Debug)]
pub enum ScpiError {
    /// The TCP connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// An I/O error occurred while writing. The physical link has been
    /// closed as a side effect and the exchange is in an unknown state.
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    /// An I/O error occurred while reading. The physical link has been
    /// closed as a side effect and the exchange is in an unknown state.
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    /// No data arrived within the configured read timeout.
    ///
    /// Distinct from a legitimately empty reply: a reply consisting of
    /// just the line terminator decodes to an empty string, while a
    /// receive window with no bytes at all yields this error.
    #[error("read timed out")]
    ReadTimeout,

    /// The wait for the link turn exceeded the configured bound.
    ///
    /// Only produced when a turn timeout is configured; by default the
    /// turn wait is unbounded.
    #[error("timed out waiting for the link turn")]
    TurnTimeout,

    /// A block header could not be parsed as a definite-length block.
    #[error("malformed block framing: {0}")]
    Framing(String),

    /// The given handle is neither active nor pooled.
    #[error("unknown connection handle {0}")]
    UnknownHandle(u32),

    /// The physical link is not open.
    #[error("link is not connected")]
    NotConnected,
}

/// Result type alias for SCPI transport operations
pub type ScpiResult<T> = Result<T, ScpiError>;
