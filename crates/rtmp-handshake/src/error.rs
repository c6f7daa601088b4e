//! Handshake error type.

/// Errors produced while driving a handshake to completion.
///
/// A digest validation failure is terminal: the caller is expected to
/// close the connection. An RTMPE downgrade is not an error: the client
/// session falls back to plain RTMP and continues.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The peer's part-one digest did not match. On the client this is
    /// raised only after both digest schemes have been tried.
    #[error("part one digest validation failed")]
    PartOneValidation,
    /// The peer's part-two digest did not match.
    #[error("part two digest validation failed")]
    PartTwoValidation,
    /// A handshake operation was called outside the role's fixed sequence.
    #[error("handshake operation called out of order")]
    OutOfOrder,
}
