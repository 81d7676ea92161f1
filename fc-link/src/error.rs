use thiserror::Error;

/// Failure reported by a protocol client.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// No (complete) response arrived before the read deadline
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Framing lost: bad checksum, unexpected header or truncated frame
    #[error("protocol sync lost: {0}")]
    SyncLost(String),

    /// The flight controller answered but refused the request
    #[error("request rejected by flight controller: {0}")]
    Rejected(String),

    /// A response arrived but its payload could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Serial port failure
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether retrying the same request may succeed.
    ///
    /// Read timeouts and framing errors are typical while a port is still
    /// talking the other protocol or a board is booting.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProtocolError::Timeout(_) | ProtocolError::SyncLost(_))
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
