use thiserror::Error;

/// Result type for coffee maker operations
pub type Result<T> = std::result::Result<T, SmarterError>;

/// Errors that can occur when interacting with Smarter appliances
#[derive(Error, Debug)]
pub enum SmarterError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation did not complete within its deadline
    #[error("operation timed out")]
    Timeout,

    /// Connection was closed by the device
    #[error("connection closed")]
    ConnectionClosed,

    /// No connection to the device
    #[error("not connected")]
    NotConnected,

    /// Connection is being torn down; the command was rejected
    #[error("connection is shutting down")]
    Disconnecting,

    /// Malformed or unexpected frame on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Device acknowledged a command with a result code outside the reply table
    #[error("unknown reply code {0:#04x}")]
    UnknownReply(u8),

    /// Subscription channel error
    #[error("channel error: {0}")]
    Channel(String),
}
