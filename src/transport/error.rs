use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },
    #[error("security handshake with {url} failed: {message}")]
    SecurityMismatch { url: String, message: String },
    #[error("connection closed")]
    Closed,
    #[error("send failed: {message}")]
    Send { message: String },
    #[error("receive failed: {message}")]
    Receive { message: String },
}
