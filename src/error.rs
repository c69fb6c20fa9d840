//! Error types for a transcription session.

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SessionError {
    // Connection establishment
    #[error("failed to connect to {url}: {message}")]
    Connection { url: String, message: String },

    #[error(
        "security handshake with {url} failed; the server may not support TLS, \
         try connecting with ssl mode `none`"
    )]
    ConnectionSecurityMismatch { url: String },

    #[error("connection closed by the server")]
    ConnectionClosed,

    #[error("transport error: {message}")]
    Transport { message: String },

    // Producer side
    #[error("no slot became available within {timeout:?}; the server is not acknowledging audio")]
    FlowControlTimeout { timeout: Duration },

    #[error("received more audio acknowledgements than chunks sent (capacity {capacity})")]
    FlowControlOverflow { capacity: usize },

    #[error("audio stream is empty")]
    EmptyAudioStream,

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    // Recognizer reported
    #[error("transcription error: {reason}")]
    Transcription { reason: String },

    #[error("session did not finish within {timeout:?}")]
    SessionTimeout { timeout: Duration },

    #[error("unknown message kind {kind:?}, expected \"all\" or one of: {expected}")]
    UnknownMessageKind { kind: String, expected: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    // User extensions
    #[error("event handler failed: {0:#}")]
    Handler(anyhow::Error),

    #[error("middleware failed: {0:#}")]
    Middleware(anyhow::Error),

    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session task failed: {message}")]
    Task { message: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connect { url, message } => SessionError::Connection { url, message },
            TransportError::SecurityMismatch { url, .. } => {
                SessionError::ConnectionSecurityMismatch { url }
            }
            TransportError::Closed => SessionError::ConnectionClosed,
            other => SessionError::Transport {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_map_to_session_taxonomy() {
        let err: SessionError = TransportError::SecurityMismatch {
            url: "wss://localhost:9000".to_string(),
            message: "connection reset".to_string(),
        }
        .into();
        assert!(matches!(err, SessionError::ConnectionSecurityMismatch { ref url } if url == "wss://localhost:9000"));

        let err: SessionError = TransportError::Closed.into();
        assert!(matches!(err, SessionError::ConnectionClosed));

        let err: SessionError = TransportError::Send {
            message: "broken pipe".to_string(),
        }
        .into();
        assert!(err.to_string().contains("broken pipe"));
    }

    #[test]
    fn test_transcription_error_display_carries_reason() {
        let err = SessionError::Transcription {
            reason: "bad audio format".to_string(),
        };
        assert_eq!(err.to_string(), "transcription error: bad audio format");
    }

    #[test]
    fn test_handler_error_display_includes_context() {
        let err = SessionError::Handler(anyhow::anyhow!("disk full").context("writing transcript"));
        let text = err.to_string();
        assert!(text.contains("writing transcript"));
        assert!(text.contains("disk full"));
    }
}
