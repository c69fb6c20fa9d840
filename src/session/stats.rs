use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a finished recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Identifier used in the session's log span
    pub session_id: Uuid,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Number of audio chunks sent (the `last_seq_no` of `EndOfStream`)
    pub chunks_sent: u64,

    /// Number of `AudioAdded` acknowledgements received
    pub chunks_acknowledged: u64,

    /// Number of messages received from the server
    pub messages_received: u64,

    /// Reasons of all `Warning` messages, in arrival order
    pub warnings: Vec<String>,
}
