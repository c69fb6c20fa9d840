//! Settings and wire messages of the real-time transcription protocol.

mod messages;
mod settings;

pub use messages::{
    transcript_text, ClientMessageType, ControlMessage, OutboundPayload, ServerMessage,
    ServerMessageType,
};
pub use settings::{AudioSettings, ConnectionSettings, SslMode, TranscriptionConfig};
