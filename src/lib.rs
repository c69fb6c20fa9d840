pub mod audio;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod transport;

pub use audio::{AudioSource, SyncSource};
pub use crate::config::{ConfigError, FileConfig};
pub use error::{Result, SessionError};
pub use models::{
    AudioSettings, ClientMessageType, ConnectionSettings, OutboundPayload, ServerMessage,
    ServerMessageType, SslMode, TranscriptionConfig,
};
pub use session::{
    SessionControl, SessionPhase, SessionStats, TranscriptionClient, ALL_EVENTS,
};
pub use transport::{ChannelTransport, Frame, Transport, TransportError, WebSocketTransport};
