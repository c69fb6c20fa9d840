//! Message-oriented full-duplex transports.
//!
//! A [`Transport`] establishes a [`Connection`], which is split into a sending
//! half used only by the audio producer and a receiving half used only by the
//! message consumer.

mod channel;
mod error;
mod websocket;

use async_trait::async_trait;

use crate::models::ConnectionSettings;

pub use channel::{ChannelTransport, PeerAcceptor, PeerConnection};
pub use error::TransportError;
pub use websocket::WebSocketTransport;

/// A single message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[async_trait]
pub trait FrameSender: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the connection. Closing an already closed connection is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait FrameReceiver: Send {
    /// Wait for the next frame, failing with [`TransportError::Closed`] once the
    /// peer has gone away.
    async fn recv(&mut self) -> Result<Frame, TransportError>;
}

/// An established connection, split by direction.
pub struct Connection {
    pub sender: Box<dyn FrameSender>,
    pub receiver: Box<dyn FrameReceiver>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Connection, TransportError>;
}
