use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Connection, Frame, FrameReceiver, FrameSender, Transport, TransportError};
use crate::models::ConnectionSettings;

const CHANNEL_DEPTH: usize = 128;

/// In-process transport backed by tokio channels.
///
/// Every `connect` hands the client its half of a fresh channel pair and
/// queues the other half on the [`PeerAcceptor`], where a scripted recognizer
/// (or an embedding program) picks it up.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    peers: mpsc::UnboundedSender<PeerConnection>,
    connect_failure: Mutex<Option<TransportError>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> (Self, PeerAcceptor) {
        let (peers, incoming) = mpsc::unbounded_channel();
        let transport = Self {
            inner: Arc::new(Inner {
                peers,
                connect_failure: Mutex::new(None),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        };
        (transport, PeerAcceptor { incoming })
    }

    /// Make the next `connect` fail with `err`.
    pub fn fail_next_connect(&self, err: TransportError) {
        *self.inner.connect_failure.lock() = Some(err);
    }

    /// Number of connections established so far.
    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of times a client closed its sending half.
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, settings: &ConnectionSettings) -> Result<Connection, TransportError> {
        let failure = self.inner.connect_failure.lock().take();
        if let Some(err) = failure {
            return Err(err);
        }

        let (client_tx, peer_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (peer_tx, client_rx) = mpsc::channel(CHANNEL_DEPTH);

        self.inner
            .peers
            .send(PeerConnection {
                incoming: peer_rx,
                outgoing: peer_tx,
            })
            .map_err(|_| TransportError::Connect {
                url: settings.url.clone(),
                message: "no peer is accepting connections".to_string(),
            })?;

        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        debug!("Channel connection established for {}", settings.url);

        Ok(Connection {
            sender: Box::new(ChannelSender {
                tx: Some(client_tx),
                inner: Arc::clone(&self.inner),
            }),
            receiver: Box::new(ChannelReceiver { rx: client_rx }),
        })
    }
}

/// Receives the peer side of every connection made through a [`ChannelTransport`].
#[derive(Debug)]
pub struct PeerAcceptor {
    incoming: mpsc::UnboundedReceiver<PeerConnection>,
}

impl PeerAcceptor {
    pub async fn accept(&mut self) -> Option<PeerConnection> {
        self.incoming.recv().await
    }
}

/// The remote end of a channel connection.
#[derive(Debug)]
pub struct PeerConnection {
    incoming: mpsc::Receiver<Frame>,
    outgoing: mpsc::Sender<Frame>,
}

impl PeerConnection {
    /// Next frame sent by the client, or `None` once the client has closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.send(Frame::Text(text.into())).await
    }
}

struct ChannelSender {
    tx: Option<mpsc::Sender<Frame>>,
    inner: Arc<Inner>,
}

#[async_trait]
impl FrameSender for ChannelSender {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.tx.take().is_some() {
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct ChannelReceiver {
    rx: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut acceptor) = ChannelTransport::new();
        let mut conn = transport
            .connect(&ConnectionSettings::new("ws://in-memory"))
            .await
            .unwrap();
        let mut peer = acceptor.accept().await.unwrap();

        conn.sender.send(Frame::Binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Binary(vec![1, 2, 3])));

        peer.send_text("{\"message\":\"Info\"}").await.unwrap();
        assert_eq!(
            conn.receiver.recv().await.unwrap(),
            Frame::Text("{\"message\":\"Info\"}".to_string())
        );
    }

    #[tokio::test]
    async fn test_close_is_counted_once_and_seen_by_peer() {
        let (transport, mut acceptor) = ChannelTransport::new();
        let mut conn = transport
            .connect(&ConnectionSettings::new("ws://in-memory"))
            .await
            .unwrap();
        let mut peer = acceptor.accept().await.unwrap();

        conn.sender.close().await.unwrap();
        conn.sender.close().await.unwrap();

        assert_eq!(transport.close_count(), 1);
        assert_eq!(peer.recv().await, None);
        assert!(matches!(
            conn.sender.send(Frame::Text("late".into())).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_injected_connect_failure_is_returned_once() {
        let (transport, _acceptor) = ChannelTransport::new();
        transport.fail_next_connect(TransportError::Connect {
            url: "ws://in-memory".into(),
            message: "refused".into(),
        });

        let settings = ConnectionSettings::new("ws://in-memory");
        assert!(transport.connect(&settings).await.is_err());
        assert!(transport.connect(&settings).await.is_ok());
        assert_eq!(transport.connect_count(), 1);
    }
}
