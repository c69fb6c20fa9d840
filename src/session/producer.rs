use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::flow::FlowController;
use super::registry::ExtensionRegistry;
use super::state::SessionState;
use crate::audio::AudioSource;
use crate::error::{Result, SessionError};
use crate::models::{ClientMessageType, ControlMessage, OutboundPayload};
use crate::transport::{Frame, FrameSender};

/// The sending half, shared between the producer and the session driver,
/// which sends `StartRecognition` and closes the connection.
pub(crate) type SharedSender = Arc<Mutex<Box<dyn FrameSender>>>;

/// Serialise a control message, pass it through middleware and send it.
pub(crate) async fn send_control(
    sender: &SharedSender,
    registry: &ExtensionRegistry,
    message: ControlMessage,
) -> Result<()> {
    let kind = message.kind();
    let payload = OutboundPayload::Json(serde_json::to_value(&message)?);
    send_payload(sender, registry, kind, payload).await
}

async fn send_payload(
    sender: &SharedSender,
    registry: &ExtensionRegistry,
    kind: ClientMessageType,
    mut payload: OutboundPayload,
) -> Result<()> {
    registry.apply_middleware(kind, &mut payload)?;

    let frame = match payload {
        OutboundPayload::Json(value) => {
            let text = serde_json::to_string(&value)?;
            debug!("Sending {}", text);
            Frame::Text(text)
        }
        OutboundPayload::Binary(bytes) => Frame::Binary(bytes),
    };

    sender.lock().await.send(frame).await?;
    Ok(())
}

/// Turns an audio source into `SetRecognitionConfig`, `AddAudio` and a final
/// `EndOfStream` message.
pub(crate) struct Producer<S> {
    pub(crate) source: S,
    pub(crate) chunk_size: usize,
    pub(crate) acquire_timeout: Duration,
    pub(crate) state: Arc<SessionState>,
    pub(crate) flow: Arc<FlowController>,
    pub(crate) registry: Arc<ExtensionRegistry>,
    pub(crate) sender: SharedSender,
}

impl<S: AudioSource> Producer<S> {
    /// Stream the whole source. Returns the sequence number sent in
    /// `EndOfStream`.
    pub(crate) async fn run(mut self) -> Result<u64> {
        self.state.wait_recognition_started().await;
        debug!("Recognition started, streaming audio in {} byte chunks", self.chunk_size);

        let mut chunks_read: u64 = 0;
        loop {
            let chunk = self.source.read(self.chunk_size).await?;
            if chunk.is_empty() {
                if chunks_read == 0 {
                    return Err(SessionError::EmptyAudioStream);
                }
                break;
            }
            chunks_read += 1;

            if self.state.stop_requested() {
                info!("Stop requested, ending audio stream");
                break;
            }

            if let Some(transcription_config) = self.state.take_pending_configuration() {
                info!("Sending updated transcription config");
                send_control(
                    &self.sender,
                    &self.registry,
                    ControlMessage::SetRecognitionConfig {
                        transcription_config,
                    },
                )
                .await?;
            }

            self.flow.acquire(self.acquire_timeout).await?;
            let seq_no = self.state.next_sequence();
            let len = chunk.len();
            send_payload(
                &self.sender,
                &self.registry,
                ClientMessageType::AddAudio,
                OutboundPayload::Binary(chunk),
            )
            .await?;
            debug!("Sent audio chunk {} ({} bytes)", seq_no, len);
        }

        let last_seq_no = self.state.sequence();
        send_control(
            &self.sender,
            &self.registry,
            ControlMessage::EndOfStream { last_seq_no },
        )
        .await?;
        info!("Audio stream finished after {} chunks", last_seq_no);

        Ok(last_seq_no)
    }
}
