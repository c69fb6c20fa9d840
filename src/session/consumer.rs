use std::sync::Arc;
use tracing::{debug, info, warn};

use super::flow::FlowController;
use super::registry::ExtensionRegistry;
use super::state::SessionState;
use crate::error::{Result, SessionError};
use crate::models::{ServerMessage, ServerMessageType};
use crate::transport::{Frame, FrameReceiver};

/// How the consumer loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConsumerExit {
    /// The server sent `EndOfTranscript`; the session completed normally.
    EndOfTranscript,
    /// The session stopped running before `EndOfTranscript` arrived.
    NotRunning,
}

/// Receives server messages, hands them to the registered handlers, then
/// applies the built-in reaction for the kinds the session cares about.
pub(crate) struct Consumer {
    pub(crate) receiver: Box<dyn FrameReceiver>,
    pub(crate) state: Arc<SessionState>,
    pub(crate) flow: Arc<FlowController>,
    pub(crate) registry: Arc<ExtensionRegistry>,
}

impl Consumer {
    pub(crate) async fn run(mut self) -> Result<ConsumerExit> {
        while self.state.is_running() {
            let text = match self.receiver.recv().await? {
                Frame::Text(text) => text,
                Frame::Binary(data) => {
                    return Err(SessionError::Protocol {
                        message: format!("unexpected binary message of {} bytes", data.len()),
                    })
                }
            };
            debug!("Received {}", text);
            self.state.record_received();

            let message = match ServerMessage::parse(&text) {
                Ok(message) => message,
                Err(SessionError::UnknownMessageKind { kind, .. }) => {
                    warn!("Ignoring message of unknown kind {:?}", kind);
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.registry.dispatch(&message)?;

            match message.kind {
                ServerMessageType::RecognitionStarted => {
                    info!("Recognition started");
                    self.state.mark_recognition_started();
                }
                ServerMessageType::AudioAdded => {
                    self.flow.release()?;
                    self.state.record_acknowledged();
                }
                ServerMessageType::EndOfTranscript => {
                    info!("End of transcript");
                    return Ok(ConsumerExit::EndOfTranscript);
                }
                ServerMessageType::Warning => {
                    let reason = message.reason().unwrap_or("no reason given");
                    warn!("Server warning: {}", reason);
                    self.state.record_warning(reason);
                }
                ServerMessageType::Error => {
                    return Err(SessionError::Transcription {
                        reason: message.reason().unwrap_or("no reason given").to_string(),
                    });
                }
                ServerMessageType::AddPartialTranscript
                | ServerMessageType::AddTranscript
                | ServerMessageType::Info => {}
            }
        }

        Ok(ConsumerExit::NotRunning)
    }
}
