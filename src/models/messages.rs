use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::settings::TranscriptionConfig;
use crate::error::{Result, SessionError};

/// Messages sent by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMessageType {
    StartRecognition,
    AddAudio,
    SetRecognitionConfig,
    EndOfStream,
}

impl ClientMessageType {
    pub const ALL: [ClientMessageType; 4] = [
        ClientMessageType::StartRecognition,
        ClientMessageType::AddAudio,
        ClientMessageType::SetRecognitionConfig,
        ClientMessageType::EndOfStream,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClientMessageType::StartRecognition => "StartRecognition",
            ClientMessageType::AddAudio => "AddAudio",
            ClientMessageType::SetRecognitionConfig => "SetRecognitionConfig",
            ClientMessageType::EndOfStream => "EndOfStream",
        }
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerMessageType {
    RecognitionStarted,
    AudioAdded,
    AddPartialTranscript,
    AddTranscript,
    EndOfTranscript,
    Info,
    Warning,
    Error,
}

impl ServerMessageType {
    pub const ALL: [ServerMessageType; 8] = [
        ServerMessageType::RecognitionStarted,
        ServerMessageType::AudioAdded,
        ServerMessageType::AddPartialTranscript,
        ServerMessageType::AddTranscript,
        ServerMessageType::EndOfTranscript,
        ServerMessageType::Info,
        ServerMessageType::Warning,
        ServerMessageType::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServerMessageType::RecognitionStarted => "RecognitionStarted",
            ServerMessageType::AudioAdded => "AudioAdded",
            ServerMessageType::AddPartialTranscript => "AddPartialTranscript",
            ServerMessageType::AddTranscript => "AddTranscript",
            ServerMessageType::EndOfTranscript => "EndOfTranscript",
            ServerMessageType::Info => "Info",
            ServerMessageType::Warning => "Warning",
            ServerMessageType::Error => "Error",
        }
    }
}

fn unknown_kind<K: fmt::Display>(kind: &str, expected: &[K]) -> SessionError {
    SessionError::UnknownMessageKind {
        kind: kind.to_string(),
        expected: expected
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

impl fmt::Display for ClientMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ServerMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientMessageType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| unknown_kind(s, &Self::ALL))
    }
}

impl FromStr for ServerMessageType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| unknown_kind(s, &Self::ALL))
    }
}

/// JSON control messages sent by the client. Audio travels as raw binary frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "message")]
pub enum ControlMessage {
    StartRecognition {
        audio_format: Value,
        transcription_config: TranscriptionConfig,
    },
    SetRecognitionConfig {
        transcription_config: TranscriptionConfig,
    },
    EndOfStream {
        last_seq_no: u64,
    },
}

impl ControlMessage {
    pub fn kind(&self) -> ClientMessageType {
        match self {
            ControlMessage::StartRecognition { .. } => ClientMessageType::StartRecognition,
            ControlMessage::SetRecognitionConfig { .. } => ClientMessageType::SetRecognitionConfig,
            ControlMessage::EndOfStream { .. } => ClientMessageType::EndOfStream,
        }
    }
}

/// An outgoing message as seen by middleware.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Json(Value),
    Binary(Vec<u8>),
}

impl OutboundPayload {
    pub fn is_binary(&self) -> bool {
        matches!(self, OutboundPayload::Binary(_))
    }

    pub fn as_json_mut(&mut self) -> Option<&mut Value> {
        match self {
            OutboundPayload::Json(value) => Some(value),
            OutboundPayload::Binary(_) => None,
        }
    }
}

/// A message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerMessage {
    pub kind: ServerMessageType,
    /// The whole JSON object, discriminator included
    pub body: Value,
}

impl ServerMessage {
    /// Parse a text frame. An unrecognised `message` value is reported as
    /// [`SessionError::UnknownMessageKind`].
    pub fn parse(text: &str) -> Result<Self> {
        let body: Value = serde_json::from_str(text).map_err(|e| SessionError::Protocol {
            message: format!("invalid JSON from server: {}", e),
        })?;

        let kind = body
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Protocol {
                message: "server message has no `message` field".to_string(),
            })?
            .parse()?;

        Ok(Self { kind, body })
    }

    pub fn reason(&self) -> Option<&str> {
        self.body.get("reason").and_then(Value::as_str)
    }

    pub fn transcript(&self) -> Option<&str> {
        transcript_text(&self.body)
    }
}

/// Transcript text of an `AddTranscript` or `AddPartialTranscript` message.
pub fn transcript_text(message: &Value) -> Option<&str> {
    message.get("metadata")?.get("transcript")?.as_str()
}
