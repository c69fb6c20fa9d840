#![allow(dead_code)]

use rt_transcriber::transport::{PeerAcceptor, PeerConnection};
use rt_transcriber::{ChannelTransport, ConnectionSettings, Frame, TranscriptionClient};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const URL: &str = "ws://recognizer.test/v2";

/// What the fake recognizer saw and said, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Received(Frame),
    Sent(String),
}

/// How the fake recognizer behaves during one session.
#[derive(Debug, Clone)]
pub struct Script {
    /// Answer every audio chunk with `AudioAdded`
    pub ack_audio: bool,
    /// Reply to this audio chunk with an `Error` carrying the reason
    pub error_after_chunk: Option<(u64, String)>,
    /// Keep `RecognitionStarted` back this long after `StartRecognition`
    pub start_delay: Option<Duration>,
    /// Raw messages sent right after `RecognitionStarted`
    pub after_start: Vec<Value>,
    /// Final transcripts sent on `EndOfStream`, before `EndOfTranscript`
    pub transcripts: Vec<String>,
    /// Answer `EndOfStream` with `EndOfTranscript`
    pub end_of_transcript: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            ack_audio: true,
            error_after_chunk: None,
            start_delay: None,
            after_start: Vec::new(),
            transcripts: Vec::new(),
            end_of_transcript: true,
        }
    }
}

pub fn settings(buffer_size: usize) -> ConnectionSettings {
    ConnectionSettings::new(URL)
        .with_buffer_size(buffer_size)
        .with_semaphore_timeout(Duration::from_secs(5))
}

/// A client wired to an in-memory transport.
pub fn client(settings: ConnectionSettings) -> (TranscriptionClient, ChannelTransport, PeerAcceptor) {
    let (transport, acceptor) = ChannelTransport::new();
    let client = TranscriptionClient::with_transport(settings, transport.clone());
    (client, transport, acceptor)
}

/// Accept one connection and play `script` on it until the client closes.
pub fn spawn_recognizer(mut acceptor: PeerAcceptor, script: Script) -> JoinHandle<Vec<Event>> {
    tokio::spawn(async move {
        match acceptor.accept().await {
            Some(peer) => recognize(peer, script).await,
            None => Vec::new(),
        }
    })
}

async fn reply(peer: &PeerConnection, events: &mut Vec<Event>, message: Value) {
    let kind = message["message"].as_str().unwrap_or_default().to_string();
    // the client may already be gone; its side of the story is in the result
    let _ = peer.send_text(message.to_string()).await;
    events.push(Event::Sent(kind));
}

pub async fn recognize(mut peer: PeerConnection, script: Script) -> Vec<Event> {
    let mut events = Vec::new();
    let mut chunks = 0u64;

    while let Some(frame) = peer.recv().await {
        events.push(Event::Received(frame.clone()));
        match frame {
            Frame::Binary(_) => {
                chunks += 1;
                if script.ack_audio {
                    reply(&peer, &mut events, json!({ "message": "AudioAdded", "seq_no": chunks })).await;
                }
                if let Some((after, reason)) = &script.error_after_chunk {
                    if *after == chunks {
                        reply(
                            &peer,
                            &mut events,
                            json!({ "message": "Error", "type": "invalid_audio_type", "reason": reason }),
                        )
                        .await;
                    }
                }
            }
            Frame::Text(text) => {
                let message: Value = serde_json::from_str(&text).expect("client sent invalid JSON");
                match message["message"].as_str() {
                    Some("StartRecognition") => {
                        if let Some(delay) = script.start_delay {
                            let deadline = tokio::time::Instant::now() + delay;
                            while let Ok(Some(early)) = tokio::time::timeout_at(deadline, peer.recv()).await {
                                events.push(Event::Received(early));
                            }
                        }
                        reply(&peer, &mut events, json!({ "message": "RecognitionStarted", "id": "test-session" })).await;
                        for extra in &script.after_start {
                            reply(&peer, &mut events, extra.clone()).await;
                        }
                    }
                    Some("EndOfStream") => {
                        for transcript in &script.transcripts {
                            reply(
                                &peer,
                                &mut events,
                                json!({
                                    "message": "AddTranscript",
                                    "metadata": { "transcript": transcript, "start_time": 0.0, "end_time": 1.0 },
                                    "results": [],
                                }),
                            )
                            .await;
                        }
                        if script.end_of_transcript {
                            reply(&peer, &mut events, json!({ "message": "EndOfTranscript" })).await;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    events
}

/// JSON text frames the client sent, in order.
pub fn client_messages(events: &[Event]) -> Vec<Value> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Received(Frame::Text(text)) => serde_json::from_str(text).ok(),
            _ => None,
        })
        .collect()
}

/// Sizes of the audio chunks the client sent, in order.
pub fn audio_chunks(events: &[Event]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Received(Frame::Binary(data)) => Some(data.len()),
            _ => None,
        })
        .collect()
}

pub fn position(events: &[Event], predicate: impl Fn(&Event) -> bool) -> Option<usize> {
    events.iter().position(predicate)
}

pub fn is_audio(event: &Event) -> bool {
    matches!(event, Event::Received(Frame::Binary(_)))
}

pub fn is_client_message(event: &Event, kind: &str) -> bool {
    match event {
        Event::Received(Frame::Text(text)) => serde_json::from_str::<Value>(text)
            .map(|message| message["message"] == kind)
            .unwrap_or(false),
        _ => false,
    }
}

/// `len` bytes of fake PCM.
pub fn pcm(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
