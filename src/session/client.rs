use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::consumer::{Consumer, ConsumerExit};
use super::control::{SessionControl, SessionPhase};
use super::flow::FlowController;
use super::producer::{send_control, Producer, SharedSender};
use super::registry::ExtensionRegistry;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::audio::AudioSource;
use crate::error::{Result, SessionError};
use crate::models::{
    AudioSettings, ConnectionSettings, ControlMessage, OutboundPayload, TranscriptionConfig,
};
use crate::transport::{Connection, FrameReceiver, Transport, WebSocketTransport};

/// Overall limit for one session, set by `run_and_wait`.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    fn expired(&self) -> SessionError {
        warn!("Session timed out after {:?}", self.limit);
        SessionError::SessionTimeout { timeout: self.limit }
    }
}

/// Which of the two session tasks finished, and how.
enum TaskExit {
    Producer(Result<u64>),
    Consumer(Result<ConsumerExit>),
}

/// Client for real-time transcription sessions.
///
/// Register event handlers and middleware first, then call [`run`](Self::run)
/// (or [`run_and_wait`](Self::run_and_wait)) for each audio stream. Every run
/// gets fresh session state; handlers and middleware carry over.
pub struct TranscriptionClient {
    settings: ConnectionSettings,
    transport: Arc<dyn Transport>,
    registry: ExtensionRegistry,
    control: SessionControl,
    phase: Mutex<SessionPhase>,
}

impl TranscriptionClient {
    /// A client talking WebSocket to `settings.url`.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_transport(settings, WebSocketTransport)
    }

    pub fn with_transport<T: Transport + 'static>(settings: ConnectionSettings, transport: T) -> Self {
        Self {
            settings,
            transport: Arc::new(transport),
            registry: ExtensionRegistry::new(),
            control: SessionControl::default(),
            phase: Mutex::new(SessionPhase::Idle),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Handle messages of kind `event` from the server (`"all"` for every kind).
    /// Handlers get their own copy of each message.
    pub fn add_event_handler<F>(&mut self, event: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.add_event_handler(event, handler)
    }

    /// Rewrite outgoing messages of kind `event` (`"all"` for every kind).
    /// The flag passed to the middleware is true for binary audio.
    pub fn add_middleware<F>(&mut self, event: &str, middleware: F) -> Result<()>
    where
        F: Fn(&mut OutboundPayload, bool) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.add_middleware(event, middleware)
    }

    /// A handle for stopping or reconfiguring the running session.
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn update_transcription_config(&self, config: TranscriptionConfig) -> bool {
        self.control.update_transcription_config(config)
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock() = phase;
        debug!("Session phase: {:?}", phase);
    }

    /// Stream `source` to the server until it answers with `EndOfTranscript`.
    ///
    /// Any other way the session ends is returned as an error, after the
    /// connection has been closed.
    pub async fn run<S>(
        &self,
        source: S,
        transcription_config: TranscriptionConfig,
        audio_settings: AudioSettings,
    ) -> Result<SessionStats>
    where
        S: AudioSource + 'static,
    {
        self.run_until(source, transcription_config, audio_settings, None)
            .await
    }

    /// Blocking wrapper around [`run`](Self::run) with an overall deadline.
    ///
    /// Builds its own runtime, so it must not be called from async code.
    pub fn run_and_wait<S>(
        &self,
        source: S,
        transcription_config: TranscriptionConfig,
        audio_settings: AudioSettings,
        timeout: Option<Duration>,
    ) -> Result<SessionStats>
    where
        S: AudioSource + 'static,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        runtime.block_on(self.run_until(
            source,
            transcription_config,
            audio_settings,
            timeout.map(Deadline::after),
        ))
    }

    async fn run_until<S>(
        &self,
        source: S,
        transcription_config: TranscriptionConfig,
        audio_settings: AudioSettings,
        deadline: Option<Deadline>,
    ) -> Result<SessionStats>
    where
        S: AudioSource + 'static,
    {
        if audio_settings.chunk_size == 0 {
            return Err(SessionError::InvalidChunkSize);
        }

        let state = Arc::new(SessionState::new(transcription_config));
        let span = info_span!("session", id = %state.id());
        self.run_session(source, state, audio_settings, deadline)
            .instrument(span)
            .await
    }

    async fn run_session<S>(
        &self,
        source: S,
        state: Arc<SessionState>,
        audio_settings: AudioSettings,
        deadline: Option<Deadline>,
    ) -> Result<SessionStats>
    where
        S: AudioSource + 'static,
    {
        self.set_phase(SessionPhase::Connecting);
        let flow = Arc::new(FlowController::new(self.settings.message_buffer_size));
        let registry = Arc::new(self.registry.clone());

        let connect = self.transport.connect(&self.settings);
        let connected = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.at, connect).await {
                Ok(connected) => connected,
                Err(_) => {
                    self.set_phase(SessionPhase::Failed);
                    return Err(deadline.expired());
                }
            },
            None => connect.await,
        };
        let Connection { sender, receiver } = match connected {
            Ok(connection) => connection,
            Err(e) => {
                error!("Failed to connect to {}: {}", self.settings.url, e);
                self.set_phase(SessionPhase::Failed);
                return Err(e.into());
            }
        };
        let sender: SharedSender = Arc::new(tokio::sync::Mutex::new(sender));
        self.control.attach(Arc::clone(&state));

        let outcome = self
            .race(source, &state, flow, registry, &sender, receiver, &audio_settings, deadline)
            .await;

        self.set_phase(SessionPhase::Closing);
        self.control.detach();
        if let Err(e) = sender.lock().await.close().await {
            error!("Failed to close connection: {}", e);
        }
        state.reset();

        match outcome {
            Ok(()) => {
                self.set_phase(SessionPhase::Closed);
                let stats = state.stats();
                info!(
                    "Session finished: {} chunks sent, {} acknowledged, {:.1}s",
                    stats.chunks_sent, stats.chunks_acknowledged, stats.duration_secs
                );
                Ok(stats)
            }
            Err(e) => {
                self.set_phase(SessionPhase::Failed);
                error!("Session failed: {}", e);
                Err(e)
            }
        }
    }

    /// Send `StartRecognition`, then run producer and consumer until the
    /// consumer sees `EndOfTranscript`, either of them fails or the deadline
    /// passes.
    #[allow(clippy::too_many_arguments)]
    async fn race<S>(
        &self,
        source: S,
        state: &Arc<SessionState>,
        flow: Arc<FlowController>,
        registry: Arc<ExtensionRegistry>,
        sender: &SharedSender,
        receiver: Box<dyn FrameReceiver>,
        audio_settings: &AudioSettings,
        deadline: Option<Deadline>,
    ) -> Result<()>
    where
        S: AudioSource + 'static,
    {
        let start = ControlMessage::StartRecognition {
            audio_format: audio_settings.audio_format(),
            transcription_config: state.transcription_config(),
        };
        state.set_running(true);
        send_control(sender, &registry, start).await?;
        self.set_phase(SessionPhase::Running);
        info!("Recognition session running");

        let producer = Producer {
            source,
            chunk_size: audio_settings.chunk_size,
            acquire_timeout: self.settings.semaphore_timeout,
            state: Arc::clone(state),
            flow: Arc::clone(&flow),
            registry: Arc::clone(&registry),
            sender: Arc::clone(sender),
        };
        let consumer = Consumer {
            receiver,
            state: Arc::clone(state),
            flow,
            registry,
        };

        let mut tasks = JoinSet::new();
        tasks.spawn(async move { TaskExit::Producer(producer.run().await) }.in_current_span());
        tasks.spawn(async move { TaskExit::Consumer(consumer.run().await) }.in_current_span());

        let outcome = loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline.at, tasks.join_next()).await {
                    Ok(next) => next,
                    Err(_) => break Err(deadline.expired()),
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = next else {
                break Ok(());
            };
            match joined {
                Ok(TaskExit::Producer(Ok(last_seq_no))) => {
                    debug!("Producer done at sequence {}, waiting for transcript", last_seq_no);
                }
                Ok(TaskExit::Consumer(Ok(ConsumerExit::EndOfTranscript))) => break Ok(()),
                Ok(TaskExit::Consumer(Ok(ConsumerExit::NotRunning))) => {
                    debug!("Consumer stopped with the session");
                    break Ok(());
                }
                Ok(TaskExit::Producer(Err(e))) | Ok(TaskExit::Consumer(Err(e))) => break Err(e),
                Err(e) => {
                    break Err(SessionError::Task {
                        message: e.to_string(),
                    })
                }
            }
        };

        // cancel whichever task is still pending and wait for it to unwind
        tasks.shutdown().await;
        outcome
    }
}
