use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

use super::stats::SessionStats;
use crate::models::TranscriptionConfig;

/// Mutable state of one recognition session. Created per `run` and dropped
/// after teardown.
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    started_at: DateTime<Utc>,

    /// Number of audio chunks handed to the transport
    seq_no: AtomicU64,

    /// One-way latch, set on `RecognitionStarted`
    recognition_started: watch::Sender<bool>,

    stop_requested: AtomicBool,
    running: AtomicBool,

    config: Mutex<ConfigSlot>,

    acknowledged: AtomicU64,
    received: AtomicU64,
    warnings: Mutex<Vec<String>>,
}

#[derive(Debug)]
struct ConfigSlot {
    current: TranscriptionConfig,
    needs_update: bool,
}

impl SessionState {
    pub fn new(config: TranscriptionConfig) -> Self {
        let (recognition_started, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            seq_no: AtomicU64::new(0),
            recognition_started,
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            config: Mutex::new(ConfigSlot {
                current: config,
                needs_update: false,
            }),
            acknowledged: AtomicU64::new(0),
            received: AtomicU64::new(0),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcription_config(&self) -> TranscriptionConfig {
        self.config.lock().current.clone()
    }

    /// Schedule `new_config` to be sent before the next audio chunk.
    /// Returns false (and schedules nothing) when it equals the current config.
    pub fn request_configuration_update(&self, new_config: TranscriptionConfig) -> bool {
        let mut slot = self.config.lock();
        if slot.current == new_config {
            return false;
        }
        slot.current = new_config;
        slot.needs_update = true;
        true
    }

    /// The config to send, if an update is pending. Clears the pending flag.
    pub(crate) fn take_pending_configuration(&self) -> Option<TranscriptionConfig> {
        let mut slot = self.config.lock();
        if !slot.needs_update {
            return None;
        }
        slot.needs_update = false;
        Some(slot.current.clone())
    }

    pub fn mark_recognition_started(&self) {
        self.recognition_started.send_if_modified(|started| !std::mem::replace(started, true));
    }

    pub fn recognition_started(&self) -> bool {
        *self.recognition_started.borrow()
    }

    pub async fn wait_recognition_started(&self) {
        let mut rx = self.recognition_started.subscribe();
        // the sender lives as long as `self`, so the wait cannot fail
        let _ = rx.wait_for(|started| *started).await;
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Increment the sequence counter and return the new value.
    pub fn next_sequence(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sequence(&self) -> u64 {
        self.seq_no.load(Ordering::SeqCst)
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_warning(&self, reason: &str) {
        self.warnings.lock().push(reason.to_string());
    }

    /// Clear the lifecycle flags at teardown.
    pub(crate) fn reset(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.id,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_sent: self.sequence(),
            chunks_acknowledged: self.acknowledged.load(Ordering::SeqCst),
            messages_received: self.received.load(Ordering::SeqCst),
            warnings: self.warnings.lock().clone(),
        }
    }
}
