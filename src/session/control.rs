use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::state::SessionState;
use crate::models::TranscriptionConfig;

/// Lifecycle of the most recent session run by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Connecting,
    Running,
    Closing,
    Closed,
    Failed,
}

/// Steers the live session of a client from anywhere: another task, a signal
/// handler or one of the client's own event handlers.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    active: Arc<Mutex<Option<Arc<SessionState>>>>,
}

impl SessionControl {
    pub(crate) fn attach(&self, state: Arc<SessionState>) {
        *self.active.lock() = Some(state);
    }

    pub(crate) fn detach(&self) {
        self.active.lock().take();
    }

    fn session(&self) -> Option<Arc<SessionState>> {
        self.active.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Ask the producer to stop reading audio and send `EndOfStream`. The
    /// session still ends through the server's `EndOfTranscript`.
    pub fn stop(&self) {
        match self.session() {
            Some(state) => state.request_stop(),
            None => debug!("Stop requested with no active session"),
        }
    }

    /// Schedule a live configuration change. Returns whether a
    /// `SetRecognitionConfig` message will be sent.
    pub fn update_transcription_config(&self, config: TranscriptionConfig) -> bool {
        match self.session() {
            Some(state) => state.request_configuration_update(config),
            None => {
                debug!("Config update requested with no active session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_without_session_is_noop() {
        let control = SessionControl::default();
        control.stop();
        assert!(!control.update_transcription_config(TranscriptionConfig::new("fr")));
        assert!(!control.is_active());
    }

    #[test]
    fn test_control_reaches_attached_session() {
        let control = SessionControl::default();
        let state = Arc::new(SessionState::new(TranscriptionConfig::new("en")));
        control.clone().attach(Arc::clone(&state));

        assert!(control.update_transcription_config(TranscriptionConfig::new("fr")));
        control.stop();
        assert!(state.stop_requested());

        control.detach();
        assert!(!control.is_active());
    }
}
