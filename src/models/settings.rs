use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Transport security used when connecting to the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// TLS with certificate verification
    #[default]
    Regular,
    /// TLS without certificate verification (self-signed appliances)
    Insecure,
    /// Plain TCP
    None,
}

/// Settings for the connection to the recognizer. Fixed for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// WebSocket URL, e.g. `wss://localhost:9000/v2`
    pub url: String,

    pub ssl_mode: SslMode,

    /// Maximum number of audio chunks sent but not yet acknowledged
    pub message_buffer_size: usize,

    /// How long to wait for a flow-control slot before giving up
    pub semaphore_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ssl_mode: SslMode::Regular,
            message_buffer_size: 512,
            semaphore_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    pub fn with_buffer_size(mut self, message_buffer_size: usize) -> Self {
        self.message_buffer_size = message_buffer_size;
        self
    }

    pub fn with_semaphore_timeout(mut self, timeout: Duration) -> Self {
        self.semaphore_timeout = timeout;
        self
    }
}

/// Recognition behaviour requested from the server.
///
/// Anything the server understands but this struct does not model can be
/// passed through `extra`; it is flattened into the JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_locale: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_vocab: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_partials: Option<bool>,

    /// Maximum delay in seconds before a final transcript is emitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diarization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_point: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TranscriptionConfig {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            output_locale: None,
            additional_vocab: None,
            enable_partials: None,
            max_delay: None,
            diarization: None,
            operating_point: None,
            extra: Map::new(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self::new("en")
    }
}

/// Format of the audio being streamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Raw sample encoding such as `pcm_s16le`. `None` sends the audio as a
    /// file and lets the server detect the container format.
    pub encoding: Option<String>,

    pub sample_rate: u32,

    /// Bytes read from the source per `AddAudio` message
    pub chunk_size: usize,
}

impl AudioSettings {
    pub fn raw(encoding: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            encoding: Some(encoding.into()),
            sample_rate,
            ..Self::default()
        }
    }

    /// Containerised audio (wav, mp3, ...)
    pub fn file() -> Self {
        Self {
            encoding: None,
            ..Self::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// The `audio_format` object sent in `StartRecognition`
    pub fn audio_format(&self) -> Value {
        match &self.encoding {
            Some(encoding) => json!({
                "type": "raw",
                "encoding": encoding,
                "sample_rate": self.sample_rate,
            }),
            None => json!({ "type": "file" }),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            encoding: Some("pcm_s16le".to_string()),
            sample_rate: 44_100,
            chunk_size: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_options_are_omitted() {
        let value = serde_json::to_value(TranscriptionConfig::new("de")).unwrap();
        assert_eq!(value, json!({ "language": "de" }));
    }

    #[test]
    fn test_extra_fields_are_flattened() {
        let mut config = TranscriptionConfig::new("en");
        config.enable_partials = Some(true);
        config.extra.insert("punctuation_overrides".into(), json!({ "sensitivity": 0.4 }));

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["enable_partials"], json!(true));
        assert_eq!(value["punctuation_overrides"]["sensitivity"], json!(0.4));

        let back: TranscriptionConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_audio_format_raw_and_file() {
        let raw = AudioSettings::raw("pcm_f32le", 16_000);
        assert_eq!(
            raw.audio_format(),
            json!({ "type": "raw", "encoding": "pcm_f32le", "sample_rate": 16000 })
        );
        assert_eq!(AudioSettings::file().audio_format(), json!({ "type": "file" }));
    }

    #[test]
    fn test_connection_settings_defaults() {
        let settings = ConnectionSettings::new("wss://localhost:9000/v2");
        assert_eq!(settings.ssl_mode, SslMode::Regular);
        assert_eq!(settings.message_buffer_size, 512);
        assert_eq!(settings.semaphore_timeout, Duration::from_secs(120));
    }
}
