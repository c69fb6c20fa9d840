//! User configuration file.
//!
//! Values from the file are the defaults; command-line flags are merged on top
//! with [`FileConfig::merge`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::{AudioSettings, ConnectionSettings, SslMode, TranscriptionConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0:?}")]
    NotFound(PathBuf),
    #[error("failed to read configuration file: {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: ::config::ConfigError,
    },
}

/// Settings that can come from the configuration file or the command line.
/// Every field is optional so that partial sources can be layered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub url: Option<String>,
    pub ssl_mode: Option<SslMode>,
    pub language: Option<String>,
    pub enable_partials: Option<bool>,
    pub max_delay: Option<f64>,
    pub operating_point: Option<String>,
    pub chunk_size: Option<usize>,
    pub sample_rate: Option<u32>,
    pub encoding: Option<String>,
    pub buffer_size: Option<usize>,
    pub semaphore_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// `<config dir>/rt-transcriber/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rt-transcriber").join("config.yaml"))
    }

    /// Load an explicitly named file, which must exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::read(path)
    }

    /// Load the file at [`default_path`](Self::default_path), or an empty
    /// configuration if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::read(&path),
            Some(path) => {
                debug!("Ignoring non-existent configuration file: {}", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format_error = |source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        };

        // the config crate reads a list or scalar root as an empty table
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let root: serde_yaml::Value =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        match root {
            serde_yaml::Value::Null => return Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => {}
            other => {
                return Err(format_error(::config::ConfigError::Message(format!(
                    "root must be a mapping, found {}",
                    yaml_kind(&other)
                ))))
            }
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(&text, ::config::FileFormat::Yaml))
            .build()
            .map_err(format_error)?;
        let config = settings.try_deserialize().map_err(format_error)?;

        debug!("Configuration loaded from file: {}", path.display());
        Ok(config)
    }

    /// Layer `update` over `self`. Set fields in `update` win; unset fields
    /// never clear a value from `self`.
    pub fn merge(&self, update: &FileConfig) -> FileConfig {
        fn pick<T: Clone>(orig: &Option<T>, update: &Option<T>) -> Option<T> {
            update.clone().or_else(|| orig.clone())
        }

        FileConfig {
            url: pick(&self.url, &update.url),
            ssl_mode: pick(&self.ssl_mode, &update.ssl_mode),
            language: pick(&self.language, &update.language),
            enable_partials: pick(&self.enable_partials, &update.enable_partials),
            max_delay: pick(&self.max_delay, &update.max_delay),
            operating_point: pick(&self.operating_point, &update.operating_point),
            chunk_size: pick(&self.chunk_size, &update.chunk_size),
            sample_rate: pick(&self.sample_rate, &update.sample_rate),
            encoding: pick(&self.encoding, &update.encoding),
            buffer_size: pick(&self.buffer_size, &update.buffer_size),
            semaphore_timeout_secs: pick(&self.semaphore_timeout_secs, &update.semaphore_timeout_secs),
        }
    }

    /// Connection settings, if a URL is configured.
    pub fn connection_settings(&self) -> Option<ConnectionSettings> {
        let mut settings = ConnectionSettings::new(self.url.clone()?);
        if let Some(ssl_mode) = self.ssl_mode {
            settings.ssl_mode = ssl_mode;
        }
        if let Some(buffer_size) = self.buffer_size {
            settings.message_buffer_size = buffer_size;
        }
        if let Some(secs) = self.semaphore_timeout_secs {
            settings.semaphore_timeout = Duration::from_secs(secs);
        }
        Some(settings)
    }

    pub fn transcription_config(&self) -> TranscriptionConfig {
        let mut config = TranscriptionConfig::new(self.language.as_deref().unwrap_or("en"));
        config.enable_partials = self.enable_partials;
        config.max_delay = self.max_delay;
        config.operating_point = self.operating_point.clone();
        config
    }

    /// Raw audio when an encoding is configured, a containerised file otherwise.
    pub fn audio_settings(&self) -> AudioSettings {
        let mut audio = match &self.encoding {
            Some(encoding) => AudioSettings::raw(encoding.clone(), self.sample_rate.unwrap_or(44_100)),
            None => AudioSettings::file(),
        };
        if let Some(chunk_size) = self.chunk_size {
            audio.chunk_size = chunk_size;
        }
        audio
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a list",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_url(url: Option<&str>) -> FileConfig {
        FileConfig {
            url: url.map(str::to_string),
            ..FileConfig::default()
        }
    }

    #[test]
    fn test_merge_with_empty_update_keeps_original() {
        let orig = with_url(Some("ws://a"));
        assert_eq!(orig.merge(&FileConfig::default()), orig);
    }

    #[test]
    fn test_merge_union() {
        let orig = with_url(Some("ws://a"));
        let update = FileConfig {
            language: Some("de".into()),
            ..FileConfig::default()
        };

        let merged = orig.merge(&update);
        assert_eq!(merged.url.as_deref(), Some("ws://a"));
        assert_eq!(merged.language.as_deref(), Some("de"));
        assert_eq!(orig, with_url(Some("ws://a")));
    }

    #[test]
    fn test_merge_overlapping_update_wins() {
        let merged = with_url(Some("ws://a")).merge(&with_url(Some("ws://b")));
        assert_eq!(merged.url.as_deref(), Some("ws://b"));
    }

    #[test]
    fn test_merge_unset_in_update_does_not_clear() {
        let merged = with_url(Some("ws://a")).merge(&with_url(None));
        assert_eq!(merged.url.as_deref(), Some("ws://a"));
    }

    #[test]
    fn test_merge_unset_in_original_is_filled() {
        let merged = with_url(None).merge(&with_url(Some("ws://b")));
        assert_eq!(merged.url.as_deref(), Some("ws://b"));
    }

    #[test]
    fn test_settings_derived_from_config() {
        let config = FileConfig {
            url: Some("wss://localhost:9000/v2".into()),
            ssl_mode: Some(SslMode::Insecure),
            buffer_size: Some(16),
            semaphore_timeout_secs: Some(3),
            language: Some("fr".into()),
            enable_partials: Some(true),
            encoding: Some("pcm_s16le".into()),
            sample_rate: Some(8000),
            chunk_size: Some(256),
            ..FileConfig::default()
        };

        let settings = config.connection_settings().unwrap();
        assert_eq!(settings.ssl_mode, SslMode::Insecure);
        assert_eq!(settings.message_buffer_size, 16);
        assert_eq!(settings.semaphore_timeout, Duration::from_secs(3));

        let transcription = config.transcription_config();
        assert_eq!(transcription.language, "fr");
        assert_eq!(transcription.enable_partials, Some(true));

        let audio = config.audio_settings();
        assert_eq!(audio.encoding.as_deref(), Some("pcm_s16le"));
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.chunk_size, 256);
    }

    #[test]
    fn test_no_url_means_no_connection_settings() {
        assert!(FileConfig::default().connection_settings().is_none());
        assert_eq!(FileConfig::default().audio_settings().encoding, None);
    }
}
