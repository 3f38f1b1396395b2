//! Runtime configuration, read from TOML.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use mizu_servctl::raw::DEFAULT_SERVCTL_SYSCALL;
use mizu_service_ns::{ApplicationLanguage, LanguageCode};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MIZU_CONFIG";

/// Path used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mizu/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub system: SystemConfig,
    pub log: LogConfig,
    pub servctl: ServctlConfig,
    pub loader: LoaderConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    /// Language tag reported to applications, e.g. `"en-US"`.
    pub language: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            language: "en-US".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `env_logger` filter directives. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

/// Which kernel the service threads talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The host kernel module, through the servctl syscall.
    #[default]
    Host,
    /// The in-process kernel.
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServctlConfig {
    pub backend: Backend,
    pub syscall_nr: i64,
}

impl Default for ServctlConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Host,
            syscall_nr: DEFAULT_SERVCTL_SYSCALL as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// POSIX message queue name, with its leading `/`.
    pub queue: String,
    pub max_messages: u32,
    pub message_size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            queue: "/mizu_loader".into(),
            max_messages: 8,
            message_size: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    /// Composition rate. `0` disables the vsync timer.
    pub vsync_hz: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { vsync_hz: 60 }
    }
}

impl Config {
    /// Path named by `var` (the value of [`CONFIG_ENV`]), or the default path.
    pub fn resolve_path(var: Option<OsString>) -> PathBuf {
        match var {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Path [`Config::load`] reads.
    pub fn path() -> PathBuf {
        Self::resolve_path(std::env::var_os(CONFIG_ENV))
    }

    /// Reads `$MIZU_CONFIG`, or `/etc/mizu/config.toml` when it is unset.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::path())
    }

    /// Reads `path`. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text)?;
                log::debug!(target: "Config", "loaded {}", path.display());
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!(target: "Config", "{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            }),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if ApplicationLanguage::from_language_code(self.language_code()).is_none() {
            return Err(ConfigError::UnknownLanguage(self.system.language.clone()));
        }
        if !self.loader.queue.starts_with('/') || self.loader.queue[1..].contains('/') {
            return Err(ConfigError::InvalidQueueName(self.loader.queue.clone()));
        }
        Ok(())
    }

    #[inline]
    pub fn language_code(&self) -> LanguageCode {
        LanguageCode::from_tag(&self.system.language)
    }
}

/// Error returned while loading a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration")]
    Parse(#[from] toml::de::Error),
    #[error("unknown language {0:?}")]
    UnknownLanguage(String),
    #[error("invalid loader queue name {0:?}")]
    InvalidQueueName(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.servctl.syscall_nr, 0x1337);
        assert_eq!(config.loader.queue, "/mizu_loader");
        assert_eq!(config.display.vsync_hz, 60);
        assert_eq!(config.language_code(), LanguageCode::EN_US);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [system]
            language = "ja"

            [servctl]
            backend = "loopback"

            [display]
            vsync_hz = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.language_code(), LanguageCode::JA);
        assert_eq!(config.servctl.backend, Backend::Loopback);
        assert_eq!(config.servctl.syscall_nr, 0x1337);
        assert_eq!(config.display.vsync_hz, 30);
        assert_eq!(config.log, LogConfig::default());
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            Config::from_toml_str("[servctl]\nbackend = \"qemu\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[system]\nlanguage = \"tlh\"\n"),
            Err(ConfigError::UnknownLanguage(tag)) if tag == "tlh"
        ));
        assert!(matches!(
            Config::from_toml_str("[loader]\nqueue = \"mizu\"\n"),
            Err(ConfigError::InvalidQueueName(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[video]\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[log]\nfilter = \"debug,Kernel=trace\"").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.log.filter, "debug,Kernel=trace");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_directory_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load_from(dir.path()),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from(DEFAULT_CONFIG_PATH)
        );
        assert_eq!(
            Config::resolve_path(Some("".into())),
            PathBuf::from(DEFAULT_CONFIG_PATH)
        );
        assert_eq!(
            Config::resolve_path(Some("/tmp/mizu.toml".into())),
            PathBuf::from("/tmp/mizu.toml")
        );
    }
}
