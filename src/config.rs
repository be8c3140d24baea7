//! Server configuration.
//!
//! Configuration is read from a plain `key = value` file:
//!
//! ```text
//! # server.conf
//! port = 8080
//! num_workers = 4
//! document_root = ./ssg_output
//! log_file = server.log
//! idle_timeout = 60
//! ```
//!
//! Lines starting with `#` and blank lines are skipped, keys and values are
//! trimmed, and unrecognized keys are ignored. A missing file is not an
//! error: the built-in defaults are used instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_DOCUMENT_ROOT: &str = "./ssg_output";
pub const DEFAULT_LOG_FILE: &str = "server.log";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_HANDOFF_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: invalid value {value:?} for `{key}`: {reason}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
        reason: String,
    },
}

/// Runtime configuration for the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TCP port bound on `0.0.0.0`.
    pub port: u16,

    /// Number of worker reactor threads.
    pub num_workers: usize,

    /// Directory static files are served from.
    pub document_root: PathBuf,

    /// Append-only log file.
    pub log_file: PathBuf,

    /// How long a connection may stay silent before it is closed.
    pub idle_timeout: Duration,

    /// Number of accepted connections that may queue per worker.
    pub handoff_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            num_workers: DEFAULT_WORKERS,
            document_root: PathBuf::from(DEFAULT_DOCUMENT_ROOT),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
        }
    }
}

impl Config {
    /// Loads configuration from `path`.
    ///
    /// Fails if the file exists but cannot be read or contains an invalid
    /// value. Use [`load_or_default`](Self::load_or_default) to fall back to
    /// defaults when the file is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&text)
    }

    /// Loads configuration from `path`, or returns the defaults if the file
    /// does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Read { path, source }) if source.kind() == io::ErrorKind::NotFound => {
                // Logging is not up yet; this is the one message that goes to stderr.
                eprintln!(
                    "config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parses configuration text on top of the defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            config.apply(index + 1, key.trim(), value.trim())?;
        }

        Ok(config)
    }

    fn apply(&mut self, line: usize, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "port" => self.port = parse_value(line, key, value)?,
            "num_workers" => {
                let workers: usize = parse_value(line, key, value)?;
                if workers == 0 {
                    return Err(invalid(line, key, value, "must be at least 1"));
                }
                self.num_workers = workers;
            }
            "document_root" => self.document_root = PathBuf::from(value),
            "log_file" => self.log_file = PathBuf::from(value),
            "idle_timeout" => {
                self.idle_timeout = Duration::from_secs(parse_value(line, key, value)?);
            }
            "handoff_capacity" => {
                let capacity: usize = parse_value(line, key, value)?;
                if capacity == 0 {
                    return Err(invalid(line, key, value, "must be at least 1"));
                }
                self.handoff_capacity = capacity;
            }
            _ => {}
        }

        Ok(())
    }
}

fn parse_value<T>(line: usize, key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| invalid(line, key, value, &e.to_string()))
}

fn invalid(line: usize, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        line,
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 8080);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.document_root, PathBuf::from("./ssg_output"));
        assert_eq!(config.log_file, PathBuf::from("server.log"));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_all_keys() {
        let text = "\
# comment
port = 9090

num_workers=2
document_root =  /srv/www
log_file = /var/log/ssgd.log
idle_timeout = 15
handoff_capacity = 32
";
        let config = Config::parse(text).unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.document_root, PathBuf::from("/srv/www"));
        assert_eq!(config.log_file, PathBuf::from("/var/log/ssgd.log"));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.handoff_capacity, 32);
    }

    #[test]
    fn test_unknown_keys_and_junk_lines_ignored() {
        let config = Config::parse("colour = blue\njust some words\nport = 81\n").unwrap();

        assert_eq!(config.port, 81);
        assert_eq!(config.num_workers, DEFAULT_WORKERS);
    }

    #[test]
    fn test_invalid_number_reports_line() {
        let err = Config::parse("port = 80\nnum_workers = lots\n").unwrap_err();

        match err {
            ConfigError::InvalidValue { line, key, .. } => {
                assert_eq!(line, 2);
                assert_eq!(key, "num_workers");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Config::parse("num_workers = 0").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.conf")).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 1234").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.port, 1234);
    }
}
