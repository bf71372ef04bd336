//! Server Configuration
//!
//! Startup flags are parsed once into a [`ServerConfig`]. After that the
//! configuration is read-only: the server reads the typed fields, and
//! `CONFIG GET` reads the string map.
//!
//! | key                 | flag                  | default                  |
//! |---------------------|-----------------------|--------------------------|
//! | `dir`               | `--dir`               | `/tmp/snapkv`            |
//! | `dbfile`            | `--dbfile`            | `dump-<unix-seconds>.rdb`|
//! | `dbPath`            | derived               | `<dir>/<dbfile>`         |
//! | `port`              | `--port`, `-p`        | `6769`                   |
//! | `host`              | `--host`              | `127.0.0.1`              |
//! | `snapshot-interval` | `--snapshot-interval` | `86400` seconds          |
//! | `snapshot-delay`    | `--snapshot-delay`    | `0` seconds              |

use crate::persistence::SchedulerConfig;
use crate::storage::to_epoch_secs;
use clap::Parser;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// The default snapshot directory
pub const DEFAULT_DIR: &str = "/tmp/snapkv";

/// The default port snapkv listens on
pub const DEFAULT_PORT: u16 = 6769;

/// The default host snapkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default time between periodic snapshots (24 hours)
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Errors produced while reading startup arguments.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unknown flag, missing value, unparsable number, or a help/version request
    #[error("{0}")]
    Cli(#[from] clap::Error),

    /// The snapshot period must be positive
    #[error("snapshot interval must be at least one second")]
    ZeroInterval,

    /// The snapshot file name must stay inside `dir`
    #[error("dbfile must be a relative path, got {0:?}")]
    AbsoluteDbFile(String),
}

/// Command-line flags.
#[derive(Debug, Parser)]
#[command(
    name = "snapkv",
    version,
    about = "A single-node, in-memory key-value server with binary snapshots"
)]
pub struct Cli {
    /// Directory holding the snapshot file
    #[arg(long, default_value = DEFAULT_DIR)]
    pub dir: String,

    /// Snapshot file name inside --dir
    #[arg(long, visible_alias = "dbfilename")]
    pub dbfile: Option<String>,

    /// Port to listen on
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Seconds between periodic snapshots
    #[arg(long, default_value_t = DEFAULT_SNAPSHOT_INTERVAL_SECS)]
    pub snapshot_interval: u64,

    /// Seconds before the first periodic snapshot
    #[arg(long, default_value_t = 0)]
    pub snapshot_delay: u64,
}

/// The server's startup configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the snapshot file
    pub dir: String,
    /// Snapshot file name
    pub dbfile: String,
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Periodic snapshot timing
    pub snapshot: SchedulerConfig,
    /// String view served by CONFIG GET
    values: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::build(Cli {
            dir: DEFAULT_DIR.to_string(),
            dbfile: None,
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            snapshot_delay: 0,
        })
    }
}

impl ServerConfig {
    /// Parses configuration from command-line arguments.
    ///
    /// The first item is the program name, as with `std::env::args_os()`.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;
        Self::from_cli(cli)
    }

    /// Builds the configuration from parsed flags.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.snapshot_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if let Some(dbfile) = cli.dbfile.as_deref().filter(|f| Path::new(f).is_absolute()) {
            return Err(ConfigError::AbsoluteDbFile(dbfile.to_string()));
        }
        Ok(Self::build(cli))
    }

    fn build(cli: Cli) -> Self {
        let dbfile = cli
            .dbfile
            .unwrap_or_else(|| format!("dump-{}.rdb", to_epoch_secs(SystemTime::now())));

        let snapshot = SchedulerConfig {
            initial_delay: Duration::from_secs(cli.snapshot_delay),
            period: Duration::from_secs(cli.snapshot_interval),
        };

        let mut config = Self {
            dir: cli.dir,
            dbfile,
            host: cli.host,
            port: cli.port,
            snapshot,
            values: BTreeMap::new(),
        };

        let db_path = config.db_path().display().to_string();
        config.values = BTreeMap::from([
            ("dir".to_string(), config.dir.clone()),
            ("dbfile".to_string(), config.dbfile.clone()),
            ("dbfilename".to_string(), config.dbfile.clone()),
            ("dbPath".to_string(), db_path),
            ("port".to_string(), config.port.to_string()),
            ("host".to_string(), config.host.clone()),
            ("snapshot-interval".to_string(), cli.snapshot_interval.to_string()),
            ("snapshot-delay".to_string(), cli.snapshot_delay.to_string()),
        ]);
        config
    }

    /// Looks up a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the snapshot file path: `dir` joined with `dbfile`.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.dbfile)
    }

    /// Returns the bind address as a string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_args(["snapkv"]).unwrap();

        assert_eq!(config.get("dir"), Some(DEFAULT_DIR));
        assert_eq!(config.get("port"), Some("6769"));
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.dbfile.starts_with("dump-"));
        assert!(config.dbfile.ends_with(".rdb"));
        assert_eq!(config.snapshot.period, Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS));
        assert_eq!(config.snapshot.initial_delay, Duration::ZERO);
        assert_eq!(config.bind_address(), "127.0.0.1:6769");
    }

    #[test]
    fn test_dir_and_derived_path() {
        let config =
            ServerConfig::from_args(["snapkv", "--dir", "/tmp/x", "--dbfile", "dump.rdb"]).unwrap();

        assert_eq!(config.get("dir"), Some("/tmp/x"));
        assert_eq!(config.get("dbfile"), Some("dump.rdb"));
        assert_eq!(config.get("dbPath"), Some("/tmp/x/dump.rdb"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/x/dump.rdb"));
    }

    #[test]
    fn test_dbfilename_alias_and_port() {
        let config =
            ServerConfig::from_args(["snapkv", "--dbfilename", "a.rdb", "-p", "7000"]).unwrap();

        assert_eq!(config.get("dbfilename"), Some("a.rdb"));
        assert_eq!(config.get("port"), Some("7000"));
    }

    #[test]
    fn test_snapshot_timing() {
        let config = ServerConfig::from_args([
            "snapkv",
            "--snapshot-interval",
            "5",
            "--snapshot-delay",
            "2",
        ])
        .unwrap();

        assert_eq!(config.snapshot.period, Duration::from_secs(5));
        assert_eq!(config.snapshot.initial_delay, Duration::from_secs(2));
        assert_eq!(config.get("snapshot-interval"), Some("5"));
    }

    #[test]
    fn test_malformed_arguments() {
        assert!(ServerConfig::from_args(["snapkv", "--dir"]).is_err());
        assert!(ServerConfig::from_args(["snapkv", "--port", "notaport"]).is_err());
        assert!(ServerConfig::from_args(["snapkv", "--bogus"]).is_err());
        assert!(matches!(
            ServerConfig::from_args(["snapkv", "--snapshot-interval", "0"]),
            Err(ConfigError::ZeroInterval)
        ));
    }

    #[test]
    fn test_absolute_dbfile_rejected() {
        let result = ServerConfig::from_args(["snapkv", "--dir", "/data", "--dbfile", "/etc/dump.rdb"]);
        assert!(matches!(result, Err(ConfigError::AbsoluteDbFile(ref f)) if f == "/etc/dump.rdb"));

        let config =
            ServerConfig::from_args(["snapkv", "--dir", "/data", "--dbfile", "snaps/dump.rdb"]).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/data/snaps/dump.rdb"));
        assert!(config.db_path().starts_with("/data"));
    }

    #[test]
    fn test_unknown_key() {
        let config = ServerConfig::default();
        assert_eq!(config.get("nope"), None);
    }
}
