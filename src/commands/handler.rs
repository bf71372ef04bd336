//! Command Handlers
//!
//! One type per verb. Each implements [`Command`] and holds only the shared
//! state it needs, handed over at construction time.
//!
//! ## Supported Commands
//!
//! - `PING` - Always `PONG`
//! - `ECHO [word ...]` - The arguments joined by single spaces
//! - `SET key value [px seconds]` - Store a value, optionally expiring
//! - `GET key` - Read a value
//! - `CONFIG GET name` - Read a startup setting
//! - `KEYS *` - List live keys
//! - `INFO [replication|keyspace|stats]` - Server information
//! - `SAVE` - Write a snapshot now
//! - `DEBUG RELOAD` - Write a snapshot and read it back
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    CommandRegistry                       │
//! │                                                          │
//! │   "SET a 1 px 5" ──resolve──> SetCommand.execute(args)   │
//! │                                     │                    │
//! │                          ┌──────────┴──────────┐         │
//! │                          ▼                     ▼         │
//! │                        Store              AppendLog      │
//! └──────────────────────────────────────────────────────────┘
//! ```

use crate::commands::error::{CommandError, CommandResult};
use crate::commands::registry::{Command, CommandRegistry};
use crate::config::ServerConfig;
use crate::persistence::{AppendLog, SnapshotCodec};
use crate::protocol::RespValue;
use crate::storage::{Entry, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared state the handlers are built from.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// The key-value store
    pub store: Arc<Store>,
    /// Codec bound to the configured snapshot path
    pub codec: Arc<SnapshotCodec>,
    /// Startup configuration
    pub config: Arc<ServerConfig>,
    /// Durability sink for SET (None disables per-mutation appends)
    pub append_log: Option<AppendLog>,
}

impl CommandRegistry {
    /// Builds a registry with every built-in verb registered.
    pub fn with_defaults(ctx: &ServerContext) -> Self {
        let mut registry = CommandRegistry::new();

        registry.register("PING", Arc::new(PingCommand));
        registry.register("ECHO", Arc::new(EchoCommand));
        registry.register(
            "SET",
            Arc::new(SetCommand {
                store: Arc::clone(&ctx.store),
                append_log: ctx.append_log.clone(),
            }),
        );
        registry.register(
            "GET",
            Arc::new(GetCommand {
                store: Arc::clone(&ctx.store),
            }),
        );
        registry.register(
            "CONFIG",
            Arc::new(ConfigCommand {
                config: Arc::clone(&ctx.config),
            }),
        );
        registry.register(
            "KEYS",
            Arc::new(KeysCommand {
                store: Arc::clone(&ctx.store),
            }),
        );
        registry.register(
            "INFO",
            Arc::new(InfoCommand {
                store: Arc::clone(&ctx.store),
            }),
        );
        registry.register(
            "SAVE",
            Arc::new(SaveCommand {
                store: Arc::clone(&ctx.store),
                codec: Arc::clone(&ctx.codec),
            }),
        );
        registry.register(
            "DEBUG RELOAD",
            Arc::new(DebugReloadCommand {
                store: Arc::clone(&ctx.store),
                codec: Arc::clone(&ctx.codec),
            }),
        );

        registry
    }
}

// ============================================================================
// Connection commands
// ============================================================================

/// PING
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, _args: &[String]) -> CommandResult {
        Ok(RespValue::pong())
    }
}

/// ECHO [word ...]
pub struct EchoCommand;

impl Command for EchoCommand {
    fn execute(&self, args: &[String]) -> CommandResult {
        if args.is_empty() {
            return Ok(RespValue::null());
        }
        Ok(RespValue::bulk_string(args.join(" ")))
    }
}

// ============================================================================
// Key commands
// ============================================================================

/// SET key value [px seconds]
///
/// `px` must come right after the value. Despite the name, its argument is
/// a whole number of seconds from now.
pub struct SetCommand {
    store: Arc<Store>,
    append_log: Option<AppendLog>,
}

impl SetCommand {
    fn parse_ttl(args: &[String]) -> Result<Option<Duration>, CommandError> {
        match args {
            [_, _] => Ok(None),
            [_, _, flag, secs] if flag.eq_ignore_ascii_case("px") => secs
                .parse::<u64>()
                .map(|s| Some(Duration::from_secs(s)))
                .map_err(|_| CommandError::illegal(format!("invalid expire time '{}'", secs))),
            [_, _, flag] if flag.eq_ignore_ascii_case("px") => {
                Err(CommandError::illegal("px requires a number of seconds"))
            }
            _ => Err(CommandError::illegal("usage: SET key value [px seconds]")),
        }
    }
}

impl Command for SetCommand {
    fn execute(&self, args: &[String]) -> CommandResult {
        if args.len() < 2 {
            return Err(CommandError::illegal("wrong number of arguments for 'SET'"));
        }

        let entry = match Self::parse_ttl(args)? {
            Some(ttl) => Entry::with_ttl(args[1].as_str(), ttl),
            None => Entry::new(args[1].as_str()),
        };

        let key = args[0].clone();
        match &self.append_log {
            Some(log) => self
                .store
                .put_entry_with(key, entry, |key, entry| log.record(key, entry)),
            None => self.store.put_entry(key, entry),
        }

        Ok(RespValue::ok())
    }
}

/// GET key
pub struct GetCommand {
    store: Arc<Store>,
}

impl Command for GetCommand {
    fn execute(&self, args: &[String]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::illegal("wrong number of arguments for 'GET'"));
        };

        Ok(match self.store.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }
}

/// KEYS pattern
///
/// Only `*` is understood. Any other pattern gets the literal string
/// `null` back.
pub struct KeysCommand {
    store: Arc<Store>,
}

impl Command for KeysCommand {
    fn execute(&self, args: &[String]) -> CommandResult {
        let [pattern] = args else {
            return Err(CommandError::illegal("wrong number of arguments for 'KEYS'"));
        };

        if pattern != "*" {
            debug!(pattern = %pattern, "Unsupported KEYS pattern");
            return Ok(RespValue::bulk_string("null"));
        }

        let keys = self
            .store
            .live_keys()
            .into_iter()
            .map(RespValue::bulk_string)
            .collect();
        Ok(RespValue::array(keys))
    }
}

// ============================================================================
// Server commands
// ============================================================================

/// CONFIG GET name
pub struct ConfigCommand {
    config: Arc<ServerConfig>,
}

impl Command for ConfigCommand {
    fn execute(&self, args: &[String]) -> CommandResult {
        let [subcommand, name] = args else {
            return Err(CommandError::illegal("usage: CONFIG GET name"));
        };
        if subcommand != "GET" {
            return Err(CommandError::illegal(format!(
                "unsupported CONFIG subcommand '{}'",
                subcommand
            )));
        }

        self.config
            .get(name)
            .map(RespValue::bulk_string)
            .ok_or_else(|| CommandError::illegal(format!("unknown config key '{}'", name)))
    }
}

/// INFO [replication|keyspace|stats]
pub struct InfoCommand {
    store: Arc<Store>,
}

impl Command for InfoCommand {
    fn execute(&self, args: &[String]) -> CommandResult {
        let section = match args {
            [] => "replication".to_string(),
            [section] => section.to_lowercase(),
            _ => return Err(CommandError::illegal("usage: INFO [section]")),
        };

        match section.as_str() {
            "replication" => Ok(RespValue::bulk_string("role:master")),
            "keyspace" => Ok(RespValue::bulk_string(format!(
                "keys:{}",
                self.store.live_keys().len()
            ))),
            "stats" => {
                let stats = self.store.stats();
                Ok(RespValue::bulk_string(format!(
                    "keys:{}\r\nget_ops:{}\r\nput_ops:{}\r\nexpired_keys:{}",
                    stats.keys, stats.get_ops, stats.put_ops, stats.expired
                )))
            }
            other => Err(CommandError::illegal(format!("unknown INFO section '{}'", other))),
        }
    }
}

/// SAVE
pub struct SaveCommand {
    store: Arc<Store>,
    codec: Arc<SnapshotCodec>,
}

impl Command for SaveCommand {
    fn execute(&self, _args: &[String]) -> CommandResult {
        let report = self.codec.save(&self.store)?;
        debug!(written = report.written, "SAVE complete");
        Ok(RespValue::ok())
    }

    fn blocking(&self) -> bool {
        true
    }
}

/// DEBUG RELOAD
pub struct DebugReloadCommand {
    store: Arc<Store>,
    codec: Arc<SnapshotCodec>,
}

impl Command for DebugReloadCommand {
    fn execute(&self, _args: &[String]) -> CommandResult {
        self.codec.save(&self.store)?;
        let report = self.codec.reload(&self.store)?;
        debug!(loaded = report.loaded, "DEBUG RELOAD complete");
        Ok(RespValue::ok())
    }

    fn blocking(&self) -> bool {
        true
    }
}
