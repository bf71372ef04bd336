//! Command Dispatcher
//!
//! Maps a raw command line to a handler and its arguments. Verbs can span
//! several words (`CONFIG GET`, `DEBUG RELOAD`), so resolution tries the
//! longest prefix of the line first and works down to the first word:
//!
//! ```text
//!   "config get dir"
//!     "CONFIG GET DIR"  no
//!     "CONFIG GET"      yes -> handler = CONFIG GET, args = ["dir"]
//! ```
//!
//! Verbs compare case-insensitively. Arguments keep the casing
//! and order the client sent.
//!
//! Handlers that do file I/O report themselves as blocking, and
//! [`CommandRegistry::execute_async`] moves them onto tokio's blocking pool.

use crate::commands::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, trace};

/// A handler for one verb.
pub trait Command: Send + Sync {
    /// Runs the command with the tokens that followed the verb.
    fn execute(&self, args: &[String]) -> CommandResult;

    /// True if `execute` may block on disk and must stay off async workers.
    fn blocking(&self) -> bool {
        false
    }
}

/// A resolved command line.
pub struct CommandMatch {
    /// The registered verb, uppercased
    pub verb: String,
    /// The handler registered for `verb`
    pub handler: Arc<dyn Command>,
    /// Remaining tokens, as the client sent them
    pub args: Vec<String>,
}

impl fmt::Debug for CommandMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandMatch")
            .field("verb", &self.verb)
            .field("args", &self.args)
            .finish()
    }
}

/// The verb table. Filled once at startup, then shared read-only.
#[derive(Default, Clone)]
pub struct CommandRegistry {
    verbs: HashMap<String, Arc<dyn Command>>,
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut verbs: Vec<&String> = self.verbs.keys().collect();
        verbs.sort();
        f.debug_struct("CommandRegistry").field("verbs", &verbs).finish()
    }
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `verb`. Words in `verb` are normalized to
    /// single spaces and uppercase. A later registration replaces an
    /// earlier one.
    pub fn register(&mut self, verb: &str, handler: Arc<dyn Command>) {
        let verb = verb
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        self.verbs.insert(verb, handler);
    }

    /// Resolves a line to the handler of its longest registered prefix.
    ///
    /// Returns `None` for a blank line or when no prefix is registered.
    pub fn resolve(&self, line: &str) -> Option<CommandMatch> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        for i in (1..=tokens.len()).rev() {
            let candidate = tokens[..i].join(" ").to_uppercase();
            if let Some(handler) = self.verbs.get(&candidate) {
                trace!(verb = %candidate, args = tokens.len() - i, "Resolved command");
                return Some(CommandMatch {
                    verb: candidate,
                    handler: Arc::clone(handler),
                    args: tokens[i..].iter().map(|s| s.to_string()).collect(),
                });
            }
        }
        None
    }

    /// Resolves and runs a line, always producing a response.
    pub fn execute(&self, line: &str) -> RespValue {
        let Some(matched) = self.resolve(line) else {
            return unknown_command(line);
        };

        match matched.handler.execute(&matched.args) {
            Ok(response) => response,
            Err(e) => e.into_resp(),
        }
    }

    /// Like [`CommandRegistry::execute`], but blocking handlers run on
    /// tokio's blocking pool while the calling task waits.
    pub async fn execute_async(&self, line: &str) -> RespValue {
        let Some(matched) = self.resolve(line) else {
            return unknown_command(line);
        };

        let result = if matched.handler.blocking() {
            let CommandMatch { verb, handler, args } = matched;
            match tokio::task::spawn_blocking(move || handler.execute(&args)).await {
                Ok(result) => result,
                Err(e) => {
                    error!(verb = %verb, error = %e, "Blocking command failed to complete");
                    Err(CommandError::Unexpected(format!("'{}' did not complete", verb)))
                }
            }
        } else {
            matched.handler.execute(&matched.args)
        };

        result.unwrap_or_else(CommandError::into_resp)
    }
}

fn unknown_command(line: &str) -> RespValue {
    let verb = line.split_whitespace().next().unwrap_or_default();
    CommandError::InvalidCommand(format!("unknown command '{}'", verb)).into_resp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    /// Answers with its own name and the arguments it was given.
    struct Tag(&'static str);

    impl Command for Tag {
        fn execute(&self, args: &[String]) -> CommandResult {
            let mut parts = vec![RespValue::bulk_string(self.0)];
            parts.extend(args.iter().map(|a| RespValue::bulk_string(a.as_str())));
            Ok(RespValue::array(parts))
        }
    }

    /// Answers with the id of the thread it ran on.
    struct Blocker;

    fn thread_tag() -> String {
        format!("{:?}", std::thread::current().id())
    }

    impl Command for Blocker {
        fn execute(&self, _args: &[String]) -> CommandResult {
            Ok(RespValue::bulk_string(thread_tag()))
        }

        fn blocking(&self) -> bool {
            true
        }
    }

    /// Panics every time.
    struct Crash;

    impl Command for Crash {
        fn execute(&self, _args: &[String]) -> CommandResult {
            panic!("crash");
        }

        fn blocking(&self) -> bool {
            true
        }
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register("SET", Arc::new(Tag("set")));
        registry.register("CONFIG", Arc::new(Tag("config")));
        registry.register("config get", Arc::new(Tag("config-get")));
        registry
    }

    #[test]
    fn test_resolve_single_word_verb() {
        let matched = registry().resolve("SET foo bar").unwrap();

        assert_eq!(matched.verb, "SET");
        assert_eq!(matched.args, vec!["foo", "bar"]);
    }

    #[test]
    fn test_resolve_is_case_insensitive_and_keeps_arg_case() {
        let matched = registry().resolve("set Foo BaR").unwrap();

        assert_eq!(matched.verb, "SET");
        assert_eq!(matched.args, vec!["Foo", "BaR"]);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = registry();

        let matched = registry.resolve("CONFIG GET dir").unwrap();
        assert_eq!(matched.verb, "CONFIG GET");
        assert_eq!(matched.args, vec!["dir"]);

        let matched = registry.resolve("CONFIG SET dir").unwrap();
        assert_eq!(matched.verb, "CONFIG");
        assert_eq!(matched.args, vec!["SET", "dir"]);
    }

    #[test]
    fn test_extra_whitespace() {
        let matched = registry().resolve("  config \t get   dir  ").unwrap();

        assert_eq!(matched.verb, "CONFIG GET");
        assert_eq!(matched.args, vec!["dir"]);
    }

    #[test]
    fn test_no_match() {
        let registry = registry();

        assert!(registry.resolve("FLY away").is_none());
        assert!(registry.resolve("").is_none());
        assert!(registry.resolve("   ").is_none());
    }

    #[test]
    fn test_execute_unknown_command() {
        let response = registry().execute("FLY away");

        assert_eq!(response.error_kind(), Some(ErrorKind::InvalidCommand));
        assert_eq!(
            response.serialize(),
            b"-ERR INVALID COMMAND unknown command 'FLY'\r\n"
        );
    }

    #[test]
    fn test_execute_runs_handler() {
        let response = registry().execute("set a b");
        let parts = response.as_array().unwrap();

        assert_eq!(parts[0].as_str(), Some("set"));
        assert_eq!(parts[1].as_str(), Some("a"));
        assert_eq!(parts[2].as_str(), Some("b"));
    }

    #[tokio::test]
    async fn test_execute_async_inline_and_blocking() {
        let mut registry = registry();
        registry.register("WAIT", Arc::new(Blocker));

        let response = registry.execute_async("set a b").await;
        assert_eq!(response.as_array().unwrap()[0].as_str(), Some("set"));

        // Ran on a blocking pool thread, not the test's runtime thread
        let response = registry.execute_async("WAIT").await;
        assert_ne!(response.as_str(), Some(thread_tag().as_str()));
        assert!(response.as_str().is_some());
        assert_eq!(
            registry.execute_async("FLY").await.error_kind(),
            Some(ErrorKind::InvalidCommand)
        );
    }

    #[tokio::test]
    async fn test_execute_async_panicking_handler() {
        let mut registry = registry();
        registry.register("CRASH", Arc::new(Crash));

        assert_eq!(
            registry.execute_async("CRASH").await.error_kind(),
            Some(ErrorKind::Unexpected)
        );
    }
}
