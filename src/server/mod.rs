//! In-process key-value server with Lua scripting.
//!
//! [`LocalServer`] implements [`Client`] directly, so scripts can be
//! exercised end to end without a network. It behaves like a real server
//! where the script subsystem can tell the difference:
//!
//! - `EVALSHA`/`EVALSHA_RO` with an identity it has not cached fails with
//!   `NOSCRIPT`.
//! - `EVAL`/`EVAL_RO` caches the body under its SHA-1 identity.
//! - `*_RO` scripts cannot write.
//! - Every command, including a whole script, runs atomically.
//!
//! # Example
//!
//! ```
//! use kvlua::{Client, CommandBuilder, Context, LocalServer, Reply};
//!
//! let server = LocalServer::new();
//! let ctx = Context::background();
//! server.execute(&ctx, CommandBuilder::new().args(["SET", "k", "v"]).build()).unwrap();
//! let reply = server.execute(&ctx, CommandBuilder::new().args(["GET", "k"]).build());
//! assert_eq!(reply.unwrap(), Reply::from("v"));
//! ```

mod commands;
mod context;
mod lua;
mod script_cache;

pub use commands::READ_ONLY_SCRIPT_ERROR;
pub use context::ScriptContext;
pub use lua::{LuaRunner, ScriptRun, SCRIPT_TIMEOUT_ERROR};
pub use script_cache::{ScriptCache, ScriptCacheStats};

use crate::client::{Client, Context};
use crate::cmd::{Command, Verb};
use crate::config::ServerOptions;
use crate::reply::{Outcome, Reply};
use crate::script::identity::sha1_hex;
use crate::{Error, Result};
use bytes::Bytes;
use crossbeam_skiplist::SkipMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reply sent for an identity the script cache does not hold.
pub const NO_SCRIPT_ERROR: &str = "NOSCRIPT No matching script. Please use EVAL.";

/// Request counters for a [`LocalServer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Calls to `execute` plus calls to `execute_multi`
    pub round_trips: u64,
    /// Individual commands received
    pub commands: u64,
    /// Script bodies executed
    pub scripts_run: u64,
    /// `NOSCRIPT` replies sent
    pub cache_misses: u64,
}

/// An in-memory key-value server.
///
/// # Thread Safety
///
/// `LocalServer` is `Send + Sync`; share it with `Arc<LocalServer>`.
pub struct LocalServer {
    options: ServerOptions,
    keyspace: Arc<SkipMap<Bytes, Bytes>>,
    scripts: ScriptCache,
    runner: LuaRunner,
    /// Serializes command execution
    exec_lock: Mutex<()>,
    stats: RwLock<ServerStats>,
    closed: AtomicBool,
}

impl LocalServer {
    /// Creates a server with default options.
    pub fn new() -> Self {
        Self::build(ServerOptions::default())
    }

    /// Creates a server with the given options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the options fail validation.
    pub fn with_options(options: ServerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(options))
    }

    fn build(options: ServerOptions) -> Self {
        Self {
            keyspace: Arc::new(SkipMap::new()),
            scripts: ScriptCache::new(options.max_cached_scripts),
            runner: LuaRunner::new(options.instruction_hook_interval),
            exec_lock: Mutex::new(()),
            stats: RwLock::new(ServerStats::default()),
            closed: AtomicBool::new(false),
            options,
        }
    }

    /// The options this server was created with.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Snapshot of the request counters.
    pub fn stats(&self) -> ServerStats {
        self.stats.read().clone()
    }

    /// Resets the request counters to zero.
    pub fn reset_stats(&self) {
        *self.stats.write() = ServerStats::default();
    }

    /// The script cache.
    pub fn script_cache(&self) -> &ScriptCache {
        &self.scripts
    }

    /// Drops every cached script, as if the server had evicted them.
    pub fn flush_scripts(&self) {
        let _guard = self.exec_lock.lock();
        self.scripts.clear();
        log::debug!("script cache flushed");
    }

    /// Reads a key directly, bypassing the command path and the counters.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.keyspace.get(key).map(|e| e.value().clone())
    }

    /// Makes every later command fail with [`Error::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn run_one(&self, ctx: &Context, cmd: Command) -> Outcome {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        self.stats.write().commands += 1;

        let _guard = self.exec_lock.lock();
        match cmd.name().as_str() {
            "EVAL" | "EVAL_RO" | "EVALSHA" | "EVALSHA_RO" => self.eval(ctx, cmd),
            "SCRIPT" => self.script_command(cmd),
            _ => {
                let args: Vec<Bytes> = cmd.into_args().into_iter().map(Bytes::from).collect();
                commands::execute(&mut commands::Direct(&self.keyspace), &args, false)
            }
        }
    }

    fn eval(&self, ctx: &Context, cmd: Command) -> Outcome {
        let name = cmd.name();
        let Some(verb) = Verb::parse(&name) else {
            return Err(Error::server(format!("ERR unknown command '{}'", name)));
        };
        let tokens = cmd.into_args();
        if tokens.len() < 3 {
            return Err(commands::arity_error(verb.as_str()));
        }

        let numkeys: i64 = tokens[2]
            .parse()
            .map_err(|_| Error::server("ERR value is not an integer or out of range"))?;
        if numkeys < 0 {
            return Err(Error::server("ERR Number of keys can't be negative"));
        }
        let numkeys = numkeys as usize;
        if numkeys > tokens.len() - 3 {
            return Err(Error::server("ERR Number of keys can't be greater than number of args"));
        }

        let body: Arc<str> = if verb.by_identity() {
            let sha1 = tokens[1].to_ascii_lowercase();
            match self.scripts.get(&sha1) {
                Some(body) => body,
                None => {
                    self.stats.write().cache_misses += 1;
                    log::debug!("no cached script for {}", sha1);
                    return Err(Error::server(NO_SCRIPT_ERROR));
                }
            }
        } else {
            let body: Arc<str> = Arc::from(tokens[1].as_str());
            self.runner.compile(&body)?;
            self.scripts.insert(sha1_hex(&body), Arc::clone(&body));
            body
        };

        let mut rest = tokens.into_iter().skip(3).map(Bytes::from);
        let keys: Vec<Bytes> = rest.by_ref().take(numkeys).collect();
        let args: Vec<Bytes> = rest.collect();

        let timeout = match (self.options.script_timeout, ctx.remaining()) {
            (Some(limit), Some(left)) => Some(limit.min(left)),
            (limit, left) => limit.or(left),
        };

        self.stats.write().scripts_run += 1;
        let run = ScriptRun { body: &body, keys, args, read_only: verb.is_read_only(), timeout };
        let outcome = self.runner.run(run, ScriptContext::new(Arc::clone(&self.keyspace)));

        // A script cut short by the caller's deadline reports the caller's error.
        let timed_out = outcome
            .as_ref()
            .err()
            .and_then(Error::as_server_error)
            .is_some_and(|e| e.message() == SCRIPT_TIMEOUT_ERROR);
        if timed_out {
            if let Some(err) = ctx.err() {
                return Err(err);
            }
        }
        outcome
    }

    fn script_command(&self, cmd: Command) -> Outcome {
        let tokens = cmd.into_args();
        let Some(sub) = tokens.get(1) else {
            return Err(commands::arity_error("SCRIPT"));
        };

        match sub.to_ascii_uppercase().as_str() {
            "LOAD" => {
                if tokens.len() != 3 {
                    return Err(commands::arity_error("SCRIPT|LOAD"));
                }
                self.runner.compile(&tokens[2])?;
                let sha1 = sha1_hex(&tokens[2]);
                self.scripts.insert(sha1.clone(), Arc::from(tokens[2].as_str()));
                log::debug!("loaded script {}", sha1);
                Ok(Reply::bulk(sha1))
            }
            "EXISTS" => {
                if tokens.len() < 3 {
                    return Err(commands::arity_error("SCRIPT|EXISTS"));
                }
                Ok(Reply::Array(
                    tokens[2..]
                        .iter()
                        .map(|sha1| Reply::Int(self.scripts.contains(&sha1.to_ascii_lowercase()) as i64))
                        .collect(),
                ))
            }
            "FLUSH" => {
                self.scripts.clear();
                log::debug!("script cache flushed");
                Ok(Reply::ok())
            }
            _ => Err(Error::server(format!(
                "ERR unknown subcommand '{}'. Try SCRIPT HELP.",
                sub
            ))),
        }
    }
}

impl Default for LocalServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Client for LocalServer {
    fn execute(&self, ctx: &Context, cmd: Command) -> Outcome {
        self.stats.write().round_trips += 1;
        self.run_one(ctx, cmd)
    }

    fn execute_multi(&self, ctx: &Context, cmds: Vec<Command>) -> Vec<Outcome> {
        self.stats.write().round_trips += 1;
        cmds.into_iter().map(|cmd| self.run_one(ctx, cmd)).collect()
    }
}
