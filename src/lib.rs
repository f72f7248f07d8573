//! # kvlua - Hash-cached server-side scripting for key-value clients
//!
//! Servers that run scripts atomically usually let a client register a
//! script by its SHA-1 identity and invoke it by that identity afterwards.
//! kvlua implements the client side of that protocol: send the identity
//! first, and resend the full body only when the server replies that it
//! does not know the identity.
//!
//! ## Architecture
//!
//! - **Script**: immutable body + identity + verb pair, built once and shared
//! - **Single execution**: identity first, body on a cache miss, at most two calls
//! - **Batch execution**: one round trip for every group, one more for the
//!   groups that missed, results kept in group order
//! - **Client**: the command-execution boundary (`execute`, `execute_multi`)
//! - **LocalServer**: an in-process key-value server running Lua scripts,
//!   implementing `Client`
//!
//! ## Example Usage
//!
//! ```rust
//! use kvlua::{Context, LocalServer, Script};
//!
//! # fn main() -> Result<(), kvlua::Error> {
//! let server = LocalServer::new();
//! let ctx = Context::background();
//!
//! let incr = Script::new(
//!     "local v = tonumber(server.call('GET', KEYS[1]) or '0') + ARGV[1]
//!      server.call('SET', KEYS[1], tostring(v))
//!      return v",
//! );
//!
//! assert_eq!(incr.exec(&ctx, &server, &["counter"], &["5"])?.as_int(), Some(5));
//! assert_eq!(incr.exec(&ctx, &server, &["counter"], &["2"])?.as_int(), Some(7));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod cmd;
pub mod config;
pub mod error;
pub mod reply;
pub mod script;
pub mod server;

// Re-exports
pub use client::{CancelHandle, Client, Context};
pub use cmd::{Command, CommandBuilder, Verb};
pub use config::{ScriptOptions, ServerOptions};
pub use error::{Error, ErrorKind, Result, ServerError};
pub use reply::{Outcome, Reply};
pub use script::{ExecGroup, Script, VerbPair};
pub use server::{LocalServer, ServerStats};
