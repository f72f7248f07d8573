//! Server-side scripts invoked by content identity.
//!
//! A [`Script`] is built once from its body and reused for any number of
//! invocations, from any number of threads. Each invocation first sends the
//! script's SHA-1 identity; if the server reports that it has not cached
//! that identity, the invocation is repeated once with the full body.
//!
//! # Example
//!
//! ```
//! use kvlua::{Context, ExecGroup, LocalServer, Script};
//!
//! # fn main() -> Result<(), kvlua::Error> {
//! let server = LocalServer::new();
//! let script = Script::new("return {KEYS[1], ARGV[1]}");
//! let ctx = Context::background();
//!
//! // First call misses the server cache and falls back to the body.
//! let reply = script.exec(&ctx, &server, &["k1"], &["a1"])?;
//! assert_eq!(reply.into_array()?.len(), 2);
//!
//! // A batch shares one script across independent key/arg groups.
//! let outcomes = script.exec_multi(
//!     &ctx,
//!     &server,
//!     &[ExecGroup::new(["k1"], ["a1"]), ExecGroup::new(["k2"], ["a2"])],
//! );
//! assert_eq!(outcomes.len(), 2);
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod identity;
mod single;
pub mod variant;

pub use identity::sha1_hex;
pub use variant::VerbPair;

use crate::client::{Client, Context};
use crate::cmd::{Command, CommandBuilder};
use crate::config::ScriptOptions;
use crate::reply::Outcome;

/// An immutable script: body, identity and invocation verbs.
///
/// Everything is fixed at construction. A `Script` holds no per-call state,
/// so concurrent invocations through one value never interfere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    body: String,
    sha1: String,
    options: ScriptOptions,
    verbs: VerbPair,
}

impl Script {
    /// A read-write script invoked by identity first.
    pub fn new(body: impl Into<String>) -> Self {
        Self::with_options(body, ScriptOptions::default())
    }

    /// A read-only script invoked by identity first.
    pub fn read_only(body: impl Into<String>) -> Self {
        Self::with_options(body, ScriptOptions { read_only: true, hash_caching: true })
    }

    /// A read-write script that always sends its body.
    pub fn no_sha(body: impl Into<String>) -> Self {
        Self::with_options(body, ScriptOptions { read_only: false, hash_caching: false })
    }

    /// A read-only script that always sends its body.
    pub fn read_only_no_sha(body: impl Into<String>) -> Self {
        Self::with_options(body, ScriptOptions { read_only: true, hash_caching: false })
    }

    /// Builds a script with explicit options.
    pub fn with_options(body: impl Into<String>, options: ScriptOptions) -> Self {
        let body = body.into();
        let sha1 = identity::sha1_hex(&body);
        let verbs = VerbPair::select(options.read_only, options.hash_caching);
        Self { body, sha1, options, verbs }
    }

    /// The script source.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The 40-character lowercase hex SHA-1 of the body.
    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    /// The options the script was built with.
    pub fn options(&self) -> ScriptOptions {
        self.options
    }

    /// True if the read-only verb family is used.
    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// True if the identity is tried before the body.
    pub fn hash_caching(&self) -> bool {
        self.options.hash_caching
    }

    /// The verbs this script sends.
    pub fn verbs(&self) -> VerbPair {
        self.verbs
    }

    /// Runs the script once with the given keys and arguments.
    ///
    /// At most two calls are made, the second only after a cache miss. Any
    /// other outcome of the first call, including errors, is returned as is.
    /// `ctx` is passed to every call.
    pub fn exec<C, K, A>(&self, ctx: &Context, client: &C, keys: &[K], args: &[A]) -> Outcome
    where
        C: Client + ?Sized,
        K: AsRef<str>,
        A: AsRef<str>,
    {
        single::exec(self, ctx, client, keys, args)
    }

    /// Runs the script once per group using at most two round trips.
    ///
    /// Returns one outcome per group, in group order. Each group falls back
    /// independently; a failure of a whole round trip is reported for every
    /// group in it and never retried.
    pub fn exec_multi<C>(&self, ctx: &Context, client: &C, groups: &[ExecGroup]) -> Vec<Outcome>
    where
        C: Client + ?Sized,
    {
        batch::exec_multi(self, ctx, client, groups)
    }

    pub(crate) fn optimistic_command<K, A>(&self, builder: CommandBuilder, keys: &[K], args: &[A]) -> Command
    where
        K: AsRef<str>,
        A: AsRef<str>,
    {
        builder.script(self.verbs.optimistic, &self.sha1, keys, args)
    }

    pub(crate) fn fallback_command<K, A>(&self, builder: CommandBuilder, keys: &[K], args: &[A]) -> Command
    where
        K: AsRef<str>,
        A: AsRef<str>,
    {
        builder.script(self.verbs.fallback, &self.body, keys, args)
    }
}

/// One invocation's keys and arguments within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecGroup {
    /// Keys, sent after the key count.
    pub keys: Vec<String>,
    /// Arguments, sent after the keys.
    pub args: Vec<String>,
}

impl ExecGroup {
    /// Creates a group from any string-like keys and arguments.
    pub fn new<K, A>(keys: K, args: A) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Verb;
    use crate::reply::Reply;
    use crate::Error;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted outcomes and records every round trip.
    #[derive(Default)]
    struct Replay {
        single: Mutex<VecDeque<Outcome>>,
        multi: Mutex<VecDeque<Vec<Outcome>>>,
        calls: Mutex<Vec<Vec<Command>>>,
    }

    impl Client for Replay {
        fn execute(&self, _ctx: &Context, cmd: Command) -> Outcome {
            self.calls.lock().push(vec![cmd]);
            self.single.lock().pop_front().unwrap_or(Ok(Reply::Nil))
        }

        fn execute_multi(&self, _ctx: &Context, cmds: Vec<Command>) -> Vec<Outcome> {
            let n = cmds.len();
            self.calls.lock().push(cmds);
            self.multi.lock().pop_front().unwrap_or_else(|| vec![Ok(Reply::Nil); n])
        }
    }

    fn no_script() -> Outcome {
        Err(Error::server("NOSCRIPT No matching script. Please use EVAL."))
    }

    #[test]
    fn test_construction_fixes_identity_and_verbs() {
        let a = Script::new("return 1");
        let b = Script::new(String::from("return 1"));
        assert_eq!(a.sha1(), b.sha1());
        assert_eq!(a.sha1(), "e0e1f9fabfc9d4800c877a703b823ac0578ff8db");
        assert_eq!(a.verbs().optimistic, Verb::EvalSha);

        assert_eq!(Script::read_only("x").verbs().fallback, Verb::EvalRo);
        assert!(Script::no_sha("x").verbs().body_only());
        assert!(Script::read_only_no_sha("x").is_read_only());
        assert!(!Script::read_only_no_sha("x").hash_caching());
    }

    #[test]
    fn test_exec_falls_back_once() {
        let client = Replay::default();
        client.single.lock().extend([no_script(), no_script()]);

        let outcome = Script::new("return 1").exec(&Context::background(), &client, &["k"], &["a"]);
        assert!(outcome.unwrap_err().is_cache_miss());

        let calls = client.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0].name(), "EVALSHA");
        assert_eq!(calls[1][0].name(), "EVAL");
    }

    #[test]
    fn test_exec_multi_empty_makes_no_calls() {
        let client = Replay::default();
        let outcomes = Script::new("return 1").exec_multi(&Context::background(), &client, &[]);
        assert!(outcomes.is_empty());
        assert!(client.calls.lock().is_empty());
    }

    #[test]
    fn test_exec_multi_short_reply_fails_every_group() {
        let client = Replay::default();
        client.multi.lock().push_back(vec![no_script()]);

        let groups = vec![ExecGroup::new(["a"], ["1"]), ExecGroup::new(["b"], ["2"])];
        let outcomes = Script::new("return 1").exec_multi(&Context::background(), &client, &groups);

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(matches!(outcome, Err(Error::Protocol(_))));
        }
        // The lone cache miss is not trusted, so there is no second round trip.
        assert_eq!(client.calls.lock().len(), 1);
    }

    #[test]
    fn test_exec_group_new() {
        let group = ExecGroup::new(vec!["k1".to_string()], ["a1", "a2"]);
        assert_eq!(group.keys, ["k1"]);
        assert_eq!(group.args, ["a1", "a2"]);
    }
}
