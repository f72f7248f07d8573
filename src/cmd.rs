//! Commands and the command builder.
//!
//! A [`Command`] is the ordered list of tokens sent to the server. The
//! [`CommandBuilder`] produces them; script invocations always go through
//! [`CommandBuilder::script`] so the token order is fixed in one place.

use std::fmt;

/// The four script invocation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Invoke by full body.
    Eval,
    /// Invoke by full body, read-only.
    EvalRo,
    /// Invoke by identity.
    EvalSha,
    /// Invoke by identity, read-only.
    EvalShaRo,
}

impl Verb {
    /// Wire name of the verb.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Eval => "EVAL",
            Verb::EvalRo => "EVAL_RO",
            Verb::EvalSha => "EVALSHA",
            Verb::EvalShaRo => "EVALSHA_RO",
        }
    }

    /// Parses a wire name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "EVAL" => Some(Verb::Eval),
            "EVAL_RO" => Some(Verb::EvalRo),
            "EVALSHA" => Some(Verb::EvalSha),
            "EVALSHA_RO" => Some(Verb::EvalShaRo),
            _ => None,
        }
    }

    /// True for the `_RO` variants.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Verb::EvalRo | Verb::EvalShaRo)
    }

    /// True when the second token is an identity rather than a body.
    pub fn by_identity(&self) -> bool {
        matches!(self, Verb::EvalSha | Verb::EvalShaRo)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built command, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// All tokens, command name first.
    pub fn args(&self) -> &[String] {
        &self.tokens
    }

    /// Upper-cased command name, or an empty string for an empty command.
    pub fn name(&self) -> String {
        self.tokens.first().map(|t| t.to_ascii_uppercase()).unwrap_or_default()
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if the command has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Consumes the command, returning its tokens.
    pub fn into_args(self) -> Vec<String> {
        self.tokens
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

/// Accumulates tokens into a [`Command`].
///
/// # Example
///
/// ```
/// use kvlua::cmd::{CommandBuilder, Verb};
///
/// let cmd = CommandBuilder::new().script(Verb::Eval, "return 1", &["k"], &["a"]);
/// assert_eq!(cmd.args(), ["EVAL", "return 1", "1", "k", "a"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    tokens: Vec<String>,
}

impl CommandBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Appends one token.
    pub fn arg(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    /// Appends tokens in iteration order.
    pub fn args<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Finishes the command.
    pub fn build(self) -> Command {
        Command { tokens: self.tokens }
    }

    /// Builds a script invocation: verb, identity or body, key count, keys, args.
    ///
    /// Any tokens already in the builder are discarded.
    pub fn script<K, A>(self, verb: Verb, token: &str, keys: &[K], args: &[A]) -> Command
    where
        K: AsRef<str>,
        A: AsRef<str>,
    {
        let mut tokens = Vec::with_capacity(3 + keys.len() + args.len());
        tokens.push(verb.as_str().to_string());
        tokens.push(token.to_string());
        tokens.push(keys.len().to_string());
        tokens.extend(keys.iter().map(|k| k.as_ref().to_string()));
        tokens.extend(args.iter().map(|a| a.as_ref().to_string()));
        Command { tokens }
    }
}
