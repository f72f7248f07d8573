//! The command-execution boundary.
//!
//! [`Client`] is everything the script subsystem needs from a connection:
//! a command builder, a single-command call and a pipelined multi-command
//! call. Network I/O, pooling, routing and transport retries all live behind
//! this trait. [`LocalServer`](crate::server::LocalServer) is the in-process
//! implementation; tests provide their own.

use crate::cmd::{Command, CommandBuilder};
use crate::reply::Outcome;
use crate::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Executes commands against a server.
pub trait Client: Send + Sync {
    /// Returns a builder for commands sent through this client.
    fn builder(&self) -> CommandBuilder {
        CommandBuilder::new()
    }

    /// Executes one command.
    fn execute(&self, ctx: &Context, cmd: Command) -> Outcome;

    /// Executes commands as one round trip.
    ///
    /// Implementations must return exactly one outcome per command, in the
    /// order the commands were given.
    fn execute_multi(&self, ctx: &Context, cmds: Vec<Command>) -> Vec<Outcome>;
}

impl<C: Client + ?Sized> Client for &C {
    fn builder(&self) -> CommandBuilder {
        (**self).builder()
    }

    fn execute(&self, ctx: &Context, cmd: Command) -> Outcome {
        (**self).execute(ctx, cmd)
    }

    fn execute_multi(&self, ctx: &Context, cmds: Vec<Command>) -> Vec<Outcome> {
        (**self).execute_multi(ctx, cmds)
    }
}

impl<C: Client + ?Sized> Client for Arc<C> {
    fn builder(&self) -> CommandBuilder {
        (**self).builder()
    }

    fn execute(&self, ctx: &Context, cmd: Command) -> Outcome {
        (**self).execute(ctx, cmd)
    }

    fn execute_multi(&self, ctx: &Context, cmds: Vec<Command>) -> Vec<Outcome> {
        (**self).execute_multi(ctx, cmds)
    }
}

impl<C: Client + ?Sized> Client for Box<C> {
    fn builder(&self) -> CommandBuilder {
        (**self).builder()
    }

    fn execute(&self, ctx: &Context, cmd: Command) -> Outcome {
        (**self).execute(ctx, cmd)
    }

    fn execute_multi(&self, ctx: &Context, cmds: Vec<Command>) -> Vec<Outcome> {
        (**self).execute_multi(ctx, cmds)
    }
}

/// Cancellation and deadline carried by a call.
///
/// Cloning a context shares its cancellation flag, so every call issued for
/// one invocation observes the same signal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    canceled: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

/// Cancels the [`Context`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Context {
    /// A context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self { canceled: None, deadline: Some(deadline) }
    }

    /// A cancelable context and the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self { canceled: Some(Arc::clone(&flag)), deadline: None }, CancelHandle { flag })
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Returns the reason this context is done, or `None` while it is live.
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<Error> {
        if self.canceled.as_ref().is_some_and(|f| f.load(Ordering::Acquire)) {
            return Some(Error::Canceled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Error::Timeout),
            _ => None,
        }
    }

    /// Returns true once canceled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }
}
