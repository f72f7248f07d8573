//! Optimistic-then-fallback execution of one invocation.

use super::Script;
use crate::client::{Client, Context};
use crate::reply::Outcome;
use log::{debug, trace};

/// Runs one invocation of `script`.
///
/// With hash caching on, the identity is sent first; only a cache-miss
/// reply causes a second call carrying the body, and that call's outcome
/// is final whatever it is. Without hash caching the body is sent once.
pub(crate) fn exec<C, K, A>(
    script: &Script,
    ctx: &Context,
    client: &C,
    keys: &[K],
    args: &[A],
) -> Outcome
where
    C: Client + ?Sized,
    K: AsRef<str>,
    A: AsRef<str>,
{
    if !script.hash_caching() {
        trace!("script {}: sending body ({} keys)", script.sha1(), keys.len());
        return client.execute(ctx, script.fallback_command(client.builder(), keys, args));
    }

    trace!("script {}: sending identity ({} keys)", script.sha1(), keys.len());
    match client.execute(ctx, script.optimistic_command(client.builder(), keys, args)) {
        Err(e) if e.is_cache_miss() => {
            debug!("script {} not cached by server, resending body", script.sha1());
            client.execute(ctx, script.fallback_command(client.builder(), keys, args))
        }
        outcome => outcome,
    }
}
