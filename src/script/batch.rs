//! Optimistic-then-fallback execution of many invocations sharing a script.
//!
//! At most two round trips are made. The first carries one command per
//! group; the second carries a fallback only for the groups that missed,
//! and each fallback outcome is written back at its group's original index.

use super::{ExecGroup, Script};
use crate::client::{Client, Context};
use crate::cmd::Command;
use crate::reply::Outcome;
use crate::Error;
use log::{debug, trace, warn};

pub(crate) fn exec_multi<C>(
    script: &Script,
    ctx: &Context,
    client: &C,
    groups: &[ExecGroup],
) -> Vec<Outcome>
where
    C: Client + ?Sized,
{
    if groups.is_empty() {
        return Vec::new();
    }

    if !script.hash_caching() {
        let cmds = groups
            .iter()
            .map(|g| script.fallback_command(client.builder(), &g.keys, &g.args))
            .collect();
        return round_trip(ctx, client, cmds);
    }

    let cmds = groups
        .iter()
        .map(|g| script.optimistic_command(client.builder(), &g.keys, &g.args))
        .collect();
    let mut outcomes = round_trip(ctx, client, cmds);

    let missed: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, outcome)| matches!(outcome, Err(e) if e.is_cache_miss()))
        .map(|(i, _)| i)
        .collect();
    if missed.is_empty() {
        return outcomes;
    }

    debug!(
        "script {} not cached by server for {} of {} groups, resending body",
        script.sha1(),
        missed.len(),
        groups.len()
    );
    let cmds = missed
        .iter()
        .map(|&i| script.fallback_command(client.builder(), &groups[i].keys, &groups[i].args))
        .collect();
    let fallbacks = round_trip(ctx, client, cmds);
    for (i, outcome) in missed.into_iter().zip(fallbacks) {
        outcomes[i] = outcome;
    }
    outcomes
}

/// Sends `cmds` as one round trip and checks the reply count.
///
/// A client returning the wrong number of outcomes has broken the pipeline
/// contract; every position then gets the same protocol error.
fn round_trip<C>(ctx: &Context, client: &C, cmds: Vec<Command>) -> Vec<Outcome>
where
    C: Client + ?Sized,
{
    let expected = cmds.len();
    trace!("round trip of {} commands", expected);
    let outcomes = client.execute_multi(ctx, cmds);
    if outcomes.len() != expected {
        warn!("round trip returned {} outcomes for {} commands", outcomes.len(), expected);
        let err = Error::protocol(format!(
            "expected {} replies in round trip, got {}",
            expected,
            outcomes.len()
        ));
        return vec![Err(err); expected];
    }
    outcomes
}
