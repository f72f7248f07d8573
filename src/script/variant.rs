//! Verb selection for a script.

use crate::cmd::Verb;

/// The verbs a script sends: the optimistic one first, the fallback one on a
/// cache miss.
///
/// | read_only | hash_caching | optimistic   | fallback |
/// |-----------|--------------|--------------|----------|
/// | false     | true         | `EVALSHA`    | `EVAL`   |
/// | false     | false        | `EVAL`       | `EVAL`   |
/// | true      | true         | `EVALSHA_RO` | `EVAL_RO`|
/// | true      | false        | `EVAL_RO`    | `EVAL_RO`|
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbPair {
    /// Sent with the identity, when hash caching is on.
    pub optimistic: Verb,
    /// Sent with the full body.
    pub fallback: Verb,
}

impl VerbPair {
    /// Looks up the verb pair for a script's options.
    pub fn select(read_only: bool, hash_caching: bool) -> Self {
        let fallback = if read_only { Verb::EvalRo } else { Verb::Eval };
        let optimistic = match (read_only, hash_caching) {
            (false, true) => Verb::EvalSha,
            (true, true) => Verb::EvalShaRo,
            (_, false) => fallback,
        };
        Self { optimistic, fallback }
    }

    /// True when the optimistic phase is skipped.
    pub fn body_only(&self) -> bool {
        self.optimistic == self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_table() {
        let cases = [
            (false, true, Verb::EvalSha, Verb::Eval),
            (false, false, Verb::Eval, Verb::Eval),
            (true, true, Verb::EvalShaRo, Verb::EvalRo),
            (true, false, Verb::EvalRo, Verb::EvalRo),
        ];
        for (read_only, hash_caching, optimistic, fallback) in cases {
            let pair = VerbPair::select(read_only, hash_caching);
            assert_eq!(pair.optimistic, optimistic, "ro={} sha={}", read_only, hash_caching);
            assert_eq!(pair.fallback, fallback, "ro={} sha={}", read_only, hash_caching);
            assert_eq!(pair.body_only(), !hash_caching);
        }
    }
}
