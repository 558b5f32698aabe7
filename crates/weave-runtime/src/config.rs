#![forbid(unsafe_code)]

//! Element configuration.
//!
//! | Field | Default | Env |
//! |-------|---------|-----|
//! | `sync` | `false` | `WEAVE_SYNC=1` |
//! | `max_drain_rounds` | 16 | `WEAVE_MAX_DRAIN_ROUNDS` |

use crate::scheduler::DEFAULT_MAX_ROUNDS;

/// Env var forcing synchronous passes.
pub const ENV_SYNC: &str = "WEAVE_SYNC";
/// Env var overriding the drain cap.
pub const ENV_MAX_DRAIN_ROUNDS: &str = "WEAVE_MAX_DRAIN_ROUNDS";

/// How an element schedules its passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementConfig {
    /// Run a pass as soon as one is requested instead of on the next tick.
    /// Default: false
    pub sync: bool,

    /// Follow-on passes a synchronous pass may trigger before the rest are
    /// handed to the scheduler.
    /// Default: 16
    pub max_drain_rounds: usize,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            sync: false,
            max_drain_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl ElementConfig {
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Set the drain cap (at least one).
    #[must_use]
    pub fn with_max_drain_rounds(mut self, rounds: usize) -> Self {
        self.max_drain_rounds = rounds.max(1);
        self
    }

    /// Defaults overridden by the process environment.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_SYNC) {
            config.sync = truthy(&value);
        }
        if let Some(rounds) = lookup(ENV_MAX_DRAIN_ROUNDS).and_then(|v| v.trim().parse::<usize>().ok()) {
            config = config.with_max_drain_rounds(rounds);
        }
        config
    }
}

fn truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn defaults() {
        let config = ElementConfig::default();
        assert!(!config.sync);
        assert_eq!(config.max_drain_rounds, 16);
    }

    #[test]
    fn env_overrides() {
        let config = ElementConfig::from_lookup(lookup(&[
            (ENV_SYNC, "1"),
            (ENV_MAX_DRAIN_ROUNDS, "3"),
        ]));
        assert!(config.sync);
        assert_eq!(config.max_drain_rounds, 3);

        let config = ElementConfig::from_lookup(lookup(&[(ENV_SYNC, "TRUE")]));
        assert!(config.sync);
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let config = ElementConfig::from_lookup(lookup(&[
            (ENV_SYNC, "yes please"),
            (ENV_MAX_DRAIN_ROUNDS, "many"),
        ]));
        assert_eq!(config, ElementConfig::default());
    }

    #[test]
    fn drain_cap_is_at_least_one() {
        assert_eq!(ElementConfig::default().with_max_drain_rounds(0).max_drain_rounds, 1);
    }
}
