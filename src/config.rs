use std::str::FromStr;

/// Number of coroutine slots when nothing else is configured
pub const DEFAULT_CAPACITY: usize = 128;
/// Size of a coroutine stack when nothing else is configured
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

pub const ENV_CAPACITY: &str = "COROPOOL_CAPACITY";
pub const ENV_STACK_SIZE: &str = "COROPOOL_STACK_SIZE";
pub const ENV_SEED: &str = "COROPOOL_SEED";

/// Runtime settings, fixed for the lifetime of a runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of coroutines alive or dead-but-not-reclaimed at once
    pub capacity: usize,
    /// Stack size of each coroutine, rounded up to the page granularity
    pub stack_size: usize,
    /// Seed of the scheduler's random source, `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            stack_size: DEFAULT_STACK_SIZE,
            seed: None,
        }
    }
}

impl Config {
    /// Returns the default configuration overridden by `COROPOOL_CAPACITY`,
    /// `COROPOOL_STACK_SIZE` and `COROPOOL_SEED` when they are set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = env_value(ENV_CAPACITY) {
            config.capacity = capacity;
        }
        if let Some(stack_size) = env_value(ENV_STACK_SIZE) {
            config.stack_size = stack_size;
        }
        if let Some(seed) = env_value(ENV_SEED) {
            config.seed = Some(seed);
        }
        config
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse_value(&raw);
    if parsed.is_none() {
        log::warn!("Ignoring {key}={raw:?}: not a valid value");
    }
    parsed
}

fn parse_value<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = Config::default();
        assert_eq!(config.capacity, 128);
        assert_eq!(config.stack_size, 65536);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<usize>("64"), Some(64));
        assert_eq!(parse_value::<usize>(" 12 "), Some(12));
        assert_eq!(parse_value::<u64>("18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_value::<usize>("-1"), None);
        assert_eq!(parse_value::<usize>("many"), None);
        assert_eq!(parse_value::<u64>(""), None);
    }

    #[test]
    fn test_unset_env_value() {
        assert_eq!(env_value::<usize>("COROPOOL_TEST_NEVER_SET"), None);
    }
}
