//! Resolver tuning knobs: bounded waits and the retry budget.
//! Defaults are compiled in; environment variables override them so a host
//! shell can tune behavior without a rebuild (no config files involved).

use std::env;
use std::time::Duration;

/// Hard ceiling on a single backoff sleep regardless of attempt count.
const BACKOFF_CAP: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Bounded wait for the identity provider's initial session answer.
    /// Elapsing lands the resolver in Anonymous rather than hanging.
    pub init_timeout: Duration,
    /// Bounded wait for a single profile-role fetch attempt.
    pub fetch_timeout: Duration,
    /// Total attempts (first try included) before defaulting the role.
    pub fetch_attempts: u32,
    /// Base delay for exponential backoff between fetch attempts.
    pub backoff_base: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(4),
            fetch_attempts: 3,
            backoff_base: Duration::from_millis(250),
        }
    }
}

impl ResolverConfig {
    /// Defaults overridden by TEXLOOM_* environment variables where present.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(ms) = parse_ms_env("TEXLOOM_INIT_TIMEOUT_MS") { cfg.init_timeout = ms; }
        if let Some(ms) = parse_ms_env("TEXLOOM_FETCH_TIMEOUT_MS") { cfg.fetch_timeout = ms; }
        if let Some(n) = parse_u32_env("TEXLOOM_FETCH_ATTEMPTS") {
            // At least one attempt; zero would mean never asking at all
            cfg.fetch_attempts = n.max(1);
        }
        if let Some(ms) = parse_ms_env("TEXLOOM_BACKOFF_MS") { cfg.backoff_base = ms; }
        cfg
    }

    /// Delay before retry number `attempt` (1-based: the sleep after the
    /// first failed attempt is the base itself), capped at BACKOFF_CAP.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        (self.backoff_base * factor).min(BACKOFF_CAP)
    }
}

fn parse_ms_env(name: &str) -> Option<Duration> {
    match env::var(name) {
        Ok(val) => match val.parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => {
                tracing::warn!(target: "texloom::config", "ignoring non-numeric {}='{}'", name, val);
                None
            }
        },
        Err(_) => None,
    }
}

fn parse_u32_env(name: &str) -> Option<u32> {
    match env::var(name) {
        Ok(val) => val.parse::<u32>().ok(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ResolverConfig::default();
        assert!(cfg.fetch_attempts >= 1);
        assert!(cfg.init_timeout > Duration::ZERO);
        assert!(cfg.fetch_timeout > Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = ResolverConfig { backoff_base: Duration::from_millis(100), ..Default::default() };
        assert_eq!(cfg.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff_delay(3), Duration::from_millis(400));
        // Large attempt numbers saturate at the cap instead of overflowing
        assert_eq!(cfg.backoff_delay(30), BACKOFF_CAP);
    }

    // Single test for all env interactions: tests run in parallel and the
    // process environment is shared.
    #[test]
    fn env_overrides_apply() {
        env::set_var("TEXLOOM_FETCH_ATTEMPTS", "5");
        env::set_var("TEXLOOM_BACKOFF_MS", "10");
        let cfg = ResolverConfig::from_env();
        assert_eq!(cfg.fetch_attempts, 5);
        assert_eq!(cfg.backoff_base, Duration::from_millis(10));

        // Zero attempts would mean never asking; clamped to one
        env::set_var("TEXLOOM_FETCH_ATTEMPTS", "0");
        assert_eq!(ResolverConfig::from_env().fetch_attempts, 1);

        // Malformed values are ignored in favor of the default
        env::set_var("TEXLOOM_BACKOFF_MS", "soon");
        assert_eq!(ResolverConfig::from_env().backoff_base, ResolverConfig::default().backoff_base);

        env::remove_var("TEXLOOM_FETCH_ATTEMPTS");
        env::remove_var("TEXLOOM_BACKOFF_MS");
    }
}
