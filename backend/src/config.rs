use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost";
pub const DEFAULT_EVENT_BUFFER: usize = 64;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Exact origin allowed to call the API from a browser.
    pub allowed_origin: String,
    /// Capacity of each election's notification channel.
    pub event_buffer: usize,
    pub sweep_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.into(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {}: {:?}", key, value);
            default
        }),
        None => default,
    }
}

impl ServiceConfig {
    /// Builds the config from a key lookup such as the Shuttle secret store.
    /// Missing or unparsable keys fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            allowed_origin: lookup("ALLOWED_ORIGIN")
                .filter(|origin| !origin.trim().is_empty())
                .unwrap_or(defaults.allowed_origin),
            event_buffer: parse_or("EVENT_BUFFER", lookup("EVENT_BUFFER"), defaults.event_buffer).max(1),
            sweep_interval_secs: parse_or("SWEEP_INTERVAL_SECS", lookup("SWEEP_INTERVAL_SECS"), defaults.sweep_interval_secs).max(1),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
