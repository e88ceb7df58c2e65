//! Runtime configuration.
//!
//! Every knob has a working default; `CastConfig::from_env()` layers
//! `UPNPCAST_*` environment overrides on top, so embedding applications
//! can tune the library without recompiling.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// User-Agent sent on every HTTP request and M-SEARCH.
pub const USER_AGENT: &str = "UPnPCast/1.0";

const ENV_PREFIX: &str = "UPNPCAST_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Facade-level search deadline.
    pub search_timeout_ms: u64,
    /// Age after which a silent device is evicted.
    pub device_liveness_ms: u64,
    /// Capacity of the processed-locations LRU.
    pub max_processed_locations: usize,
    pub http_connect_timeout_ms: u64,
    pub http_read_timeout_ms: u64,
    /// Total SOAP attempts per action (not extra retries).
    pub soap_max_retries: u32,
    /// Linear backoff step between SOAP attempts.
    pub soap_backoff_step_ms: u64,
    pub multicast_ttl: u32,
    pub multicast_port: u16,
    pub multicast_address: String,
    /// Announces for an already processed location inside this window
    /// only refresh the liveness timestamp.
    pub reannounce_window_ms: u64,
    /// Period of the liveness sweeper.
    pub sweep_interval_ms: u64,
    /// TTL of the in-memory description cache.
    pub description_cache_ttl_ms: u64,
    /// Size of the description fetch pool.
    pub description_workers: usize,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            search_timeout_ms: 10_000,
            device_liveness_ms: 300_000,
            max_processed_locations: 200,
            http_connect_timeout_ms: 8_000,
            http_read_timeout_ms: 15_000,
            soap_max_retries: 3,
            soap_backoff_step_ms: 1_000,
            multicast_ttl: 4,
            multicast_port: 1900,
            multicast_address: "239.255.255.250".to_string(),
            reannounce_window_ms: 10_000,
            sweep_interval_ms: 30_000,
            description_cache_ttl_ms: 3_600_000,
            description_workers: 4,
        }
    }
}

impl CastConfig {
    /// Defaults with `UPNPCAST_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        override_u64(&mut self.search_timeout_ms, "SEARCH_TIMEOUT_MS");
        override_u64(&mut self.device_liveness_ms, "DEVICE_LIVENESS_MS");
        override_usize(&mut self.max_processed_locations, "MAX_PROCESSED_LOCATIONS");
        override_u64(&mut self.http_connect_timeout_ms, "HTTP_CONNECT_TIMEOUT_MS");
        override_u64(&mut self.http_read_timeout_ms, "HTTP_READ_TIMEOUT_MS");
        override_u32(&mut self.soap_max_retries, "SOAP_MAX_RETRIES");
        override_u64(&mut self.soap_backoff_step_ms, "SOAP_BACKOFF_STEP_MS");
        override_u32(&mut self.multicast_ttl, "MULTICAST_TTL");
        override_u16(&mut self.multicast_port, "MULTICAST_PORT");
        if let Ok(addr) = env::var(format!("{ENV_PREFIX}MULTICAST_ADDRESS")) {
            self.multicast_address = addr;
        }
        override_u64(&mut self.reannounce_window_ms, "REANNOUNCE_WINDOW_MS");
        override_u64(&mut self.sweep_interval_ms, "SWEEP_INTERVAL_MS");
        override_u64(&mut self.description_cache_ttl_ms, "DESCRIPTION_CACHE_TTL_MS");
        override_usize(&mut self.description_workers, "DESCRIPTION_WORKERS");
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn device_liveness(&self) -> Duration {
        Duration::from_millis(self.device_liveness_ms)
    }

    pub fn reannounce_window(&self) -> Duration {
        Duration::from_millis(self.reannounce_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn soap_backoff_step(&self) -> Duration {
        Duration::from_millis(self.soap_backoff_step_ms)
    }
}

fn env_value(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok()
}

macro_rules! impl_override {
    ($name:ident, $ty:ty) => {
        fn $name(slot: &mut $ty, key: &str) {
            if let Some(raw) = env_value(key) {
                match raw.parse::<$ty>() {
                    Ok(value) => *slot = value,
                    Err(_) => warn!("Ignoring invalid {}{}: '{}'", ENV_PREFIX, key, raw),
                }
            }
        }
    };
}

impl_override!(override_u64, u64);
impl_override!(override_u32, u32);
impl_override!(override_u16, u16);
impl_override!(override_usize, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CastConfig::default();
        assert_eq!(config.search_timeout_ms, 10_000);
        assert_eq!(config.device_liveness_ms, 300_000);
        assert_eq!(config.max_processed_locations, 200);
        assert_eq!(config.http_connect_timeout_ms, 8_000);
        assert_eq!(config.http_read_timeout_ms, 15_000);
        assert_eq!(config.soap_max_retries, 3);
        assert_eq!(config.soap_backoff_step_ms, 1_000);
        assert_eq!(config.multicast_ttl, 4);
        assert_eq!(config.multicast_port, 1900);
        assert_eq!(config.multicast_address, "239.255.255.250");
    }

    #[test]
    fn env_override_applies() {
        // Env vars are process-global; use a key no other test touches.
        unsafe { env::set_var("UPNPCAST_SOAP_MAX_RETRIES", "5") };
        let config = CastConfig::from_env();
        assert_eq!(config.soap_max_retries, 5);
        unsafe { env::remove_var("UPNPCAST_SOAP_MAX_RETRIES") };
    }

    #[test]
    fn invalid_env_override_is_ignored() {
        unsafe { env::set_var("UPNPCAST_MULTICAST_TTL", "not-a-number") };
        let config = CastConfig::from_env();
        assert_eq!(config.multicast_ttl, 4);
        unsafe { env::remove_var("UPNPCAST_MULTICAST_TTL") };
    }
}
