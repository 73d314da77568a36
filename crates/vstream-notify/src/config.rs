//! Notifier configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Keepalive and room lifecycle settings for the WebSocket subsystem.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Mount `/ws` and deliver published events
    pub enabled: bool,
    /// Interval between liveness probes
    pub ping_interval: Duration,
    /// Read deadline, reset by any inbound frame
    pub pong_timeout: Duration,
    /// Empty rooms idle for this long are evicted
    pub room_idle_ttl: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ping_interval: Duration::from_millis(25_000),
            pong_timeout: Duration::from_millis(60_000),
            room_idle_ttl: Duration::from_secs(300),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Environment (development/production)
    pub environment: String,
    /// HS256 key for caller credentials
    pub auth_sign_key: String,
    /// HS256 key for encoder upload tokens
    pub upload_sign_key: String,
    /// Optional JSON file seeding the in-memory catalog
    pub catalog_seed_path: Option<PathBuf>,
    pub ws: WsConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            auth_sign_key: String::new(),
            upload_sign_key: String::new(),
            catalog_seed_path: None,
            ws: WsConfig::default(),
        }
    }
}

impl NotifyConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup; missing or unparsable
    /// values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        // Zero periods would stall the keepalive timer; treat them as unset.
        let parsed = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
        };

        Self {
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: lookup("API_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            auth_sign_key: lookup("AUTH_SIGN_KEY").unwrap_or_default(),
            upload_sign_key: lookup("UPLOAD_SIGN_KEY").unwrap_or_default(),
            catalog_seed_path: lookup("CATALOG_SEED_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            ws: WsConfig {
                enabled: lookup("WS_ENABLED")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(defaults.ws.enabled),
                ping_interval: parsed("WS_PING_INTERVAL_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.ws.ping_interval),
                pong_timeout: parsed("WS_PONG_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.ws.pong_timeout),
                room_idle_ttl: parsed("ROOM_IDLE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.ws.room_idle_ttl),
            },
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        is_production_env(&self.environment)
    }
}

impl WsConfig {
    /// Replace zero durations with defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let or_default = |value: Duration, fallback: Duration| {
            if value.is_zero() {
                fallback
            } else {
                value
            }
        };
        Self {
            enabled: self.enabled,
            ping_interval: or_default(self.ping_interval, defaults.ping_interval),
            pong_timeout: or_default(self.pong_timeout, defaults.pong_timeout),
            room_idle_ttl: or_default(self.room_idle_ttl, defaults.room_idle_ttl),
        }
    }
}

/// Whether an `ENVIRONMENT` value names production, in any case.
pub fn is_production_env(environment: &str) -> bool {
    environment.trim().eq_ignore_ascii_case("production")
}
