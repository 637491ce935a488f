// =============================================================================
// Configuration — environment-supplied settings, loaded once at startup
// =============================================================================
//
// Everything comes from the environment (optionally seeded by a .env file in
// main). The loaded `Config` is owned by the process and passed by reference;
// no module-level state, so tests can construct whatever configuration they
// need.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default worker tick interval in seconds.
const DEFAULT_INTERVAL_SECS: u64 = 900;

/// Cache TTLs by class.
const SNAPSHOT_TTL_SECS: u64 = 30;
const HISTORY_TTL_SECS: u64 = 15 * 60;
const ANALYSIS_TTL_SECS: u64 = 15 * 60;

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub polygon_api_key: String,
    pub polygon_base_url: String,
    pub db_path: PathBuf,
    pub bind_addr: String,
    pub worker: WorkerConfig,
    pub smtp: SmtpConfig,
    pub cache: CacheTtls,
}

/// Alert-worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Overrides the SMTP default recipient for worker notifications.
    pub destination: Option<String>,
}

/// SMTP delivery settings, mirroring the env contract of the original
/// service. Delivery is considered enabled when a host is set and either a
/// username is present or anonymous sending is explicitly allowed.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub starttls: bool,
    pub allow_anonymous: bool,
    pub from: String,
    pub default_to: Option<String>,
}

impl SmtpConfig {
    pub fn enabled(&self) -> bool {
        !self.host.is_empty() && (!self.username.is_empty() || self.allow_anonymous)
    }
}

/// TTLs for the three response-cache classes.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub snapshot: Duration,
    pub history: Duration,
    pub analysis: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            snapshot: Duration::from_secs(SNAPSHOT_TTL_SECS),
            history: Duration::from_secs(HISTORY_TTL_SECS),
            analysis: Duration::from_secs(ANALYSIS_TTL_SECS),
        }
    }
}

impl Config {
    /// Assemble configuration from the process environment.
    pub fn from_env() -> Self {
        let polygon_api_key = env_string("POLYGON_API_KEY", "");
        if polygon_api_key.is_empty() {
            warn!("POLYGON_API_KEY is not set; upstream requests will fail");
        }

        let smtp_user = env_string("SMTP_USER", "");
        let from_fallback = if smtp_user.is_empty() {
            "alerts@localhost".to_string()
        } else {
            smtp_user.clone()
        };

        Self {
            polygon_api_key,
            polygon_base_url: env_string("POLYGON_BASE_URL", "https://api.polygon.io"),
            db_path: PathBuf::from(env_string("APP_DB_PATH", "data.db")),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8080"),
            worker: WorkerConfig {
                enabled: parse_flag(std::env::var("ALERT_WORKER_ENABLED").ok(), true),
                interval: Duration::from_secs(
                    std::env::var("ALERT_INTERVAL_SECONDS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(DEFAULT_INTERVAL_SECS),
                ),
                destination: std::env::var("ALERT_EMAIL_TO").ok().filter(|s| !s.is_empty()),
            },
            smtp: SmtpConfig {
                host: env_string("SMTP_HOST", ""),
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(587),
                username: smtp_user,
                password: env_string("SMTP_PASS", ""),
                starttls: parse_flag(std::env::var("SMTP_STARTTLS").ok(), true),
                allow_anonymous: parse_flag(std::env::var("SMTP_ALLOW_ANON").ok(), false),
                from: env_string("EMAIL_FROM", &from_fallback),
                default_to: std::env::var("EMAIL_TO").ok().filter(|s| !s.is_empty()),
            },
            cache: CacheTtls::default(),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Lenient boolean parsing: recognised truthy/falsy spellings win, anything
/// else (including absence) takes the default.
fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_recognises_common_spellings() {
        assert!(parse_flag(Some("true".into()), false));
        assert!(parse_flag(Some("1".into()), false));
        assert!(parse_flag(Some("YES".into()), false));
        assert!(!parse_flag(Some("false".into()), true));
        assert!(!parse_flag(Some("off".into()), true));
    }

    #[test]
    fn parse_flag_falls_back_on_garbage_or_absence() {
        assert!(parse_flag(None, true));
        assert!(!parse_flag(None, false));
        assert!(parse_flag(Some("maybe".into()), true));
    }

    #[test]
    fn smtp_enabled_requires_host_and_identity() {
        let mut smtp = SmtpConfig {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: String::new(),
            starttls: true,
            allow_anonymous: false,
            from: "alerts@localhost".into(),
            default_to: None,
        };
        assert!(!smtp.enabled());

        smtp.host = "smtp.example.com".into();
        assert!(!smtp.enabled(), "host alone is not enough");

        smtp.username = "mailer".into();
        assert!(smtp.enabled());

        smtp.username.clear();
        smtp.allow_anonymous = true;
        assert!(smtp.enabled(), "anonymous mode substitutes for a login");
    }

    #[test]
    fn default_cache_ttls_match_the_design() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.snapshot, Duration::from_secs(30));
        assert_eq!(ttls.history, Duration::from_secs(900));
        assert_eq!(ttls.analysis, Duration::from_secs(900));
    }
}
