//! Environment-driven configuration, loaded once at startup.
//!
//! Grounded on `moltis-config`'s loader/schema split
//! (`crates/config/src/loader.rs`, `schema.rs`), adapted to be
//! env-first: this system has no local config file, only the
//! environment variables listed in `spec.md` §6.

use std::env;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} has an invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("environment variable {name} is required but not set")]
    Missing { name: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBackend {
    Docker,
    None,
}

/// Stage-progression thresholds for the matchmaker, in seconds since a
/// user joined its queue (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageThresholds {
    pub stage1_secs: u64,
    pub stage2_secs: u64,
    pub stage3_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_url: String,
    pub http_bind: String,
    pub http_port: u16,
    pub jwt_secret: String,
    pub question_bank_url: Option<String>,
    pub ai_service_url: Option<String>,
    pub history_url: Option<String>,
    pub sandbox_backend: SandboxBackend,
    pub handshake_timeout: Duration,
    pub stage_thresholds: StageThresholds,
    /// How long a now-empty collaboration room waits for a rejoin
    /// before the session is torn down (`spec.md` §4.4, §4.6).
    pub grace_period: Duration,
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// the defaults documented in `SPEC_FULL.md` §4.7.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store_url: env_or("PEERDEV_STORE_URL", "redis://127.0.0.1:6379"),
            http_bind: env_or("PEERDEV_HTTP_BIND", "0.0.0.0"),
            http_port: env_parsed_or("PEERDEV_HTTP_PORT", 8080)?,
            jwt_secret: env_or("PEERDEV_JWT_SECRET", "dev-only-insecure-secret"),
            question_bank_url: env_opt("PEERDEV_QUESTION_BANK_URL"),
            ai_service_url: env_opt("PEERDEV_AI_SERVICE_URL"),
            history_url: env_opt("PEERDEV_HISTORY_URL"),
            sandbox_backend: env_sandbox_backend()?,
            handshake_timeout: Duration::from_secs(env_parsed_or(
                "PEERDEV_HANDSHAKE_TIMEOUT_SECS",
                30,
            )?),
            grace_period: Duration::from_secs(env_parsed_or("PEERDEV_SESSION_GRACE_SECS", 30)?),
            stage_thresholds: StageThresholds {
                stage1_secs: env_parsed_or("PEERDEV_STAGE_T1_SECS", 100)?,
                stage2_secs: env_parsed_or("PEERDEV_STAGE_T2_SECS", 200)?,
                stage3_secs: env_parsed_or("PEERDEV_STAGE_T3_SECS", 300)?,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_bind, self.http_port)
    }
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_opt(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn env_sandbox_backend() -> Result<SandboxBackend, ConfigError> {
    match env::var("PEERDEV_SANDBOX_BACKEND") {
        Err(_) => Ok(SandboxBackend::Docker),
        Ok(raw) if raw.eq_ignore_ascii_case("docker") => Ok(SandboxBackend::Docker),
        Ok(raw) if raw.eq_ignore_ascii_case("none") => Ok(SandboxBackend::None),
        Ok(raw) => Err(ConfigError::InvalidValue {
            name: "PEERDEV_SANDBOX_BACKEND",
            value: raw,
            reason: "expected \"docker\" or \"none\"".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialises tests that mutate process env, since `std::env` is
    // process-global state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "PEERDEV_STORE_URL",
            "PEERDEV_HTTP_BIND",
            "PEERDEV_HTTP_PORT",
            "PEERDEV_SANDBOX_BACKEND",
        ] {
            unsafe { env::remove_var(var) };
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.store_url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.sandbox_backend, SandboxBackend::Docker);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.grace_period, Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("PEERDEV_HTTP_PORT", "not-a-number") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name, .. } if name == "PEERDEV_HTTP_PORT"));
        unsafe { env::remove_var("PEERDEV_HTTP_PORT") };
    }

    #[test]
    fn rejects_bad_sandbox_backend() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("PEERDEV_SANDBOX_BACKEND", "qemu") };
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name, .. } if name == "PEERDEV_SANDBOX_BACKEND"));
        unsafe { env::remove_var("PEERDEV_SANDBOX_BACKEND") };
    }
}
