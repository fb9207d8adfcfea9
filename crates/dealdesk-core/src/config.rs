use crate::app_config::{AiSettings, AppConfig, Environment};
use crate::ConfigError;

const DEFAULT_AI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_AI_MODEL: &str = "gemini-2.5-flash-preview-05-20";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if values are present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let env = parse_environment(&or_default("DEALDESK_ENV", "development"))?;
    let bind_addr = parse_addr("DEALDESK_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("DEALDESK_LOG_LEVEL", "info");
    let app_id = or_default("DEALDESK_APP_ID", "default-app-id");
    if app_id.trim().is_empty() || app_id.contains('/') {
        return Err(ConfigError::InvalidEnvVar {
            var: "DEALDESK_APP_ID".to_string(),
            reason: "must be non-empty and must not contain '/'".to_string(),
        });
    }

    let database_url = lookup("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
    let db_max_connections = parse_u32("DEALDESK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("DEALDESK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("DEALDESK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let api_keys = or_default("DEALDESK_API_KEYS", "")
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let max_attempts = parse_u32("DEALDESK_AI_MAX_ATTEMPTS", "5")?;
    if max_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "DEALDESK_AI_MAX_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let ai = AiSettings {
        api_key: or_default("GEMINI_API_KEY", ""),
        base_url: or_default("DEALDESK_AI_BASE_URL", DEFAULT_AI_BASE_URL),
        model: or_default("DEALDESK_AI_MODEL", DEFAULT_AI_MODEL),
        timeout_secs: parse_u64("DEALDESK_AI_TIMEOUT_SECS", "60")?,
        max_attempts,
        backoff_base_ms: parse_u64("DEALDESK_AI_BACKOFF_BASE_MS", "1000")?,
    };

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        app_id,
        database_url,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        api_keys,
        ai,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "DEALDESK_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
