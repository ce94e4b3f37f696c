use crate::app_config::{AppConfig, Environment};
use crate::coordinates::RegionFilter;
use crate::ConfigError;

/// Desktop browser identity sent with page fetches. Map providers serve a
/// stripped-down document to unknown clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but cannot be parsed.
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
/// Returns `ConfigError` if a value is present but cannot be parsed.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can feed a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let bind_addr = or_default("MAPLINK_BIND_ADDR", "0.0.0.0:3000")
        .parse::<SocketAddr>()
        .map_err(|e| invalid("MAPLINK_BIND_ADDR", e.to_string()))?;

    let http_timeout_secs = or_default("MAPLINK_HTTP_TIMEOUT_SECS", "30")
        .parse::<u64>()
        .map_err(|e| invalid("MAPLINK_HTTP_TIMEOUT_SECS", e.to_string()))?;
    if http_timeout_secs == 0 {
        return Err(invalid(
            "MAPLINK_HTTP_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }

    let env = parse_environment(&or_default("MAPLINK_ENV", "development"))?;
    let log_level = or_default("MAPLINK_LOG_LEVEL", "info");
    let user_agent = or_default("MAPLINK_USER_AGENT", DEFAULT_USER_AGENT);

    let browser_path = lookup("MAPLINK_BROWSER_PATH")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from);

    let region_filter = or_default("MAPLINK_REGION_FILTER", "southwest")
        .parse::<RegionFilter>()
        .map_err(|reason| invalid("MAPLINK_REGION_FILTER", reason))?;

    let render_enabled = parse_bool(&or_default("MAPLINK_RENDER_ENABLED", "true"))
        .ok_or_else(|| invalid("MAPLINK_RENDER_ENABLED", "expected true or false".to_string()))?;

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        http_timeout_secs,
        user_agent,
        browser_path,
        region_filter,
        render_enabled,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MAPLINK_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
