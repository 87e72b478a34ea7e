use anyhow::{anyhow, Context, Result};
use common_auth::{FailurePolicy, JwtConfig, RevocationPolicy, SigningSecret, DEFAULT_REDIS_PREFIX};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::tokens::{TokenConfig, MAX_ACCESS_TTL_SECONDS};

#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable process configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub jwt: JwtConfig,
    pub access_ttl_seconds: i64,
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub cache_default_ttl_seconds: u64,
    pub revocation: RevocationPolicy,
    pub revocation_sweep_interval: Duration,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl ServiceConfig {
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            access_ttl_seconds: self.access_ttl_seconds,
        }
    }

    /// TTL used when revoking a token id whose expiry is unknown. Never shorter
    /// than the access token lifetime so the entry outlives any token it names.
    pub fn forced_revocation_ttl(&self) -> Duration {
        let access = u64::try_from(self.access_ttl_seconds).unwrap_or(0);
        Duration::from_secs(self.cache_default_ttl_seconds.max(access))
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    from_lookup(|key| env::var(key).ok())
}

/// Build the config from any key lookup. Fails fast when a required value is
/// missing or a present value does not parse.
pub fn from_lookup<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));

    let secret = get("JWT_SECRET").ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;
    let secret = SigningSecret::new(secret).context("Invalid JWT_SECRET")?;
    let issuer = get("JWT_ISSUER").unwrap_or_else(|| "blog-platform".to_string());
    let audience = get("JWT_AUDIENCE").unwrap_or_else(|| "blog-api".to_string());
    let leeway: u32 = parse_or(&get, "JWT_LEEWAY_SECONDS", 0)?;
    let jwt = JwtConfig::new(secret, issuer, audience).with_leeway(leeway);

    let ttl_minutes: i64 = parse_or(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 30)?;
    if ttl_minutes <= 0 {
        return Err(anyhow!("ACCESS_TOKEN_EXPIRE_MINUTES must be positive"));
    }
    let access_ttl_seconds = ttl_minutes
        .checked_mul(60)
        .filter(|seconds| *seconds <= MAX_ACCESS_TTL_SECONDS)
        .ok_or_else(|| {
            anyhow!(
                "ACCESS_TOKEN_EXPIRE_MINUTES must not exceed {} (one year)",
                MAX_ACCESS_TTL_SECONDS / 60
            )
        })?;

    let sweep_seconds: u64 = parse_or(&get, "REVOCATION_SWEEP_SECONDS", 60)?;
    if sweep_seconds == 0 {
        return Err(anyhow!("REVOCATION_SWEEP_SECONDS must be positive"));
    }

    let on_unavailable = get("REVOCATION_FAILURE_POLICY")
        .map(|value| value.parse::<FailurePolicy>())
        .transpose()
        .map_err(|err| anyhow!(err))
        .context("Failed to parse REVOCATION_FAILURE_POLICY")?
        .unwrap_or_default();
    let revocation = RevocationPolicy {
        timeout: Duration::from_millis(parse_or(&get, "REVOCATION_TIMEOUT_MS", 250)?),
        retry_backoff: Duration::from_millis(parse_or(&get, "REVOCATION_RETRY_BACKOFF_MS", 50)?),
        on_unavailable,
    };

    let bootstrap_admin = match (get("BOOTSTRAP_ADMIN_EMAIL"), get("BOOTSTRAP_ADMIN_PASSWORD")) {
        (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
        (None, None) => None,
        _ => {
            return Err(anyhow!(
                "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"
            ))
        }
    };

    Ok(ServiceConfig {
        jwt,
        access_ttl_seconds,
        redis_url: get("REDIS_URL"),
        redis_prefix: get("REVOCATION_KEY_PREFIX").unwrap_or_else(|| DEFAULT_REDIS_PREFIX.to_string()),
        cache_default_ttl_seconds: parse_or(&get, "CACHE_EXPIRE_IN_SECONDS", 300)?,
        revocation,
        revocation_sweep_interval: Duration::from_secs(sweep_seconds),
        host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
        port: parse_or(&get, "PORT", 8000)?,
        cors_origins: get("BACKEND_CORS_ORIGINS")
            .map(|value| parse_list(&value))
            .unwrap_or_default(),
        bootstrap_admin,
    })
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("Invalid {key} '{value}': {err}")),
        None => Ok(default),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split([',', ';', ' '])
        .filter_map(normalize_optional)
        .collect()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
