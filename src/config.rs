// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the parsed [`Config`]
//! loaded once at startup. Invalid values are fatal.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `TLS_CERT_PATH` | PEM certificate chain; enables HTTPS with `TLS_KEY_PATH` | unset (plain HTTP) |
//! | `TLS_KEY_PATH` | PEM private key | unset |
//! | `AUTH_TOKEN_SECRET` | HS256 signing secret, at least 32 bytes | Required |
//! | `AUTH_TOKEN_TTL_SECS` | Token lifetime | `7200` |
//! | `AUTH_SESSION_TTL_SECS` | Session record TTL | `7200` |
//! | `AUTH_SESSION_SLIDING` | Renew the session TTL on each request | `false` |
//! | `AUTH_HEADER` | Header carrying the bearer token | `authorization` |
//! | `AUTH_TOKEN_PREFIX` | Token prefix within the header | `Bearer` |
//! | `AUTH_ANONYMOUS_PATHS` | Comma-separated allow-list (`/x/**` = prefix) | see [`DEFAULT_ANONYMOUS_PATHS`] |
//! | `AUTH_TRUST_FLAG_HEADER` | Internal trust marker flag header | `x-gateway-verified` |
//! | `AUTH_TRUST_SERVICE_HEADER` | Internal trust marker service header | `x-gateway-service` |
//! | `AUTH_TRUST_SECRET` | Shared secret internal callers present in `x-gateway-secret` to have the trust marker honoured, at least 32 bytes | unset (marker never honoured) |
//! | `AUTH_SERVICE_NAME` | Service tag injected by the edge | `relational-gatekeeper` |
//! | `AUTH_MAX_FAILED_LOGINS` | Failed logins before lockout | `5` |
//! | `AUTH_DEPENDENCY_TIMEOUT_MS` | Deadline for cache and credential store calls | `2000` |
//! | `PERMISSION_CACHE_TTL_SECS` | Permission/menu cache TTL | `1800` |
//! | `PERMISSION_MENU_SORT` | Sibling order: `order`, `name` or `id` | `order` |
//! | `CACHE_CAPACITY` | Max entries in the in-process cache | `100000` |
//! | `PASSWORD_RESET_CODE_TTL_SECS` | Reset code lifetime | `300` |
//! | `GATEWAY_ROUTES` | Comma-separated `prefix=upstream-url` pairs | empty |
//! | `GATEWAY_UPSTREAM_TIMEOUT_MS` | Upstream request timeout | `30000` |
//! | `SEED_ADMIN_PASSWORD` | Create an `admin` account at startup | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! TTLs must lie in `1..=`[`MAX_TTL_SECS`] seconds and timeouts in
//! `1..=`[`MAX_TIMEOUT_MS`] milliseconds.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderName;

use crate::rbac::MenuSortKey;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";

/// Shared HS256 secret. Startup fails if absent or shorter than 32 bytes.
pub const AUTH_TOKEN_SECRET_ENV: &str = "AUTH_TOKEN_SECRET";
pub const AUTH_TOKEN_TTL_SECS_ENV: &str = "AUTH_TOKEN_TTL_SECS";
pub const AUTH_SESSION_TTL_SECS_ENV: &str = "AUTH_SESSION_TTL_SECS";
pub const AUTH_SESSION_SLIDING_ENV: &str = "AUTH_SESSION_SLIDING";
pub const AUTH_HEADER_ENV: &str = "AUTH_HEADER";
pub const AUTH_TOKEN_PREFIX_ENV: &str = "AUTH_TOKEN_PREFIX";
pub const AUTH_ANONYMOUS_PATHS_ENV: &str = "AUTH_ANONYMOUS_PATHS";
pub const AUTH_TRUST_FLAG_HEADER_ENV: &str = "AUTH_TRUST_FLAG_HEADER";
pub const AUTH_TRUST_SERVICE_HEADER_ENV: &str = "AUTH_TRUST_SERVICE_HEADER";
pub const AUTH_SERVICE_NAME_ENV: &str = "AUTH_SERVICE_NAME";
pub const AUTH_TRUST_SECRET_ENV: &str = "AUTH_TRUST_SECRET";
pub const AUTH_MAX_FAILED_LOGINS_ENV: &str = "AUTH_MAX_FAILED_LOGINS";
pub const AUTH_DEPENDENCY_TIMEOUT_MS_ENV: &str = "AUTH_DEPENDENCY_TIMEOUT_MS";
pub const PERMISSION_CACHE_TTL_SECS_ENV: &str = "PERMISSION_CACHE_TTL_SECS";
pub const PERMISSION_MENU_SORT_ENV: &str = "PERMISSION_MENU_SORT";
pub const CACHE_CAPACITY_ENV: &str = "CACHE_CAPACITY";
pub const PASSWORD_RESET_CODE_TTL_SECS_ENV: &str = "PASSWORD_RESET_CODE_TTL_SECS";
pub const GATEWAY_ROUTES_ENV: &str = "GATEWAY_ROUTES";
pub const GATEWAY_UPSTREAM_TIMEOUT_MS_ENV: &str = "GATEWAY_UPSTREAM_TIMEOUT_MS";
pub const SEED_ADMIN_PASSWORD_ENV: &str = "SEED_ADMIN_PASSWORD";

/// Log output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Upper bound for every `*_TTL_SECS` value (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for every `*_TIMEOUT_MS` value (ten minutes).
pub const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Minimum length of `AUTH_TRUST_SECRET`.
pub const MIN_TRUST_SECRET_LEN: usize = 32;

/// Paths reachable without a bearer token unless overridden.
pub const DEFAULT_ANONYMOUS_PATHS: &str =
    "/health/**,/docs/**,/api-doc/**,/v1/auth/login,/v1/auth/password/code,/v1/auth/password/reset";

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// TLS material locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Parsed service configuration.
#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub session_ttl: Duration,
    pub session_sliding: bool,
    pub auth_header: HeaderName,
    pub token_prefix: String,
    pub anonymous_paths: Vec<String>,
    pub trust_flag_header: HeaderName,
    pub trust_service_header: HeaderName,
    pub service_name: String,
    /// Internal callers must present this to have the trust marker honoured.
    pub trust_secret: Option<Vec<u8>>,
    pub max_failed_logins: u32,
    pub dependency_timeout: Duration,
    pub permission_cache_ttl: Duration,
    pub menu_sort: MenuSortKey,
    pub cache_capacity: usize,
    pub password_reset_code_ttl: Duration,
    pub gateway_routes: Vec<(String, String)>,
    pub gateway_timeout: Duration,
    pub seed_admin_password: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("tls", &self.tls)
            .field("token_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("session_sliding", &self.session_sliding)
            .field("auth_header", &self.auth_header)
            .field("token_prefix", &self.token_prefix)
            .field("anonymous_paths", &self.anonymous_paths)
            .field("service_name", &self.service_name)
            .field("trust_secret", &self.trust_secret.as_ref().map(|_| "<redacted>"))
            .field("max_failed_logins", &self.max_failed_logins)
            .field("dependency_timeout", &self.dependency_timeout)
            .field("permission_cache_ttl", &self.permission_cache_ttl)
            .field("menu_sort", &self.menu_sort)
            .field("cache_capacity", &self.cache_capacity)
            .field("gateway_routes", &self.gateway_routes)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = var(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&var, PORT_ENV, 8080)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid(HOST_ENV, &host, e))?;

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV)),
        };

        let token_secret = var(AUTH_TOKEN_SECRET_ENV)
            .ok_or(ConfigError::Missing(AUTH_TOKEN_SECRET_ENV))?
            .into_bytes();

        let trust_secret = match var(AUTH_TRUST_SECRET_ENV) {
            Some(secret) if secret.len() < MIN_TRUST_SECRET_LEN => {
                return Err(invalid(
                    AUTH_TRUST_SECRET_ENV,
                    "<redacted>",
                    format!("must be at least {MIN_TRUST_SECRET_LEN} bytes"),
                ));
            }
            secret => secret.map(String::into_bytes),
        };

        let menu_sort_raw = var(PERMISSION_MENU_SORT_ENV).unwrap_or_else(|| "order".to_string());
        let menu_sort = menu_sort_raw
            .parse()
            .map_err(|e| invalid(PERMISSION_MENU_SORT_ENV, &menu_sort_raw, e))?;

        let max_failed_logins: u32 = parse_or(&var, AUTH_MAX_FAILED_LOGINS_ENV, 5)?;
        if max_failed_logins == 0 {
            return Err(invalid(AUTH_MAX_FAILED_LOGINS_ENV, "0", "must be at least 1"));
        }

        Ok(Self {
            bind_addr,
            tls,
            token_secret,
            token_ttl: parse_ttl(&var, AUTH_TOKEN_TTL_SECS_ENV, 7200)?,
            session_ttl: parse_ttl(&var, AUTH_SESSION_TTL_SECS_ENV, 7200)?,
            session_sliding: parse_bool(&var, AUTH_SESSION_SLIDING_ENV, false)?,
            auth_header: parse_header(&var, AUTH_HEADER_ENV, "authorization")?,
            token_prefix: var(AUTH_TOKEN_PREFIX_ENV)
                .map(|p| p.trim().to_string())
                .unwrap_or_else(|| "Bearer".to_string()),
            anonymous_paths: split_list(
                &var(AUTH_ANONYMOUS_PATHS_ENV).unwrap_or_else(|| DEFAULT_ANONYMOUS_PATHS.to_string()),
            ),
            trust_flag_header: parse_header(&var, AUTH_TRUST_FLAG_HEADER_ENV, "x-gateway-verified")?,
            trust_service_header: parse_header(&var, AUTH_TRUST_SERVICE_HEADER_ENV, "x-gateway-service")?,
            service_name: var(AUTH_SERVICE_NAME_ENV).unwrap_or_else(|| "relational-gatekeeper".to_string()),
            trust_secret,
            max_failed_logins,
            dependency_timeout: parse_timeout(&var, AUTH_DEPENDENCY_TIMEOUT_MS_ENV, 2000)?,
            permission_cache_ttl: parse_ttl(&var, PERMISSION_CACHE_TTL_SECS_ENV, 1800)?,
            menu_sort,
            cache_capacity: parse_or(&var, CACHE_CAPACITY_ENV, 100_000)?,
            password_reset_code_ttl: parse_ttl(&var, PASSWORD_RESET_CODE_TTL_SECS_ENV, 300)?,
            gateway_routes: parse_routes(var(GATEWAY_ROUTES_ENV).as_deref().unwrap_or(""))?,
            gateway_timeout: parse_timeout(&var, GATEWAY_UPSTREAM_TIMEOUT_MS_ENV, 30_000)?,
            seed_admin_password: var(SEED_ADMIN_PASSWORD_ENV),
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, F>(var: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e| invalid(name, &raw, e)),
        None => Ok(default),
    }
}

fn parse_bounded<F>(var: &F, name: &'static str, default: u64, max: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(var, name, default)?;
    if value == 0 || value > max {
        return Err(invalid(name, &value.to_string(), format!("must be between 1 and {max}")));
    }
    Ok(value)
}

fn parse_ttl<F>(var: &F, name: &'static str, default_secs: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_bounded(var, name, default_secs, MAX_TTL_SECS).map(Duration::from_secs)
}

fn parse_timeout<F>(var: &F, name: &'static str, default_ms: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_bounded(var, name, default_ms, MAX_TIMEOUT_MS).map(Duration::from_millis)
}

fn parse_bool<F>(var: &F, name: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(name, &raw, "expected a boolean")),
        },
        None => Ok(default),
    }
}

fn parse_header<F>(var: &F, name: &'static str, default: &str) -> Result<HeaderName, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var(name).unwrap_or_else(|| default.to_string());
    HeaderName::from_bytes(raw.trim().to_ascii_lowercase().as_bytes()).map_err(|e| invalid(name, &raw, e))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `prefix=url` pairs.
fn parse_routes(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    split_list(raw)
        .into_iter()
        .map(|entry| {
            let (prefix, upstream) = entry
                .split_once('=')
                .ok_or_else(|| invalid(GATEWAY_ROUTES_ENV, &entry, "expected prefix=url"))?;
            let prefix = prefix.trim();
            if !prefix.starts_with('/') {
                return Err(invalid(GATEWAY_ROUTES_ENV, &entry, "prefix must start with '/'"));
            }
            let upstream = url::Url::parse(upstream.trim())
                .map_err(|e| invalid(GATEWAY_ROUTES_ENV, &entry, e))?;
            Ok((
                prefix.trim_end_matches('/').to_string(),
                upstream.as_str().trim_end_matches('/').to_string(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET)]).unwrap();

        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.tls.is_none());
        assert_eq!(config.token_prefix, "Bearer");
        assert_eq!(config.auth_header.as_str(), "authorization");
        assert_eq!(config.max_failed_logins, 5);
        assert_eq!(config.menu_sort, MenuSortKey::Order);
        assert!(!config.session_sliding);
        assert!(config.anonymous_paths.contains(&"/v1/auth/login".to_string()));
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::Missing(AUTH_TOKEN_SECRET_ENV))
        ));
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (PORT_ENV, "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: PORT_ENV, .. }));
    }

    #[test]
    fn tls_requires_both_paths() {
        let err = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (TLS_CERT_PATH_ENV, "/c.pem")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(TLS_KEY_PATH_ENV)));
    }

    #[test]
    fn gateway_routes_parse() {
        let config = load(&[
            (AUTH_TOKEN_SECRET_ENV, SECRET),
            (GATEWAY_ROUTES_ENV, "/orders/=http://orders:9000/, /billing=https://billing.internal"),
        ])
        .unwrap();

        assert_eq!(
            config.gateway_routes,
            vec![
                ("/orders".to_string(), "http://orders:9000".to_string()),
                ("/billing".to_string(), "https://billing.internal".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_route_is_rejected() {
        assert!(load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (GATEWAY_ROUTES_ENV, "orders")]).is_err());
        assert!(load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (GATEWAY_ROUTES_ENV, "/o=not a url")]).is_err());
    }

    #[test]
    fn ttls_must_be_positive_and_bounded() {
        for name in [
            AUTH_TOKEN_TTL_SECS_ENV,
            AUTH_SESSION_TTL_SECS_ENV,
            PERMISSION_CACHE_TTL_SECS_ENV,
            PASSWORD_RESET_CODE_TTL_SECS_ENV,
        ] {
            for value in ["0", "31536001", "9223372036854775808"] {
                let err = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (name, value)]).unwrap_err();
                assert!(matches!(err, ConfigError::Invalid { name: n, .. } if n == name), "{name}={value}");
            }
        }

        let config = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (AUTH_TOKEN_TTL_SECS_ENV, "31536000")]).unwrap();
        assert_eq!(config.token_ttl, Duration::from_secs(MAX_TTL_SECS));
    }

    #[test]
    fn timeouts_must_be_positive_and_bounded() {
        for name in [AUTH_DEPENDENCY_TIMEOUT_MS_ENV, GATEWAY_UPSTREAM_TIMEOUT_MS_ENV] {
            assert!(load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (name, "0")]).is_err());
            assert!(load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (name, "600001")]).is_err());
        }
    }

    #[test]
    fn trust_secret_is_optional_but_long() {
        assert!(load(&[(AUTH_TOKEN_SECRET_ENV, SECRET)]).unwrap().trust_secret.is_none());

        let err = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (AUTH_TRUST_SECRET_ENV, "short")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: AUTH_TRUST_SECRET_ENV, .. }));
        assert!(!err.to_string().contains("short"));

        let config = load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (AUTH_TRUST_SECRET_ENV, SECRET)]).unwrap();
        assert_eq!(config.trust_secret.as_deref(), Some(SECRET.as_bytes()));
    }

    #[test]
    fn menu_sort_and_sliding_parse() {
        let config = load(&[
            (AUTH_TOKEN_SECRET_ENV, SECRET),
            (PERMISSION_MENU_SORT_ENV, "name"),
            (AUTH_SESSION_SLIDING_ENV, "TRUE"),
        ])
        .unwrap();
        assert_eq!(config.menu_sort, MenuSortKey::Name);
        assert!(config.session_sliding);

        assert!(load(&[(AUTH_TOKEN_SECRET_ENV, SECRET), (PERMISSION_MENU_SORT_ENV, "weight")]).is_err());
    }
}
