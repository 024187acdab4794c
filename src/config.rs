//! Gateway configuration.
//!
//! The gateway is configured entirely from environment variables, loaded once
//! at startup into an immutable [`GatewayConfig`] that is passed by reference
//! everywhere. Missing required settings for the selected mode fail fast at
//! startup, never per-request.

use std::{env, path::PathBuf, str::FromStr};

use url::Url;

/// Name of the session cookie carrying the PocketBase token.
pub const SESSION_COOKIE: &str = "pb_auth";

/// Errors raised while loading or validating configuration. All of these are
/// fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    #[error("{name} is invalid: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

/// Operating mode of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Serve protected static content directly (default).
    #[default]
    Static,

    /// Answer a reverse proxy's auth-check subrequests; the proxy owns the
    /// login redirect.
    ForwardAuth,

    /// Forward authorized requests to an upstream origin with identity
    /// headers injected.
    Proxy,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthMode::Static => "static",
            AuthMode::ForwardAuth => "forwardauth",
            AuthMode::Proxy => "proxy",
        };
        f.write_str(name)
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(AuthMode::Static),
            "forwardauth" => Ok(AuthMode::ForwardAuth),
            "proxy" => Ok(AuthMode::Proxy),
            other => Err(format!(
                "unknown mode {other:?}, expected static, forwardauth, or proxy"
            )),
        }
    }
}

/// `SameSite` policy for the session cookie.
///
/// `None` (the default) is required when the login page posts the token from
/// a CDN-hosted script cross-site, and implies `Secure`. `Lax` suits
/// same-site deployments behind a single origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSitePolicy {
    Lax,
    #[default]
    None,
}

impl FromStr for SameSitePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lax" => Ok(SameSitePolicy::Lax),
            "none" => Ok(SameSitePolicy::None),
            other => Err(format!("unknown SameSite policy {other:?}, expected lax or none")),
        }
    }
}

/// Immutable gateway configuration, loaded once at process start.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the PocketBase instance.
    pub pocketbase_url: Url,

    /// Separate PocketBase URL used by the login page for the Microsoft
    /// OAuth flow, when that provider lives on its own instance.
    pub pocketbase_url_microsoft: Option<Url>,

    /// Name of the boolean field on the group-membership record that gates
    /// authorization. When unset, group enforcement is disabled entirely and
    /// authentication alone grants access.
    pub group_field: Option<String>,

    /// Operating mode.
    pub mode: AuthMode,

    /// Upstream origin for proxy mode.
    pub upstream_url: Option<Url>,

    /// Comma-separated list of domains that post-login redirects may target.
    pub allowed_redirect_domains: Option<String>,

    /// Public URL of this gateway, used for same-origin redirect exemption.
    pub public_url: Option<String>,

    /// Directory served in static and forwardauth modes.
    pub static_dir: PathBuf,

    /// `SameSite` policy for the session cookie.
    pub cookie_same_site: SameSitePolicy,
}

impl GatewayConfig {
    /// Load configuration from the environment and validate it for the
    /// selected mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pocketbase_url = require_url("POCKETBASE_URL")?;
        let pocketbase_url_microsoft = optional_url("POCKETBASE_URL_MICROSOFT")?;

        let mode = match optional("AUTH_MODE") {
            Some(raw) => raw
                .parse()
                .map_err(|reason| ConfigError::InvalidVar { name: "AUTH_MODE", reason })?,
            None => AuthMode::default(),
        };

        let cookie_same_site = match optional("COOKIE_SAME_SITE") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::InvalidVar {
                name: "COOKIE_SAME_SITE",
                reason,
            })?,
            None => SameSitePolicy::default(),
        };

        let config = Self {
            pocketbase_url,
            pocketbase_url_microsoft,
            group_field: optional("POCKETBASE_GROUP"),
            mode,
            upstream_url: optional_url("UPSTREAM_URL")?,
            allowed_redirect_domains: optional("ALLOWED_REDIRECT_DOMAINS"),
            public_url: optional("PUBLIC_URL"),
            static_dir: optional("STATIC_DIR").map_or_else(|| PathBuf::from("./build"), PathBuf::from),
            cookie_same_site,
        };

        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation. Proxy mode is unusable without an upstream.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == AuthMode::Proxy && self.upstream_url.is_none() {
            return Err(ConfigError::MissingVar("UPSTREAM_URL"));
        }
        Ok(())
    }
}

/// Read an environment variable, treating empty values as absent.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn require_url(name: &'static str) -> Result<Url, ConfigError> {
    let raw = optional(name).ok_or(ConfigError::MissingVar(name))?;
    Url::parse(&raw).map_err(|e| ConfigError::InvalidVar { name, reason: e.to_string() })
}

fn optional_url(name: &'static str) -> Result<Option<Url>, ConfigError> {
    optional(name)
        .map(|raw| {
            Url::parse(&raw).map_err(|e| ConfigError::InvalidVar { name, reason: e.to_string() })
        })
        .transpose()
}
