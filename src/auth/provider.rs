//! PocketBase identity-provider client.
//!
//! The provider is wrapped behind the [`IdentityProvider`] trait so the
//! pipeline can be exercised without a network. A fresh session is opened
//! per request: the session object carries the current token and user record
//! as internal state, and sharing it across requests would leak one user's
//! session into another's evaluation.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::decision::AuthenticatedUser;

/// Timeout applied to each outbound provider call. Timeouts surface as the
/// corresponding pipeline failure reason; nothing is retried.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from identity-provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no session loaded")]
    NoSession,

    #[error("no record matched")]
    NotFound,

    #[error("provider returned {0}")]
    Status(StatusCode),

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// A per-request session against the identity provider.
#[async_trait]
pub trait IdentityProvider: Send {
    /// Load a raw token into the session, returning whether it is
    /// structurally valid (parseable and not locally expired). No network.
    fn load_session(&mut self, token: &str) -> bool;

    /// Re-validate the session server-side. May rotate the token.
    async fn refresh(&mut self) -> Result<(), ProviderError>;

    /// The authenticated user, available after a successful refresh.
    fn current_user(&self) -> Option<AuthenticatedUser>;

    /// Fetch the single group-membership record keyed by this user id.
    async fn fetch_group_record(&self, user_id: &str) -> Result<Value, ProviderError>;

    /// The current session token, possibly rotated by a refresh.
    fn session_token(&self) -> Option<&str>;
}

/// Opens fresh provider sessions. Held in shared state; the sessions it
/// produces are request-scoped.
pub trait ProviderFactory: Send + Sync {
    fn open_session(&self) -> Box<dyn IdentityProvider>;
}

/// PocketBase client configuration shared across requests: base URL and a
/// connection-pooling HTTP client. No auth state lives here.
pub struct PocketBase {
    base_url: Url,
    http: reqwest::Client,
}

impl PocketBase {
    pub fn new(base_url: Url) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { base_url, http }
    }
}

impl ProviderFactory for PocketBase {
    fn open_session(&self) -> Box<dyn IdentityProvider> {
        Box::new(PocketBaseSession {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            token: None,
            user: None,
        })
    }
}

/// Response of the auth-refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
    record: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    email: String,
}

/// Response of a record-list query.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<Value>,
}

/// A single request's session against a PocketBase instance.
pub struct PocketBaseSession {
    base_url: Url,
    http: reqwest::Client,
    token: Option<String>,
    user: Option<AuthenticatedUser>,
}

impl PocketBaseSession {
    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Malformed(format!("bad endpoint {path}: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for PocketBaseSession {
    fn load_session(&mut self, token: &str) -> bool {
        self.token = Some(token.to_string());
        token_is_unexpired(token)
    }

    async fn refresh(&mut self) -> Result<(), ProviderError> {
        let token = self.token.as_deref().ok_or(ProviderError::NoSession)?;
        let url = self.endpoint("api/collections/users/records/auth-refresh")?;

        let response = self
            .http
            .post(url)
            .header(http::header::AUTHORIZATION, token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        self.token = Some(refreshed.token);
        self.user = refreshed.record.map(|record| AuthenticatedUser {
            id: record.id,
            email: record.email,
        });
        Ok(())
    }

    fn current_user(&self) -> Option<AuthenticatedUser> {
        self.user.clone()
    }

    async fn fetch_group_record(&self, user_id: &str) -> Result<Value, ProviderError> {
        let token = self.token.as_deref().ok_or(ProviderError::NoSession)?;
        let url = self.endpoint("api/collections/groups/records")?;
        let filter = format!("(user_id='{}')", escape_filter_value(user_id));

        let response = self
            .http
            .get(url)
            .header(http::header::AUTHORIZATION, token)
            .query(&[
                ("page", "1"),
                ("perPage", "1"),
                ("skipTotal", "1"),
                ("filter", filter.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        list.items.into_iter().next().ok_or(ProviderError::NotFound)
    }

    fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Escape a value for interpolation into a PocketBase filter string literal.
fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Structural validity check for a PocketBase session token: a decodable JWT
/// payload whose `exp` claim is in the future. The signature is deliberately
/// not verified; the server-side refresh is the authority. Necessary but not
/// sufficient.
fn token_is_unexpired(token: &str) -> bool {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return false;
    };

    let Ok(decoded) = URL_SAFE_NO_PAD.decode(payload) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<Value>(&decoded) else {
        return false;
    };
    let Some(exp) = claims.get("exp").and_then(Value::as_i64) else {
        return false;
    };

    exp > chrono::Utc::now().timestamp()
}
