//! Shared test doubles for the auth pipeline and gateway handlers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use super::decision::AuthenticatedUser;
use super::provider::{IdentityProvider, ProviderError, ProviderFactory};
use crate::config::{AuthMode, GatewayConfig, SameSitePolicy};

/// Build a JWT-shaped token with the given subject and `exp` claim. The
/// signature segment is junk; only structural validity matters locally.
pub fn make_token(user_id: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({"id": user_id, "type": "authRecord", "exp": exp}).to_string(),
    );
    format!("{header}.{payload}.sig")
}

/// A baseline static-mode configuration for handler tests.
pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        pocketbase_url: "https://pb.example.com".parse().unwrap(),
        pocketbase_url_microsoft: None,
        group_field: Some("members".to_string()),
        mode: AuthMode::Static,
        upstream_url: None,
        allowed_redirect_domains: Some("example.com".to_string()),
        public_url: None,
        static_dir: std::path::PathBuf::from("./build"),
        cookie_same_site: SameSitePolicy::default(),
    }
}

pub fn member_user() -> AuthenticatedUser {
    AuthenticatedUser {
        id: "user1".into(),
        email: "u@example.com".into(),
    }
}

/// Factory producing a scripted provider per request.
pub struct MockFactory(pub Box<dyn Fn() -> MockProvider + Send + Sync>);

impl MockFactory {
    pub fn new(f: impl Fn() -> MockProvider + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl ProviderFactory for MockFactory {
    fn open_session(&self) -> Box<dyn IdentityProvider> {
        Box::new((self.0)())
    }
}

/// Scripted [`IdentityProvider`] with call counters.
#[derive(Default)]
pub struct MockProvider {
    pub user: Option<AuthenticatedUser>,
    pub group_record: Option<Value>,
    pub token_invalid: bool,
    pub refresh_fails: bool,
    pub group_fails: bool,
    pub refresh_calls: usize,
    // Atomic because the lookup borrows the provider shared; the provider
    // must stay Sync for the boxed futures to be Send.
    pub group_calls: AtomicUsize,
    token: Option<String>,
}

impl MockProvider {
    pub fn with_user(mut self, user: AuthenticatedUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_group_record(mut self, record: Value) -> Self {
        self.group_record = Some(record);
        self
    }

    pub fn with_invalid_token(mut self) -> Self {
        self.token_invalid = true;
        self
    }

    pub fn with_refresh_failure(mut self) -> Self {
        self.refresh_fails = true;
        self
    }

    pub fn with_group_failure(mut self) -> Self {
        self.group_fails = true;
        self
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    fn load_session(&mut self, token: &str) -> bool {
        self.token = Some(token.to_string());
        !self.token_invalid
    }

    async fn refresh(&mut self) -> Result<(), ProviderError> {
        self.refresh_calls += 1;
        if self.refresh_fails {
            Err(ProviderError::Status(http::StatusCode::UNAUTHORIZED))
        } else {
            Ok(())
        }
    }

    fn current_user(&self) -> Option<AuthenticatedUser> {
        // MockProvider::default() has no user; tests opt in via with_user,
        // and refresh() does not populate it.
        self.user.clone()
    }

    async fn fetch_group_record(&self, _user_id: &str) -> Result<Value, ProviderError> {
        self.group_calls.fetch_add(1, Ordering::Relaxed);
        if self.group_fails {
            return Err(ProviderError::NotFound);
        }
        self.group_record.clone().ok_or(ProviderError::NotFound)
    }

    fn session_token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
