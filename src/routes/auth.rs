//! Auth endpoints: the ForwardAuth verify hook, the login page, the
//! credential-exchange endpoint, and logout.
//!
//! These paths always bypass the protected dispatch; without that the
//! gateway would lock itself out of its own login flow.

use axum::{
    Json,
    body::Body,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite as CookieSameSite, time::Duration as CookieDuration},
};

use crate::auth::{AuthDecision, AuthenticatedUser, evaluate, redirect::safe_redirect_url};
use crate::config::{GatewayConfig, SESSION_COOKIE, SameSitePolicy};
use crate::pages;
use crate::routes::{AppState, error::GatewayError};

pub const X_AUTH_USER: HeaderName = HeaderName::from_static("x-auth-user");
pub const X_AUTH_EMAIL: HeaderName = HeaderName::from_static("x-auth-email");
pub const X_AUTH_GROUPS: HeaderName = HeaderName::from_static("x-auth-groups");

/// Identity headers set on successful verdicts and injected into proxied
/// requests. `X-Auth-Groups` carries the configured group field name, not
/// its value.
pub fn insert_auth_headers(
    headers: &mut HeaderMap,
    user: &AuthenticatedUser,
    group_field: Option<&str>,
) {
    let value = |s: &str| HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""));
    headers.insert(X_AUTH_USER, value(&user.id));
    headers.insert(X_AUTH_EMAIL, value(&user.email));
    if let Some(group_field) = group_field {
        headers.insert(X_AUTH_GROUPS, value(group_field));
    }
}

/// `GET /auth/verify` — the ForwardAuth hook. The reverse proxy mirrors this
/// endpoint's status code; on 200 it copies the `X-Auth-*` headers onto the
/// real request.
#[tracing::instrument(name = "auth.verify", skip_all)]
pub async fn verify(State(state): State<AppState>, cookies: Cookies) -> Response {
    let token = cookies.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let mut session = state.provider.open_session();
    let decision = evaluate(
        session.as_mut(),
        token.as_deref(),
        state.config.group_field.as_deref(),
    )
    .await;

    match decision {
        AuthDecision::Unauthenticated(reason) => {
            tracing::debug!(?reason, "verify: unauthenticated");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
        AuthDecision::Unauthorized { user, reason } => {
            tracing::debug!(user_id = %user.id, ?reason, "verify: unauthorized");
            (StatusCode::FORBIDDEN, "Forbidden - not a group member").into_response()
        }
        AuthDecision::Authorized(user) => {
            let mut response = (StatusCode::OK, "OK").into_response();
            insert_auth_headers(
                response.headers_mut(),
                &user,
                state.config.group_field.as_deref(),
            );
            response
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    /// Post-login destination, validated before it reaches the page.
    pub rd: Option<String>,
}

/// `GET /login` — the login page. The page runs the provider's OAuth flow
/// client-side and posts the token back to `/api/cookie`.
#[tracing::instrument(name = "auth.login_page", skip_all)]
pub async fn login_page(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Html<String> {
    let config = &state.config;
    let rd = safe_redirect_url(
        query.rd.as_deref(),
        config.allowed_redirect_domains.as_deref(),
        config.public_url.as_deref(),
        "",
    );

    Html(pages::login_page(
        config.pocketbase_url.as_str(),
        config.pocketbase_url_microsoft.as_ref().map(|u| u.as_str()),
        (!rd.is_empty()).then_some(rd.as_str()),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CookieExchangeRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `POST /api/cookie` — turns a client-held OAuth token into the HTTP-only
/// session cookie. The token is stored as-is; every protected request
/// re-validates it against the provider, so a junk token only buys 401s.
#[tracing::instrument(name = "auth.exchange_cookie", skip_all)]
pub async fn exchange_cookie(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Result<Json<CookieExchangeRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let Json(request) = body.map_err(|_| GatewayError::InvalidJson)?;
    let token = request
        .token
        .filter(|t| !t.is_empty())
        .ok_or(GatewayError::TokenRequired)?;

    cookies.add(build_session_cookie(token, &state.config));
    Ok(Json(json!({"success": true})))
}

/// `POST /api/logout` — clears the session cookie and redirects to `/`,
/// whether or not a cookie was present.
#[tracing::instrument(name = "auth.logout", skip_all)]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    cookies.add(build_removal_cookie(&state.config));

    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, "/")
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::FOUND.into_response())
}

fn same_site(config: &GatewayConfig) -> CookieSameSite {
    match config.cookie_same_site {
        SameSitePolicy::Lax => CookieSameSite::Lax,
        SameSitePolicy::None => CookieSameSite::None,
    }
}

/// Session cookie carrying the provider token. `SameSite=None` requires
/// `Secure`; `Lax` deployments sit behind a single origin.
pub fn build_session_cookie(token: String, config: &GatewayConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(same_site(config))
        .secure(config.cookie_same_site == SameSitePolicy::None)
        .build()
}

/// Clearing cookie: empty value, immediate expiry.
pub fn build_removal_cookie(config: &GatewayConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(same_site(config))
        .secure(config.cookie_same_site == SameSitePolicy::None)
        .max_age(CookieDuration::ZERO)
        .build()
}
