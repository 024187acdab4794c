//! Protected dispatch: turns an [`AuthDecision`] into a response according
//! to the active gateway mode.
//!
//! All three modes share the pipeline as their only decision source; they
//! differ solely in how a decision is rendered. A request is never forwarded
//! upstream in any state other than `Authorized`.

pub mod proxy;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tower::ServiceExt;
use tower_cookies::Cookies;

use crate::auth::{AuthDecision, evaluate, redirect::safe_redirect_url};
use crate::config::{AuthMode, SESSION_COOKIE};
use crate::pages;
use crate::routes::AppState;

/// Fallback handler for every path that is not an auth or health endpoint.
#[tracing::instrument(name = "gateway.dispatch", skip_all, fields(path = %req.uri().path()))]
pub async fn dispatch(State(state): State<AppState>, cookies: Cookies, req: Request) -> Response {
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
            tracing::debug!(?reason, "request denied: unauthenticated");
            deny_unauthenticated(&state, &req)
        }
        AuthDecision::Unauthorized { user, reason } => {
            tracing::debug!(user_id = %user.id, ?reason, "request denied: unauthorized");
            (
                StatusCode::FORBIDDEN,
                Html(pages::not_a_member_page(
                    &user.email,
                    state.config.group_field.as_deref(),
                )),
            )
                .into_response()
        }
        AuthDecision::Authorized(user) => match state.config.mode {
            AuthMode::Proxy => proxy::forward(&state, &user, req).await,
            AuthMode::Static | AuthMode::ForwardAuth => serve_static(&state, req).await,
        },
    }
}

/// Render an unauthenticated denial per mode. In forwardauth mode the
/// reverse proxy owns the login redirect, so a bare 401 suffices; in proxy
/// mode the login page carries the original URL so a successful login lands
/// the user back where they were.
fn deny_unauthenticated(state: &AppState, req: &Request) -> Response {
    let config = &state.config;
    match config.mode {
        AuthMode::ForwardAuth => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
        AuthMode::Static => (StatusCode::UNAUTHORIZED, login_page(state, None)).into_response(),
        AuthMode::Proxy => {
            let requested = original_request_url(req);
            let rd = safe_redirect_url(
                Some(&requested),
                config.allowed_redirect_domains.as_deref(),
                config.public_url.as_deref(),
                "",
            );
            let rd = (!rd.is_empty()).then_some(rd);
            (StatusCode::UNAUTHORIZED, login_page(state, rd.as_deref())).into_response()
        }
    }
}

fn login_page(state: &AppState, rd: Option<&str>) -> Html<String> {
    let config = &state.config;
    Html(pages::login_page(
        config.pocketbase_url.as_str(),
        config.pocketbase_url_microsoft.as_ref().map(|u| u.as_str()),
        rd,
    ))
}

/// Reconstruct the absolute URL the client asked for, trusting
/// `X-Forwarded-Proto` for the scheme when present.
fn original_request_url(req: &Request) -> String {
    let scheme = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}{}", req.uri())
}

/// Serve the protected content directory.
async fn serve_static(state: &AppState, req: Request) -> Response {
    let response = state
        .static_files
        .clone()
        .oneshot(req)
        .await
        .unwrap_or_else(|err| match err {});
    response.map(Body::new)
}
