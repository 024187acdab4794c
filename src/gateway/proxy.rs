//! Upstream forwarding for proxy mode.
//!
//! Requests reach this module only with an `Authorized` decision. The
//! forwarder injects the `X-Auth-*` identity headers and strips any inbound
//! ones first: a client must never be able to impersonate a user by
//! supplying them itself. Connection upgrades (WebSocket) are spliced
//! through end-to-end.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use url::Url;

use crate::auth::AuthenticatedUser;
use crate::routes::{AppState, auth::insert_auth_headers, error::GatewayError};

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Connection-scoped headers that must not cross the proxy.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    [
        header::CONNECTION,
        KEEP_ALIVE,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
    .contains(name)
}

fn is_identity_header(name: &HeaderName) -> bool {
    name.as_str().starts_with("x-auth-")
}

/// Forward an authorized request to the upstream origin.
pub async fn forward(state: &AppState, user: &AuthenticatedUser, req: Request) -> Response {
    match try_forward(state, user, req).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn try_forward(
    state: &AppState,
    user: &AuthenticatedUser,
    mut req: Request,
) -> Result<Response, GatewayError> {
    let Some(upstream) = &state.config.upstream_url else {
        // Unreachable once validate() has passed at startup.
        return Err(GatewayError::Internal("proxy mode without an upstream URL".into()));
    };

    let target = build_target(upstream, req.uri());
    let method = req.method().clone();
    let wants_upgrade = req.headers().contains_key(header::UPGRADE);
    let on_upgrade = req.extensions_mut().remove::<OnUpgrade>();

    // Rebuild the outbound header set: hop-by-hop headers stay on this hop,
    // the Host header follows the upstream URL, and inbound X-Auth-* headers
    // are dropped unconditionally before the real ones are injected.
    let mut headers = HeaderMap::new();
    for (name, value) in req.headers() {
        if is_hop_by_hop(name) || is_identity_header(name) || *name == header::HOST {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    insert_auth_headers(&mut headers, user, state.config.group_field.as_deref());

    if wants_upgrade && let Some(on_upgrade) = on_upgrade {
        let protocol = req.headers().get(header::UPGRADE).cloned();
        return forward_upgrade(state, method, &target, headers, protocol, on_upgrade).await;
    }

    let body = reqwest::Body::wrap_stream(req.into_body().into_data_stream());
    let response = state
        .http_client
        .request(method, &target)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))?;

    Ok(into_response(response))
}

/// Replay the upgrade handshake against the upstream and, when it accepts,
/// splice the two upgraded connections together.
async fn forward_upgrade(
    state: &AppState,
    method: http::Method,
    target: &str,
    mut headers: HeaderMap,
    protocol: Option<HeaderValue>,
    on_upgrade: OnUpgrade,
) -> Result<Response, GatewayError> {
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Some(protocol) = &protocol {
        headers.insert(header::UPGRADE, protocol.clone());
    }

    let upstream_response = state
        .http_client
        .request(method, target)
        .headers(headers)
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))?;

    if upstream_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        // Upstream declined the upgrade; relay its answer as-is.
        return Ok(into_response(upstream_response));
    }

    let mut builder = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade");
    if let Some(builder_headers) = builder.headers_mut() {
        for (name, value) in upstream_response.headers() {
            // The handshake echo (Upgrade, Sec-WebSocket-*) must reach the
            // client; everything else is connection-scoped.
            if *name == header::UPGRADE || name.as_str().starts_with("sec-websocket-") {
                builder_headers.append(name.clone(), value.clone());
            }
        }
    }
    let response = builder
        .body(Body::empty())
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    // The client-side upgrade completes only after the 101 above is written,
    // so the splice has to happen off this handler's path.
    tokio::spawn(async move {
        let upstream_io = match upstream_response.upgrade().await {
            Ok(io) => io,
            Err(error) => {
                tracing::warn!(%error, "upstream upgrade failed");
                return;
            }
        };
        let client_io = match on_upgrade.await {
            Ok(io) => io,
            Err(error) => {
                tracing::warn!(%error, "client upgrade failed");
                return;
            }
        };

        let mut upstream_io = upstream_io;
        let mut client_io = TokioIo::new(client_io);
        if let Err(error) = tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
            tracing::debug!(%error, "upgraded connection closed with error");
        }
    });

    Ok(response)
}

fn build_target(upstream: &Url, uri: &Uri) -> String {
    let base = upstream.as_str().trim_end_matches('/');
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!("{base}{path_and_query}")
}

/// Bridge the upstream's reply back to the client, streaming the body.
fn into_response(response: reqwest::Response) -> Response {
    let status = response.status();
    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in response.headers() {
            if is_hop_by_hop(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
    }

    builder
        .body(Body::from_stream(response.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{header as match_header, method as match_method, path as match_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::test_util::{MockFactory, MockProvider, member_user, test_config};
    use crate::config::{AuthMode, GatewayConfig};
    use crate::routes::build_router;

    fn proxy_config(upstream: &str) -> GatewayConfig {
        let mut config = test_config();
        config.mode = AuthMode::Proxy;
        config.upstream_url = Some(upstream.parse().unwrap());
        config
    }

    fn authorized_provider() -> MockProvider {
        MockProvider::default()
            .with_user(member_user())
            .with_group_record(json!({"user_id": "user1", "members": true}))
    }

    #[test]
    fn hop_by_hop_headers_are_recognized() {
        assert!(is_hop_by_hop(&header::CONNECTION));
        assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop(&header::UPGRADE));
        assert!(is_hop_by_hop(&HeaderName::from_static("keep-alive")));
        assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&HeaderName::from_static("sec-websocket-key")));
    }

    #[test]
    fn target_joins_upstream_and_path() {
        let upstream: Url = "http://app:8080".parse().unwrap();
        let uri: Uri = "/a/b?q=1".parse().unwrap();
        assert_eq!(build_target(&upstream, &uri), "http://app:8080/a/b?q=1");

        let upstream: Url = "http://app:8080/".parse().unwrap();
        assert_eq!(build_target(&upstream, &uri), "http://app:8080/a/b?q=1");
    }

    #[tokio::test]
    async fn spoofed_identity_headers_are_overwritten() {
        let upstream = MockServer::start().await;
        Mock::given(match_method("GET"))
            .and(match_path("/app"))
            .respond_with(ResponseTemplate::new(200).set_body_string("from upstream"))
            .mount(&upstream)
            .await;

        let state = AppState::with_provider(
            proxy_config(&upstream.uri()),
            Arc::new(MockFactory::new(authorized_provider)),
        );
        let app = build_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/app")
                    .header("cookie", "pb_auth=some-token")
                    .header("x-auth-user", "admin")
                    .header("x-auth-email", "admin@example.com")
                    .header("x-auth-groups", "superusers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let received = upstream.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let forwarded = &received[0];
        assert_eq!(forwarded.headers["x-auth-user"], "user1");
        assert_eq!(forwarded.headers["x-auth-email"], "u@example.com");
        assert_eq!(forwarded.headers["x-auth-groups"], "members");
    }

    #[tokio::test]
    async fn denied_requests_never_reach_the_upstream() {
        let upstream = MockServer::start().await;

        let state = AppState::with_provider(
            proxy_config(&upstream.uri()),
            Arc::new(MockFactory::new(|| {
                MockProvider::default().with_refresh_failure()
            })),
        );
        let app = build_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/app")
                    .header("cookie", "pb_auth=some-token")
                    .header("x-auth-user", "admin")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(upstream.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_response_is_relayed() {
        let upstream = MockServer::start().await;
        Mock::given(match_method("POST"))
            .and(match_path("/submit"))
            .and(match_header("content-type", "application/json"))
            .respond_with(
                ResponseTemplate::new(418)
                    .insert_header("x-upstream", "yes")
                    .set_body_string("teapot"),
            )
            .mount(&upstream)
            .await;

        let state = AppState::with_provider(
            proxy_config(&upstream.uri()),
            Arc::new(MockFactory::new(authorized_provider)),
        );
        let app = build_router(state);

        let response = app
            .oneshot(
                HttpRequest::post("/submit")
                    .header("cookie", "pb_auth=some-token")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"a":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-upstream"], "yes");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"teapot");
    }

    #[tokio::test]
    async fn declined_upgrade_is_relayed() {
        let upstream = MockServer::start().await;
        Mock::given(match_method("GET"))
            .and(match_path("/ws"))
            .respond_with(ResponseTemplate::new(426).set_body_string("upgrade required"))
            .mount(&upstream)
            .await;

        let state = AppState::with_provider(
            proxy_config(&upstream.uri()),
            Arc::new(MockFactory::new(authorized_provider)),
        );

        // A real OnUpgrade handle; it never resolves because no connection
        // backs it, which is fine on the decline path.
        let mut handshake = HttpRequest::get("/ws").body(Body::empty()).unwrap();
        let on_upgrade = hyper::upgrade::on(&mut handshake);

        let target = format!("{}/ws", upstream.uri());
        let response = forward_upgrade(
            &state,
            http::Method::GET,
            &target,
            HeaderMap::new(),
            Some(HeaderValue::from_static("websocket")),
            on_upgrade,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"upgrade required");

        let received = upstream.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].headers["upgrade"], "websocket");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_502() {
        // Nothing listens on this port.
        let state = AppState::with_provider(
            proxy_config("http://127.0.0.1:1"),
            Arc::new(MockFactory::new(authorized_provider)),
        );
        let app = build_router(state);

        let response = app
            .oneshot(
                HttpRequest::get("/app")
                    .header("cookie", "pb_auth=some-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
