//! The authorization decision pipeline.
//!
//! Strictly sequential, short-circuiting on the first failure. Every failure
//! is a decision variant, never an error: the transport layer renders
//! decisions, it does not catch exceptions.

use serde_json::Value;
use tracing::debug;

use super::decision::{AuthDecision, UnauthenticatedReason, UnauthorizedReason};
use super::provider::IdentityProvider;

/// Evaluate a request's session cookie into an [`AuthDecision`].
///
/// `token` is the raw value of the session cookie, if present. `group_field`
/// is the configured membership field; when `None`, authorization is skipped
/// entirely and authentication alone grants access.
///
/// At most two provider calls are made (refresh, group lookup); neither is
/// retried. A refresh may rotate the session token as a side effect; the
/// rotated token is left on the provider session and is not persisted here.
pub async fn evaluate(
    provider: &mut dyn IdentityProvider,
    token: Option<&str>,
    group_field: Option<&str>,
) -> AuthDecision {
    let Some(token) = token else {
        return AuthDecision::Unauthenticated(UnauthenticatedReason::NoCredential);
    };

    if !provider.load_session(token) {
        debug!("session token failed structural validation");
        return AuthDecision::Unauthenticated(UnauthenticatedReason::InvalidCredential);
    }

    // Local validity is necessary but not sufficient: the provider may have
    // revoked the session server-side, so the refresh is always attempted.
    if let Err(error) = provider.refresh().await {
        debug!(%error, "session refresh failed");
        return AuthDecision::Unauthenticated(UnauthenticatedReason::RefreshFailed);
    }

    let Some(user) = provider.current_user() else {
        debug!("refresh succeeded but no user record was exposed");
        return AuthDecision::Unauthenticated(UnauthenticatedReason::NoUserRecord);
    };

    let Some(group_field) = group_field else {
        return AuthDecision::Authorized(user);
    };

    let record = match provider.fetch_group_record(&user.id).await {
        Ok(record) => record,
        Err(error) => {
            debug!(user_id = %user.id, %error, "group lookup failed");
            return AuthDecision::Unauthorized {
                user,
                reason: UnauthorizedReason::GroupLookupFailed,
            };
        }
    };

    if record.get(group_field).is_some_and(is_truthy) {
        AuthDecision::Authorized(user)
    } else {
        debug!(user_id = %user.id, group_field, "user is not a group member");
        AuthDecision::Unauthorized {
            user,
            reason: UnauthorizedReason::NotInGroup,
        }
    }
}

/// JSON truthiness for the membership field: `false`, `null`, `0`, and `""`
/// are falsy, everything else is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
