//! Typed outcome of the authorization pipeline.

/// Snapshot of the identity provider's user record at verification time.
/// Valid only for the lifetime of the request; never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    /// Empty when the provider record carries no email.
    pub email: String,
}

/// Why authentication failed. Each reason maps to a distinct user-visible
/// outcome, so callers must handle all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    /// No session cookie on the request.
    NoCredential,

    /// The cookie's token is structurally invalid or locally expired.
    InvalidCredential,

    /// The provider rejected the session refresh, or the call failed.
    /// Ambiguity between "invalid" and "unreachable" resolves to deny.
    RefreshFailed,

    /// Refresh succeeded but no user record was exposed.
    NoUserRecord,
}

/// Why authorization failed for an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// The group record exists but the configured field is falsy or absent.
    NotInGroup,

    /// The group lookup failed (no record, or the call failed).
    GroupLookupFailed,
}

/// Outcome of evaluating a request against the identity provider.
///
/// `Unauthorized` always carries a user (authentication succeeded,
/// authorization did not); `Unauthenticated` never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized(AuthenticatedUser),
    Unauthenticated(UnauthenticatedReason),
    Unauthorized {
        user: AuthenticatedUser,
        reason: UnauthorizedReason,
    },
}

impl AuthDecision {
    /// The authenticated user, when authentication succeeded.
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            AuthDecision::Authorized(user) | AuthDecision::Unauthorized { user, .. } => Some(user),
            AuthDecision::Unauthenticated(_) => None,
        }
    }
}
