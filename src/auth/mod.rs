//! The authorization decision pipeline and its collaborators.

pub mod decision;
pub mod pipeline;
pub mod provider;
pub mod redirect;

#[cfg(test)]
pub mod test_util;

pub use decision::{AuthDecision, AuthenticatedUser, UnauthenticatedReason, UnauthorizedReason};
pub use pipeline::evaluate;
pub use provider::{IdentityProvider, PocketBase, ProviderError, ProviderFactory};
