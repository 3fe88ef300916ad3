//! Anonymous / Authenticated state of one session.

use crate::provider::{AuthError, Identity, IdentityProvider};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Anonymous,
    Authenticated { identity: Identity },
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::Anonymous => None,
            AuthState::Authenticated { identity } => Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    /// Sign in through `provider`. On failure the state is left as it was.
    pub fn login(
        &mut self,
        provider: &dyn IdentityProvider,
        email: &str,
        password: &str,
    ) -> Result<Identity, AuthError> {
        let outcome = provider.sign_in(email, password);
        self.finish_login(outcome)
    }

    /// Apply the outcome of a sign-in performed elsewhere (e.g. on a
    /// blocking worker). Only `Ok` moves the state to Authenticated.
    pub fn finish_login(&mut self, outcome: Result<Identity, AuthError>) -> Result<Identity, AuthError> {
        match outcome {
            Ok(identity) => {
                tracing::info!(identity = %identity, "session authenticated");
                *self = AuthState::Authenticated { identity: identity.clone() };
                Ok(identity)
            }
            Err(e) => {
                tracing::info!(error = %e, "login failed");
                Err(e)
            }
        }
    }

    /// Create an account. The state does not change: the user still has to log in.
    pub fn signup(
        &self,
        provider: &dyn IdentityProvider,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        provider.sign_up(email, password)
    }

    pub fn logout(&mut self) {
        if let AuthState::Authenticated { identity } = self {
            tracing::info!(identity = %identity, "session logged out");
        }
        *self = AuthState::Anonymous;
    }
}
