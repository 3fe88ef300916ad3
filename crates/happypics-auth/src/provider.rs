//! Identity provider capability and its REST client.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    /// The provider answered and refused; the message is the provider's own.
    #[error("{0}")]
    Rejected(String),
    #[error("identity service unreachable: {0}")]
    Transport(String),
    #[error("unexpected identity service response: {0}")]
    MalformedResponse(String),
}

/// Stable key for a user's history (their email address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External email/password account service.
pub trait IdentityProvider: Send + Sync {
    /// Check credentials and return the identity they belong to.
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Create an account. Does not sign in.
    fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError>;
}

/// Reject obviously unusable credentials before contacting the service.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AuthError::InvalidInput("a valid email address is required".into()));
    }
    if password.is_empty() {
        return Err(AuthError::InvalidInput("a password is required".into()));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    email: Option<String>,
    local_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for Identity-Toolkit-style `accounts:*` REST endpoints.
pub struct RestIdentityProvider {
    endpoint: String,
    api_key: String,
    agent: ureq::Agent,
}

impl RestIdentityProvider {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent,
        }
    }

    fn post(&self, method: &str, email: &str, password: &str) -> Result<AccountResponse, AuthError> {
        validate_credentials(email, password)?;

        let url = format!("{}/accounts:{method}", self.endpoint);
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };

        let response = self
            .agent
            .post(&url)
            .query("key", &self.api_key)
            .set("Content-Type", "application/json")
            .send_json(&request);

        match response {
            Ok(resp) => resp
                .into_json::<AccountResponse>()
                .map_err(|e| AuthError::MalformedResponse(e.to_string())),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                tracing::info!(method, status = code, "identity service rejected request");
                Err(AuthError::Rejected(rejection_message(&body, code)))
            }
            Err(ureq::Error::Transport(t)) => {
                tracing::warn!(method, error = %t, "identity service transport error");
                Err(AuthError::Transport(t.to_string()))
            }
        }
    }
}

impl IdentityProvider for RestIdentityProvider {
    fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let account = self.post("signInWithPassword", email, password)?;
        if account.local_id.is_none() {
            return Err(AuthError::MalformedResponse("missing localId".into()));
        }
        Ok(Identity::new(account.email.unwrap_or_else(|| email.to_string())))
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        self.post("signUp", email, password)?;
        tracing::info!("account created");
        Ok(())
    }
}

/// Pull the service's error message out of a failure body.
fn rejection_message(body: &str, status: u16) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("request failed with status {status}"))
}
