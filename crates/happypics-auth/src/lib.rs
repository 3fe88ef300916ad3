//! happypics-auth — Email/password authentication for persistent history.
//!
//! The identity service is external. This crate only distinguishes
//! success from failure, surfaces the service's message, and tracks
//! whether a session is anonymous or authenticated.

pub mod provider;
pub mod state;

pub use provider::{AuthError, Identity, IdentityProvider, RestIdentityProvider};
pub use state::AuthState;
