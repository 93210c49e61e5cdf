//! Provider-agnostic OAuth2/OIDC single sign-on client.
//!
//! # Safety and Quality
//!
//! Tokens, verifiers and state values never appear in logs or `Debug`
//! output. Every fallible operation returns [`SsoResult`].
//!
//! # Layout
//!
//! - [`auth`]: login flow, providers, token lifecycle
//! - [`config`]: configuration and loading from env or file
//! - [`clock`]: injectable time source
//! - [`error`]: error taxonomy and classification

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;

// Re-export commonly used types and traits for convenience
pub use auth::{ProviderKind, SessionStores, SsoService, SsoTokens, SsoUser, TokenChannel};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::SsoConfig;
pub use error::{ErrorClassification, ErrorSeverity, SsoError, SsoResult};
