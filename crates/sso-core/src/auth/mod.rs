//! Provider-agnostic OAuth 2.0 / OIDC single sign-on
//!
//! This module implements the authorization-code flow with PKCE against
//! Auth0, Okta, Keycloak, Azure AD, Google and an in-process mock provider.
//!
//! # Features
//!
//! - **PKCE Flow**: RFC 7636 S256 challenges with a 128-character verifier
//! - **CSRF State**: Single-use state with a five minute TTL
//! - **Table-driven Providers**: One adapter, one endpoint/claims row per provider
//! - **Token Management**: De-duplicated refresh and a single background timer
//! - **Cross-session Sync**: Sessions of one principal see each other's
//!   sign-in, refresh and sign-out
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   SsoService    │  Per-session orchestrator
//! └────────┬────────┘
//!          │
//!          ├──► StateGuard         (CSRF state, ephemeral store)
//!          ├──► PKCE helper        (verifier in persistent store)
//!          ├──► ProviderAdapter    (HTTP flows, driven by ProviderProfile)
//!          │         │
//!          │         └──► HttpTransport  (reqwest or in-process mock)
//!          │
//!          └──► TokenManager       (record lifecycle + refresh timer)
//!                    │
//!                    └──► TokenChannel  (broadcast between sessions)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use sso_core::auth::{SessionStores, SsoService, TokenChannel};
//! use sso_core::config::SsoConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config =
//!         SsoConfig::mock("http://localhost:3000/auth/callback", "http://localhost:3000");
//!     let service = SsoService::new(config, SessionStores::in_memory(), TokenChannel::new())?;
//!
//!     // Send the browser here
//!     let request = service.login().await?;
//!
//!     // ... the provider redirects back to the callback URL ...
//!     let user = service.handle_callback_url(&request.url).await?;
//!     println!("Signed in as {}", user.email);
//!
//!     let logout_url = service.logout().await?;
//!     println!("Redirect to {logout_url}");
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - **[`types`]**: Token records, user profile, login state
//! - **[`pkce`]**: PKCE challenge generation and verification
//! - **[`state`]**: CSRF state issue and consume
//! - **[`provider`]**: Provider table, claim mapping, adapter, mock provider
//! - **[`token_manager`]**: Token lifecycle management with auto-refresh
//! - **[`service`]**: High-level SSO orchestrator

pub mod callback;
pub mod channel;
pub mod jwt;
pub mod pkce;
pub mod provider;
pub mod service;
pub mod state;
pub mod storage;
pub mod token_manager;
pub mod traits;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use callback::CallbackParams;
pub use channel::{Subscription, TokenChange, TokenChannel};
pub use pkce::{generate_code_challenge, generate_code_verifier, verify, PkceChallenge};
pub use provider::{MockTransport, ProviderAdapter, ProviderKind};
pub use service::SsoService;
pub use state::StateGuard;
pub use storage::{FileStore, MemoryStore, SessionStores};
pub use token_manager::{RefreshCallback, TokenManager, TokenState};
pub use traits::{HttpTransport, SessionStore, TransportResponse};
pub use transport::ReqwestTransport;
pub use types::{AuthorizationRequest, SsoState, SsoTokens, SsoUser};
