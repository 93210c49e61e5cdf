//! Identity provider support
//!
//! Every provider goes through one [`ProviderAdapter`]. What differs between
//! providers (endpoint URLs, logout/revoke conventions, claim locations) is
//! data in a [`ProviderProfile`] built from the configuration.

pub mod adapter;
pub mod claims;
pub mod mock;
pub mod profile;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use adapter::ProviderAdapter;
pub use claims::{ClaimMap, ClaimPath};
pub use mock::MockTransport;
pub use profile::{Endpoints, LogoutStyle, ProviderProfile, RevokeStyle};

use crate::error::SsoError;

/// Supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Auth0
    Auth0,
    /// Okta
    Okta,
    /// Keycloak
    Keycloak,
    /// Microsoft Entra ID / Azure AD
    AzureAd,
    /// Google
    Google,
    /// Built-in mock provider for development
    #[default]
    Mock,
}

impl ProviderKind {
    /// Every provider, in display order
    pub const ALL: [Self; 6] =
        [Self::Auth0, Self::Okta, Self::Keycloak, Self::AzureAd, Self::Google, Self::Mock];

    /// Configuration identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth0 => "auth0",
            Self::Okta => "okta",
            Self::Keycloak => "keycloak",
            Self::AzureAd => "azure-ad",
            Self::Google => "google",
            Self::Mock => "mock",
        }
    }

    /// Human-readable provider name
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Auth0 => "Auth0",
            Self::Okta => "Okta",
            Self::Keycloak => "Keycloak",
            Self::AzureAd => "Azure AD",
            Self::Google => "Google",
            Self::Mock => "Mock SSO",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = SsoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth0" => Ok(Self::Auth0),
            "okta" => Ok(Self::Okta),
            "keycloak" => Ok(Self::Keycloak),
            "azure-ad" | "azure_ad" | "azuread" | "azure" => Ok(Self::AzureAd),
            "google" => Ok(Self::Google),
            "mock" => Ok(Self::Mock),
            other => Err(SsoError::ConfigInvalid(vec![format!("unknown SSO provider '{other}'")])),
        }
    }
}
