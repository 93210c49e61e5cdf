//! Per-provider table
//!
//! A [`ProviderProfile`] is everything provider-specific the adapter needs:
//!
//! | provider | authorize/token/userinfo base | logout | revoke |
//! |----------|-------------------------------|--------|--------|
//! | auth0    | `{domain}`                    | `/v2/logout?client_id&returnTo` | client id + token |
//! | okta     | `{domain}/oauth2/default/v1`  | `id_token_hint` + `post_logout_redirect_uri` | client id + token |
//! | keycloak | `{base}/realms/{realm}/protocol/openid-connect` | `redirect_uri` | client id + token |
//! | azure-ad | `login.microsoftonline.com/{tenant}/oauth2/v2.0`, Graph `/me` | `post_logout_redirect_uri` | none |
//! | google   | `accounts.google.com`, `oauth2.googleapis.com` | local | token only |
//! | mock     | `{redirect origin}/mock` | local | token only |

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use super::claims::{
    ClaimMap, AUTH0_CLAIMS, AZURE_AD_CLAIMS, GOOGLE_CLAIMS, KEYCLOAK_CLAIMS, MOCK_CLAIMS,
    OKTA_CLAIMS,
};
use super::ProviderKind;
use crate::config::SsoConfig;
use crate::error::{SsoError, SsoResult};

static KEYCLOAK_REALM: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"/realms/([^/?#]+)"));

/// Default Keycloak realm when the domain names none
pub const DEFAULT_KEYCLOAK_REALM: &str = "master";

/// Default Azure AD tenant when the domain is empty
pub const DEFAULT_AZURE_TENANT: &str = "common";

/// Resolved endpoint URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Authorization endpoint
    pub authorize: Url,
    /// Token endpoint
    pub token: Url,
    /// User-info endpoint
    pub userinfo: Url,
    /// Provider logout endpoint; `None` means a local redirect
    pub logout: Option<Url>,
    /// Revocation endpoint; `None` means revocation is unsupported
    pub revoke: Option<Url>,
}

/// How the provider expects a logout redirect to be built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutStyle {
    /// `client_id` and `returnTo` (Auth0)
    ReturnTo,
    /// OIDC RP-initiated logout: `id_token_hint` and `post_logout_redirect_uri`
    PostLogoutRedirect,
    /// `redirect_uri` (Keycloak)
    RedirectUri,
    /// No provider session to end; go straight to the logout target
    Local,
}

/// Body of a revocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeStyle {
    /// `client_id` and `token`
    ClientAndToken,
    /// `token` only
    TokenOnly,
    /// Provider has no revocation endpoint
    Unsupported,
}

/// Provider-specific data driving the generic adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Provider variant
    pub kind: ProviderKind,
    /// Endpoint URLs
    pub endpoints: Endpoints,
    /// Logout redirect convention
    pub logout_style: LogoutStyle,
    /// Revocation request convention
    pub revoke_style: RevokeStyle,
    /// Token requests repeat the `scope` parameter (Azure AD v2)
    pub scope_on_token_request: bool,
    /// Login skips the provider and redirects straight to the callback
    pub direct_callback: bool,
    /// Claim locations in the user-info document
    pub claims: ClaimMap,
    /// Extra authorization request parameters
    pub extra_authorize_params: Vec<(&'static str, String)>,
}

impl ProviderProfile {
    /// Build the profile for the configured provider
    ///
    /// # Errors
    /// Returns `SsoError::ConfigInvalid` if the domain or redirect URI cannot
    /// form valid endpoint URLs.
    pub fn for_config(config: &SsoConfig) -> SsoResult<Self> {
        let profile = match config.provider {
            ProviderKind::Auth0 => auth0(config)?,
            ProviderKind::Okta => okta(config)?,
            ProviderKind::Keycloak => keycloak(config)?,
            ProviderKind::AzureAd => azure_ad(config)?,
            ProviderKind::Google => google()?,
            ProviderKind::Mock => mock(config)?,
        };
        Ok(profile)
    }
}

fn auth0(config: &SsoConfig) -> SsoResult<ProviderProfile> {
    let base = base_url(&config.domain);
    let mut extra_authorize_params = Vec::new();
    if let Some(audience) = config.audience.as_ref().filter(|a| !a.is_empty()) {
        extra_authorize_params.push(("audience", audience.clone()));
    }

    Ok(ProviderProfile {
        kind: ProviderKind::Auth0,
        endpoints: Endpoints {
            authorize: endpoint(&format!("{base}/authorize"))?,
            token: endpoint(&format!("{base}/oauth/token"))?,
            userinfo: endpoint(&format!("{base}/userinfo"))?,
            logout: Some(endpoint(&format!("{base}/v2/logout"))?),
            revoke: Some(endpoint(&format!("{base}/oauth/revoke"))?),
        },
        logout_style: LogoutStyle::ReturnTo,
        revoke_style: RevokeStyle::ClientAndToken,
        scope_on_token_request: false,
        direct_callback: false,
        claims: AUTH0_CLAIMS,
        extra_authorize_params,
    })
}

fn okta(config: &SsoConfig) -> SsoResult<ProviderProfile> {
    let base = format!("{}/oauth2/default/v1", base_url(&config.domain));

    Ok(ProviderProfile {
        kind: ProviderKind::Okta,
        endpoints: Endpoints {
            authorize: endpoint(&format!("{base}/authorize"))?,
            token: endpoint(&format!("{base}/token"))?,
            userinfo: endpoint(&format!("{base}/userinfo"))?,
            logout: Some(endpoint(&format!("{base}/logout"))?),
            revoke: Some(endpoint(&format!("{base}/revoke"))?),
        },
        logout_style: LogoutStyle::PostLogoutRedirect,
        revoke_style: RevokeStyle::ClientAndToken,
        scope_on_token_request: false,
        direct_callback: false,
        claims: OKTA_CLAIMS,
        extra_authorize_params: Vec::new(),
    })
}

fn keycloak(config: &SsoConfig) -> SsoResult<ProviderProfile> {
    let (server, realm) = keycloak_realm(&config.domain);
    let base = format!("{server}/realms/{realm}/protocol/openid-connect");

    Ok(ProviderProfile {
        kind: ProviderKind::Keycloak,
        endpoints: Endpoints {
            authorize: endpoint(&format!("{base}/auth"))?,
            token: endpoint(&format!("{base}/token"))?,
            userinfo: endpoint(&format!("{base}/userinfo"))?,
            logout: Some(endpoint(&format!("{base}/logout"))?),
            revoke: Some(endpoint(&format!("{base}/revoke"))?),
        },
        logout_style: LogoutStyle::RedirectUri,
        revoke_style: RevokeStyle::ClientAndToken,
        scope_on_token_request: false,
        direct_callback: false,
        claims: KEYCLOAK_CLAIMS,
        extra_authorize_params: Vec::new(),
    })
}

fn azure_ad(config: &SsoConfig) -> SsoResult<ProviderProfile> {
    let tenant = match config.domain.trim() {
        "" => DEFAULT_AZURE_TENANT,
        tenant => tenant,
    };
    let base = format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0");

    Ok(ProviderProfile {
        kind: ProviderKind::AzureAd,
        endpoints: Endpoints {
            authorize: endpoint(&format!("{base}/authorize"))?,
            token: endpoint(&format!("{base}/token"))?,
            userinfo: endpoint("https://graph.microsoft.com/v1.0/me")?,
            logout: Some(endpoint(&format!("{base}/logout"))?),
            revoke: None,
        },
        logout_style: LogoutStyle::PostLogoutRedirect,
        revoke_style: RevokeStyle::Unsupported,
        scope_on_token_request: true,
        direct_callback: false,
        claims: AZURE_AD_CLAIMS,
        extra_authorize_params: vec![("response_mode", "query".to_string())],
    })
}

fn google() -> SsoResult<ProviderProfile> {
    Ok(ProviderProfile {
        kind: ProviderKind::Google,
        endpoints: Endpoints {
            authorize: endpoint("https://accounts.google.com/o/oauth2/v2/auth")?,
            token: endpoint("https://oauth2.googleapis.com/token")?,
            userinfo: endpoint("https://www.googleapis.com/oauth2/v2/userinfo")?,
            logout: None,
            revoke: Some(endpoint("https://oauth2.googleapis.com/revoke")?),
        },
        logout_style: LogoutStyle::Local,
        revoke_style: RevokeStyle::TokenOnly,
        scope_on_token_request: false,
        direct_callback: false,
        claims: GOOGLE_CLAIMS,
        extra_authorize_params: vec![
            ("access_type", "offline".to_string()),
            ("prompt", "consent".to_string()),
        ],
    })
}

fn mock(config: &SsoConfig) -> SsoResult<ProviderProfile> {
    let redirect = endpoint(&config.redirect_uri)?;
    let origin = redirect.origin().ascii_serialization();
    let base = format!("{origin}/mock");

    Ok(ProviderProfile {
        kind: ProviderKind::Mock,
        endpoints: Endpoints {
            authorize: endpoint(&format!("{base}/authorize"))?,
            token: endpoint(&format!("{base}/token"))?,
            userinfo: endpoint(&format!("{base}/userinfo"))?,
            logout: None,
            revoke: Some(endpoint(&format!("{base}/revoke"))?),
        },
        logout_style: LogoutStyle::Local,
        revoke_style: RevokeStyle::TokenOnly,
        scope_on_token_request: false,
        direct_callback: true,
        claims: MOCK_CLAIMS,
        extra_authorize_params: Vec::new(),
    })
}

/// `https://{domain}` unless the domain already carries a scheme
fn base_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("https://") || domain.starts_with("http://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}

/// Split a Keycloak domain into server base URL and realm name
fn keycloak_realm(domain: &str) -> (String, String) {
    let base = base_url(domain);
    let realm = KEYCLOAK_REALM
        .as_ref()
        .ok()
        .and_then(|re| re.captures(&base))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| DEFAULT_KEYCLOAK_REALM.to_string(), |m| m.as_str().to_string());
    let server = base.split("/realms/").next().unwrap_or(&base).to_string();
    (server, realm)
}

fn endpoint(raw: &str) -> SsoResult<Url> {
    Url::parse(raw).map_err(|e| SsoError::ConfigInvalid(vec![format!("invalid endpoint '{raw}': {e}")]))
}

#[cfg(test)]
mod tests {
    //! Unit tests for the provider table.

    use super::*;

    fn config(provider: ProviderKind, domain: &str) -> SsoConfig {
        SsoConfig {
            provider,
            client_id: "client".to_string(),
            domain: domain.to_string(),
            ..SsoConfig::default()
        }
    }

    /// Validates Auth0 endpoints and audience parameter.
    ///
    /// Assertions:
    /// - Confirms `https://` is prepended to a bare domain.
    /// - Confirms the audience becomes an extra authorize parameter.
    #[test]
    fn test_auth0_endpoints() {
        let mut cfg = config(ProviderKind::Auth0, "tenant.auth0.com/");
        cfg.audience = Some("https://api.example.com".to_string());
        let profile = ProviderProfile::for_config(&cfg).unwrap();

        assert_eq!(profile.endpoints.authorize.as_str(), "https://tenant.auth0.com/authorize");
        assert_eq!(profile.endpoints.token.as_str(), "https://tenant.auth0.com/oauth/token");
        assert_eq!(
            profile.endpoints.logout.as_ref().map(Url::as_str),
            Some("https://tenant.auth0.com/v2/logout")
        );
        assert_eq!(
            profile.extra_authorize_params,
            vec![("audience", "https://api.example.com".to_string())]
        );
    }

    /// Validates Keycloak realm extraction.
    ///
    /// Assertions:
    /// - Confirms the realm segment is honoured.
    /// - Confirms a domain without a realm uses `master`.
    #[test]
    fn test_keycloak_realm() {
        let profile = ProviderProfile::for_config(&config(
            ProviderKind::Keycloak,
            "https://id.example.com/realms/staff",
        ))
        .unwrap();
        assert_eq!(
            profile.endpoints.token.as_str(),
            "https://id.example.com/realms/staff/protocol/openid-connect/token"
        );

        let profile =
            ProviderProfile::for_config(&config(ProviderKind::Keycloak, "id.example.com")).unwrap();
        assert_eq!(
            profile.endpoints.authorize.as_str(),
            "https://id.example.com/realms/master/protocol/openid-connect/auth"
        );
    }

    /// Validates Azure AD tenant handling and missing revocation.
    ///
    /// Assertions:
    /// - Confirms the tenant appears in the path and defaults to `common`.
    /// - Confirms user info comes from Microsoft Graph.
    /// - Ensures there is no revoke endpoint.
    #[test]
    fn test_azure_tenant() {
        let profile =
            ProviderProfile::for_config(&config(ProviderKind::AzureAd, "contoso.onmicrosoft.com"))
                .unwrap();
        assert_eq!(
            profile.endpoints.authorize.as_str(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/authorize"
        );
        assert_eq!(profile.endpoints.userinfo.as_str(), "https://graph.microsoft.com/v1.0/me");
        assert!(profile.endpoints.revoke.is_none());
        assert!(profile.scope_on_token_request);

        let profile = ProviderProfile::for_config(&config(ProviderKind::AzureAd, "")).unwrap();
        assert!(profile.endpoints.token.as_str().contains("/common/"));
    }

    /// Validates the mock provider is rooted at the redirect origin.
    ///
    /// Assertions:
    /// - Confirms endpoints share the redirect URI's origin.
    /// - Confirms login redirects straight to the callback.
    #[test]
    fn test_mock_endpoints() {
        let cfg = SsoConfig::mock("http://localhost:5173/auth/callback", "http://localhost:5173");
        let profile = ProviderProfile::for_config(&cfg).unwrap();
        assert_eq!(profile.endpoints.token.as_str(), "http://localhost:5173/mock/token");
        assert!(profile.direct_callback);
        assert_eq!(profile.logout_style, LogoutStyle::Local);
    }

    /// Validates every provider builds with a plausible configuration.
    ///
    /// Assertions:
    /// - Ensures `for_config` succeeds for all kinds.
    #[test]
    fn test_all_providers_build() {
        for kind in ProviderKind::ALL {
            let profile = ProviderProfile::for_config(&config(kind, "sso.example.com")).unwrap();
            assert_eq!(profile.kind, kind);
        }
    }
}
