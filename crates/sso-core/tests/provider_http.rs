//! Integration tests for the provider adapter over HTTP
//!
//! Runs the generic adapter against `wiremock` servers standing in for
//! Auth0, Okta and Keycloak, through the real reqwest transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sso_core::auth::{
    HttpTransport, ProviderAdapter, ReqwestTransport, SessionStores, SsoService, TokenChannel,
};
use sso_core::{Clock, ProviderKind, SsoConfig, SsoError, SystemClock};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> Arc<dyn HttpTransport> {
    Arc::new(
        ReqwestTransport::with_options(Duration::from_secs(5), true)
            .expect("reqwest client should build"),
    )
}

fn config(provider: ProviderKind, domain: String) -> SsoConfig {
    SsoConfig {
        provider,
        client_id: "client-123".to_string(),
        domain,
        redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        logout_redirect_uri: "http://localhost:3000".to_string(),
        custom_claims_namespace: Some("https://app.example.com".to_string()),
        enabled: true,
        ..SsoConfig::default()
    }
}

fn adapter(config: &SsoConfig) -> ProviderAdapter {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    ProviderAdapter::new(config, transport(), clock).expect("adapter should build")
}

/// Validates the Auth0 code exchange and user mapping.
///
/// The token request must carry the grant, the code, the client id and the
/// PKCE verifier as a form body; the user-info request must send the access
/// token as a bearer credential.
///
/// # Test Steps
/// 1. Mount token and user-info endpoints with strict matchers
/// 2. Exchange a code with a verifier
/// 3. Fetch and map the user, including namespaced roles
#[tokio::test]
async fn test_auth0_exchange_and_userinfo() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains("client_id=client-123"))
        .and(body_string_contains("code_verifier=verifier-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "id_token": "header.payload.signature",
            "refresh_token": "rt-1",
            "expires_in": 86400,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "auth0|abc",
            "email": "ada@example.com",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "name": "Ada Lovelace",
            "https://app.example.com/roles": ["admin"],
            "https://app.example.com/permissions": ["read", "write"],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&config(ProviderKind::Auth0, server.uri()));

    let tokens = adapter.exchange_code("the-code", Some("verifier-abc")).await.unwrap();
    assert_eq!(tokens.access_token, "at-1");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(tokens.expires_in, 86400);

    let user = adapter.fetch_user_info(&tokens.access_token).await.unwrap();
    assert_eq!(user.id, "auth0|abc");
    assert!(user.has_role("admin"));
    assert!(user.has_permission("write"));
}

/// Validates refresh against Keycloak keeps the old refresh token.
///
/// # Test Steps
/// 1. Configure Keycloak with a realm URL
/// 2. Answer the refresh grant without a new refresh token
/// 3. Confirm the previous refresh token is carried forward
#[tokio::test]
async fn test_keycloak_refresh_carries_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/realms/acme/protocol/openid-connect/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "expires_in": 300,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let domain = format!("{}/realms/acme", server.uri());
    let adapter = adapter(&config(ProviderKind::Keycloak, domain));

    let tokens = adapter.refresh("rt-1").await.unwrap();
    assert_eq!(tokens.access_token, "at-2");
    assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(tokens.token_type, "Bearer");
}

/// Validates provider errors surface only the OAuth fields.
///
/// # Test Steps
/// 1. Reject a code with an OAuth error body
/// 2. Confirm the status and `error_description` are surfaced
/// 3. Fail a refresh with an HTML body and confirm nothing of it leaks
#[tokio::test]
async fn test_okta_errors_surface_oauth_fields_only() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/default/v1/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "The authorization code is invalid or has expired.",
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth2/default/v1/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(502).set_body_string("<html>upstream secret stack</html>"),
        )
        .mount(&server)
        .await;

    let adapter = adapter(&config(ProviderKind::Okta, server.uri()));

    let err = adapter.exchange_code("stale", None).await.unwrap_err();
    assert_eq!(
        err,
        SsoError::TokenExchangeFailed {
            status_code: Some(400),
            provider_message: Some("The authorization code is invalid or has expired.".to_string()),
        }
    );
    assert!(err.is_grant_rejected());

    let err = adapter.refresh("rt").await.unwrap_err();
    assert_eq!(err, SsoError::TokenRefreshFailed { status_code: Some(502), provider_message: None });
    assert!(!err.to_string().contains("secret"));
}

/// Validates revocation requests and failures.
///
/// # Test Steps
/// 1. Accept a revoke carrying client id and token
/// 2. Confirm a server error maps to `RevokeFailed`
#[tokio::test]
async fn test_auth0_revoke() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .and(body_string_contains("client_id=client-123"))
        .and(body_string_contains("token=rt-good"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .and(body_string_contains("token=rt-bad"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = adapter(&config(ProviderKind::Auth0, server.uri()));

    adapter.revoke("rt-good").await.unwrap();
    assert!(matches!(adapter.revoke("rt-bad").await, Err(SsoError::RevokeFailed(_))));
}

/// Validates the full service flow against an HTTP provider.
///
/// # Test Steps
/// 1. Start a login and check the authorization URL points at the server
/// 2. Complete the callback; the verifier stored at login must be sent
/// 3. Confirm the session is authenticated, then log out with revocation
#[tokio::test]
async fn test_service_flow_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("code=code-xyz"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-http",
            "id_token": "h.p.s",
            "refresh_token": "rt-http",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "auth0|flow",
            "email": "flow@example.com",
            "name": "Flow User",
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/revoke"))
        .and(body_string_contains("token=rt-http"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = SsoService::with_transport(
        config(ProviderKind::Auth0, server.uri()),
        SessionStores::in_memory(),
        TokenChannel::new(),
        transport(),
        clock,
    )
    .expect("service should build");

    let request = service.login().await.unwrap();
    assert!(request.url.as_str().starts_with(&format!("{}/authorize?", server.uri())));
    assert!(request.url.query_pairs().any(|(k, _)| k == "code_challenge"));

    let user = service.handle_callback("code-xyz", &request.state).await.unwrap();
    assert_eq!(user.id, "auth0|flow");
    assert_eq!(user.first_name, "Flow");
    assert!(service.is_authenticated().await);

    let logout = service.logout().await.unwrap();
    assert_eq!(logout.path(), "/v2/logout");
    assert!(!service.is_authenticated().await);
}
