//! reqwest-backed HTTP transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::traits::{HttpTransport, TransportResponse};
use crate::error::{SsoError, SsoResult};

/// HTTP transport for real identity providers
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport with the given request timeout
    ///
    /// Setting `SSO_DISABLE_PROXY` bypasses any system proxy.
    ///
    /// # Errors
    /// Returns `SsoError::Transport` if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> SsoResult<Self> {
        let disable_proxy = std::env::var_os("SSO_DISABLE_PROXY").is_some();
        Self::with_options(timeout, disable_proxy)
    }

    /// Build a transport with explicit proxy behaviour
    ///
    /// # Errors
    /// Returns `SsoError::Transport` if the TLS backend cannot be initialized.
    pub fn with_options(timeout: Duration, disable_proxy: bool) -> SsoResult<Self> {
        let builder = Client::builder().timeout(timeout);
        let builder = if disable_proxy { builder.no_proxy() } else { builder };
        Ok(Self { client: builder.build()? })
    }

    async fn into_response(response: reqwest::Response) -> SsoResult<TransportResponse> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

impl From<reqwest::Error> for SsoError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, url: &Url, form: &[(&str, String)]) -> SsoResult<TransportResponse> {
        let response = self
            .client
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;
        Self::into_response(response).await
    }

    async fn get_bearer(&self, url: &Url, access_token: &str) -> SsoResult<TransportResponse> {
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        Self::into_response(response).await
    }
}
