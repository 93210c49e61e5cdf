//! Redirect callback parsing

use url::Url;

use crate::error::{SsoError, SsoResult};

/// Parameters the identity provider sends back to the redirect URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code
    pub code: String,
    /// Anti-CSRF state echoed back
    pub state: String,
}

impl CallbackParams {
    /// Extract the callback parameters from the full redirect URL
    ///
    /// # Errors
    /// - `SsoError::ProviderError` if the provider redirected with `error=`
    /// - `SsoError::InvalidCallback` if `code` or `state` is missing
    pub fn from_url(url: &Url) -> SsoResult<Self> {
        Self::from_pairs(url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())))
    }

    /// Extract the callback parameters from a raw query string
    ///
    /// A leading `?` is ignored.
    ///
    /// # Errors
    /// Same as [`CallbackParams::from_url`].
    pub fn from_query(query: &str) -> SsoResult<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        )
    }

    fn from_pairs(pairs: impl Iterator<Item = (String, String)>) -> SsoResult<Self> {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in pairs {
            match key.as_str() {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => error = Some(value),
                "error_description" => description = Some(value),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(SsoError::ProviderError { error, description });
        }

        match (code.filter(|c| !c.is_empty()), state.filter(|s| !s.is_empty())) {
            (Some(code), Some(state)) => Ok(Self { code, state }),
            (None, _) => Err(SsoError::InvalidCallback("missing authorization code".to_string())),
            (_, None) => Err(SsoError::InvalidCallback("missing state".to_string())),
        }
    }
}
