//! User-info claim mapping
//!
//! Each provider row names, per [`SsoUser`] field, the claim locations to try
//! in order. Missing names fall back to splitting the display name, and a
//! missing display name falls back to the email address.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::auth::types::SsoUser;
use crate::error::{SsoError, SsoResult};

/// Location of a claim in a user-info document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPath {
    /// Top-level key
    Key(&'static str),
    /// Nested object path, e.g. `realm_access.roles`
    Nested(&'static [&'static str]),
    /// `{namespace}/{suffix}` custom claim
    Namespaced(&'static str),
}

impl ClaimPath {
    fn resolve<'a>(&self, doc: &'a Value, namespace: &str) -> Option<&'a Value> {
        match self {
            Self::Key(key) => doc.get(*key),
            Self::Nested(path) => path.iter().try_fold(doc, |value, key| value.get(*key)),
            Self::Namespaced(suffix) => {
                doc.get(format!("{}/{suffix}", namespace.trim_end_matches('/')))
            }
        }
    }
}

/// Per-provider claim locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimMap {
    /// Subject identifier
    pub id: &'static [ClaimPath],
    /// Email address
    pub email: &'static [ClaimPath],
    /// Given name
    pub first_name: &'static [ClaimPath],
    /// Family name
    pub last_name: &'static [ClaimPath],
    /// Display name
    pub name: &'static [ClaimPath],
    /// Avatar URL
    pub picture: &'static [ClaimPath],
    /// Roles (array or single string)
    pub roles: &'static [ClaimPath],
    /// Permissions (array or single string)
    pub permissions: &'static [ClaimPath],
}

/// Standard OIDC claims with namespaced roles (Auth0)
pub const AUTH0_CLAIMS: ClaimMap = ClaimMap {
    id: &[ClaimPath::Key("sub")],
    email: &[ClaimPath::Key("email")],
    first_name: &[ClaimPath::Key("given_name")],
    last_name: &[ClaimPath::Key("family_name")],
    name: &[ClaimPath::Key("name")],
    picture: &[ClaimPath::Key("picture")],
    roles: &[ClaimPath::Namespaced("roles")],
    permissions: &[ClaimPath::Namespaced("permissions")],
};

/// Standard OIDC claims with Okta groups as roles
pub const OKTA_CLAIMS: ClaimMap = ClaimMap {
    id: &[ClaimPath::Key("sub")],
    email: &[ClaimPath::Key("email")],
    first_name: &[ClaimPath::Key("given_name")],
    last_name: &[ClaimPath::Key("family_name")],
    name: &[ClaimPath::Key("name"), ClaimPath::Key("preferred_username")],
    picture: &[ClaimPath::Key("picture")],
    roles: &[ClaimPath::Key("groups")],
    permissions: &[ClaimPath::Key("permissions")],
};

/// Keycloak claims with realm roles
pub const KEYCLOAK_CLAIMS: ClaimMap = ClaimMap {
    id: &[ClaimPath::Key("sub")],
    email: &[ClaimPath::Key("email")],
    first_name: &[ClaimPath::Key("given_name")],
    last_name: &[ClaimPath::Key("family_name")],
    name: &[ClaimPath::Key("name"), ClaimPath::Key("preferred_username")],
    picture: &[ClaimPath::Key("picture")],
    roles: &[ClaimPath::Nested(&["realm_access", "roles"])],
    permissions: &[],
};

/// Microsoft Graph `/me` document
pub const AZURE_AD_CLAIMS: ClaimMap = ClaimMap {
    id: &[ClaimPath::Key("id"), ClaimPath::Key("sub")],
    email: &[ClaimPath::Key("mail"), ClaimPath::Key("userPrincipalName")],
    first_name: &[ClaimPath::Key("givenName")],
    last_name: &[ClaimPath::Key("surname")],
    name: &[ClaimPath::Key("displayName")],
    picture: &[ClaimPath::Key("photo")],
    roles: &[ClaimPath::Key("roles")],
    permissions: &[ClaimPath::Key("permissions")],
};

/// Google OAuth2 v2 user-info document
pub const GOOGLE_CLAIMS: ClaimMap = ClaimMap {
    id: &[ClaimPath::Key("id"), ClaimPath::Key("sub")],
    email: &[ClaimPath::Key("email")],
    first_name: &[ClaimPath::Key("given_name")],
    last_name: &[ClaimPath::Key("family_name")],
    name: &[ClaimPath::Key("name")],
    picture: &[ClaimPath::Key("picture")],
    roles: &[],
    permissions: &[],
};

/// Mock provider document
pub const MOCK_CLAIMS: ClaimMap = ClaimMap {
    id: &[ClaimPath::Key("sub")],
    email: &[ClaimPath::Key("email")],
    first_name: &[ClaimPath::Key("given_name")],
    last_name: &[ClaimPath::Key("family_name")],
    name: &[ClaimPath::Key("name")],
    picture: &[ClaimPath::Key("picture")],
    roles: &[ClaimPath::Key("roles")],
    permissions: &[ClaimPath::Key("permissions")],
};

impl ClaimMap {
    /// Map a user-info document into an [`SsoUser`]
    ///
    /// # Errors
    /// Returns `SsoError::UserInfoFetchFailed` if no subject identifier can
    /// be found.
    pub fn map_user(&self, doc: &Value, namespace: &str) -> SsoResult<SsoUser> {
        let id = first_string(self.id, doc, namespace)
            .filter(|id| !id.is_empty())
            .ok_or(SsoError::UserInfoFetchFailed { status_code: None })?;
        let email = first_string(self.email, doc, namespace).unwrap_or_default();
        let name = first_string(self.name, doc, namespace).filter(|n| !n.trim().is_empty());

        let name_part = |index: usize| {
            name.as_deref().and_then(|n| n.split_whitespace().nth(index)).map(String::from)
        };
        let first_name =
            first_string(self.first_name, doc, namespace).or_else(|| name_part(0)).unwrap_or_default();
        let last_name =
            first_string(self.last_name, doc, namespace).or_else(|| name_part(1)).unwrap_or_default();

        Ok(SsoUser {
            id,
            name: name.unwrap_or_else(|| email.clone()),
            email,
            first_name,
            last_name,
            picture: first_string(self.picture, doc, namespace),
            roles: string_set(self.roles, doc, namespace),
            permissions: string_set(self.permissions, doc, namespace),
        })
    }
}

fn first_string(paths: &[ClaimPath], doc: &Value, namespace: &str) -> Option<String> {
    paths.iter().find_map(|path| match path.resolve(doc, namespace)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn string_set(paths: &[ClaimPath], doc: &Value, namespace: &str) -> BTreeSet<String> {
    paths
        .iter()
        .filter_map(|path| path.resolve(doc, namespace))
        .flat_map(|value| match value {
            Value::Array(items) => {
                items.iter().filter_map(|item| item.as_str().map(String::from)).collect()
            }
            Value::String(s) => vec![s.clone()],
            _ => Vec::new(),
        })
        .collect()
}
