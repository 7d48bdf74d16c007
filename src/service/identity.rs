//! Request identity.
//!
//! Routes learn who is calling through an [`Authenticator`]; the default
//! reads a numeric user id from a configurable header. Credential handling
//! (passwords, tokens) belongs in a different `Authenticator`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::HeaderName;
use axum::http::request::Parts;

use super::api::{ApiError, SharedState};
use super::models::User;
use crate::errors::TaskboardError;

pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

pub trait Authenticator: Send + Sync {
    /// The caller's user id, or `None` when the request carries no usable identity.
    fn identify(&self, headers: &HeaderMap) -> Option<i64>;
}

#[derive(Debug, Clone)]
pub struct HeaderAuthenticator {
    header: HeaderName,
}

impl HeaderAuthenticator {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Build from a configured header name.
    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        let header = HeaderName::try_from(name)
            .map_err(|e| anyhow::anyhow!("Invalid identity header '{}': {}", name, e))?;
        Ok(Self::new(header))
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for HeaderAuthenticator {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DEFAULT_IDENTITY_HEADER))
    }
}

impl Authenticator for HeaderAuthenticator {
    fn identify(&self, headers: &HeaderMap) -> Option<i64> {
        headers
            .get(&self.header)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

/// The authenticated user for this request. Rejects with 401 when the
/// request has no identity or names a user that does not exist.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = state
            .authenticator
            .identify(&parts.headers)
            .ok_or(ApiError::Unauthorized(
                TaskboardError::MissingIdentity.to_string(),
            ))?;
        let user = state.db.call(move |db| db.get_user(user_id)).await?;
        match user {
            Some(user) => Ok(Self(user)),
            None => Err(ApiError::Unauthorized(
                TaskboardError::UserNotFound { id: user_id }.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_static(value));
        map
    }

    #[test]
    fn reads_numeric_id_from_default_header() {
        let auth = HeaderAuthenticator::default();
        assert_eq!(auth.identify(&headers("x-user-id", "7")), Some(7));
        assert_eq!(auth.identify(&headers("x-user-id", " 12 ")), Some(12));
    }

    #[test]
    fn missing_or_garbled_header_is_anonymous() {
        let auth = HeaderAuthenticator::default();
        assert_eq!(auth.identify(&HeaderMap::new()), None);
        assert_eq!(auth.identify(&headers("x-user-id", "abc")), None);
        assert_eq!(auth.identify(&headers("x-other", "7")), None);
    }

    #[test]
    fn custom_header_name() {
        let auth = HeaderAuthenticator::from_name("X-Board-User").unwrap();
        assert_eq!(auth.header().as_str(), "x-board-user");
        assert_eq!(auth.identify(&headers("x-board-user", "3")), Some(3));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        assert!(HeaderAuthenticator::from_name("bad header").is_err());
    }
}
