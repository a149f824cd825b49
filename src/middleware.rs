use std::sync::Arc;

use axum::extract::FromRequestParts;
use http::header::{AUTHORIZATION, COOKIE};
use http::request::Parts;
use http::HeaderMap;

use crate::csrf::{CsrfPair, CSRF_COOKIE, CSRF_HEADER};
use crate::error::AuthError;
use crate::session::AuthSessionCoordinator;

/// The three opaque strings the core needs from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    pub bearer: Option<String>,
    pub csrf_cookie: Option<String>,
    pub csrf_header: Option<String>,
}

impl RequestCredentials {
    /// Pull the bearer token, CSRF cookie and CSRF header out of `headers`.
    ///
    /// A present but malformed `Authorization` header is an error; absent
    /// or unreadable CSRF values are just `None`.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        let bearer = match headers.get(AUTHORIZATION) {
            None => None,
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| AuthError::MalformedToken("unreadable authorization header".into()))?;
                let token = value
                    .strip_prefix("Bearer ")
                    .ok_or_else(|| AuthError::MalformedToken("expected a bearer token".into()))?;
                Some(token.trim().to_owned())
            }
        };

        let csrf_header = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_owned());

        Ok(Self {
            bearer,
            csrf_cookie: cookie_value(headers, CSRF_COOKIE),
            csrf_header,
        })
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_owned())
}

/// `Set-Cookie` value for the CSRF half of a login.  Not `HttpOnly`: the
/// client script has to read it to echo it back in [`CSRF_HEADER`].
pub fn csrf_set_cookie(pair: &CsrfPair, max_age: i64) -> String {
    format!(
        "{CSRF_COOKIE}={}; Path=/; Max-Age={max_age}; SameSite=Strict; Secure",
        pair.cookie_value
    )
}

/// Axum extractor: authorizes the request and yields the subject.
///
/// Needs an `Arc<AuthSessionCoordinator>` extension.  Requests with an
/// unsafe method (anything but GET, HEAD, OPTIONS, TRACE) must also pass
/// the CSRF check.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use axum::{routing::post, Extension, Router};
/// use axum_session_authority::{
///     AuthConfig, AuthSessionCoordinator, Authorized, MemoryCredentialStore,
/// };
///
/// async fn update(user: Authorized) -> String {
///     format!("updated by {}", user.subject_id)
/// }
///
/// # fn example() -> Result<(), axum_session_authority::AuthError> {
/// let config = AuthConfig::from_env()?;
/// let coordinator = AuthSessionCoordinator::new(&config, Arc::new(MemoryCredentialStore::new()))?;
/// let app: Router = Router::new()
///     .route("/profile", post(update))
///     .layer(Extension(Arc::new(coordinator)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Authorized {
    pub subject_id: String,

    /// Raw bearer token, needed again for logout.
    pub token: String,
}

impl<S> FromRequestParts<S> for Authorized
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let coordinator = parts
            .extensions
            .get::<Arc<AuthSessionCoordinator>>()
            .cloned()
            .ok_or_else(|| {
                AuthError::ConfigError(
                    "AuthSessionCoordinator not found: add `.layer(Extension(Arc::new(coordinator)))`"
                        .into(),
                )
            })?;

        let creds = RequestCredentials::from_headers(&parts.headers)?;
        let token = creds
            .bearer
            .ok_or_else(|| AuthError::MalformedToken("missing bearer token".into()))?;

        let subject_id = coordinator.authorize_parts(
            &token,
            creds.csrf_cookie.as_deref(),
            creds.csrf_header.as_deref(),
            !parts.method.is_safe(),
        )?;

        Ok(Authorized { subject_id, token })
    }
}

/// Like [`Authorized`] but yields `None` when no `Authorization` header
/// is present.  A bad token still rejects.
#[derive(Debug, Clone)]
pub struct OptionalAuthorized(Option<Authorized>);

impl OptionalAuthorized {
    pub fn into_inner(self) -> Option<Authorized> {
        self.0
    }
    pub fn as_ref(&self) -> Option<&Authorized> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for OptionalAuthorized
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if parts.headers.get(AUTHORIZATION).is_none() {
            return Ok(Self(None));
        }
        Authorized::from_request_parts(parts, state)
            .await
            .map(|a| Self(Some(a)))
    }
}
