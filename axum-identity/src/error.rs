use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::session;

/// Boxed error returned by authentication and authorization backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Ways in which an `Authorization` header can fail to yield credentials.
///
/// The `Display` output of each variant is the exact body of the `401`
/// response sent to the client.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedCredentials {
    /// The header is not valid base64, or does not decode to UTF-8.
    #[error("Could not decode Authorization header")]
    Undecodable,

    /// The decoded header has no `:` separating username and password.
    #[error("Authorization header requires a username and password")]
    MissingPassword,
}

/// An error which halts the request pipeline.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The `Authorization` header could not be decoded.
    #[error(transparent)]
    Malformed(#[from] MalformedCredentials),

    /// The authenticator rejected the supplied credentials.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// The identity lacks the required capability.
    #[error("Not Authorized")]
    Forbidden,

    /// A mapping to [`session::Error`].
    #[error(transparent)]
    Session(#[from] session::Error),

    /// The authenticator or authorizer failed.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),
}

impl AuthError {
    pub(crate) fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// The status code this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) | Self::InvalidCredentials | Self::Forbidden => {
                StatusCode::UNAUTHORIZED
            }
            Self::Session(_) | Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(err = %self, "identity pipeline failed");
            return (status, "Internal Server Error").into_response();
        }

        (status, self.to_string()).into_response()
    }
}

/// A `401` response asking the client for Basic credentials.
///
/// # Examples
///
/// ```rust
/// use axum::response::IntoResponse;
/// use axum_identity::BasicChallenge;
///
/// let res = BasicChallenge::new("restricted").into_response();
/// assert_eq!(
///     res.headers()["www-authenticate"],
///     "Basic realm=\"restricted\""
/// );
/// ```
#[derive(Debug, Clone)]
pub struct BasicChallenge {
    realm: String,
}

impl BasicChallenge {
    /// Creates a challenge for the given realm.
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
        }
    }
}

impl IntoResponse for BasicChallenge {
    fn into_response(self) -> Response {
        let realm = self.realm.replace('"', "");
        let mut res = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        match HeaderValue::try_from(format!("Basic realm=\"{realm}\"")) {
            Ok(value) => {
                res.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
            Err(err) => {
                tracing::error!(err = %err, "invalid realm for basic challenge");
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
        res
    }
}
