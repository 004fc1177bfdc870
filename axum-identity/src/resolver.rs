use crate::{AuthError, Authenticator, Credentials, Identity, Session};

/// Default session key holding the authenticated username.
pub const DEFAULT_USER_KEY: &str = "user";

/// Resolves the identity of a request from its `Authorization` header and
/// session.
///
/// Resolution follows these rules:
///
/// 1. A non-empty `Authorization` header always wins. It is decoded, checked
///    by the [`Authenticator`] and, when accepted, the username is written to
///    the session so later requests without the header stay logged in.
/// 2. Without a header the username stored in the session is used.
/// 3. Otherwise the request is [anonymous](Identity::anonymous).
#[derive(Debug, Clone)]
pub struct IdentityResolver<A> {
    authenticator: A,
    user_key: &'static str,
}

impl<A: Authenticator> IdentityResolver<A> {
    /// Creates a resolver storing the username under
    /// [`DEFAULT_USER_KEY`].
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            user_key: DEFAULT_USER_KEY,
        }
    }

    /// Stores the username under `user_key` instead.
    pub fn with_user_key(mut self, user_key: &'static str) -> Self {
        self.user_key = user_key;
        self
    }

    /// The session key holding the username.
    pub fn user_key(&self) -> &'static str {
        self.user_key
    }

    /// Resolves the identity, updating `session` when credentials are
    /// accepted.
    ///
    /// The session is never modified when an error is returned.
    #[tracing::instrument(level = "debug", skip_all, fields(identity.name), err)]
    pub async fn resolve(
        &self,
        header: Option<&str>,
        session: &Session,
    ) -> Result<Identity, AuthError> {
        let identity = match header.filter(|value| !value.is_empty()) {
            Some(value) => self.authenticate_header(value, session).await?,
            None => self.session_identity(session),
        };

        tracing::Span::current().record("identity.name", identity.name());

        Ok(identity)
    }

    async fn authenticate_header(
        &self,
        value: &str,
        session: &Session,
    ) -> Result<Identity, AuthError> {
        let creds = Credentials::from_authorization(value)?;

        let identity = self
            .authenticator
            .authenticate(creds)
            .await
            .map_err(AuthError::backend)?
            .ok_or(AuthError::InvalidCredentials)?;

        session.set(self.user_key, identity.name())?;

        Ok(identity)
    }

    fn session_identity(&self, session: &Session) -> Identity {
        match session.get::<String>(self.user_key) {
            Ok(Some(name)) => Identity::new(name),
            Ok(None) => Identity::anonymous(),
            Err(err) => {
                tracing::warn!(err = %err, key = self.user_key, "ignoring session user");
                Identity::anonymous()
            }
        }
    }
}
