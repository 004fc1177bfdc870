use std::convert::Infallible;

use async_trait::async_trait;

use crate::{Credentials, Identity};

const ADMIN_NAME: &str = "admin";

/// A backend which can authenticate credentials.
///
/// Returning `Ok(None)` rejects the credentials; the request is then answered
/// with `401 Unauthorized`.
///
/// # Examples
///
/// ```rust
/// use std::{collections::HashMap, convert::Infallible};
///
/// use async_trait::async_trait;
/// use axum_identity::{Authenticator, Credentials, Identity};
/// use secrecy::ExposeSecret;
///
/// #[derive(Clone)]
/// struct Backend {
///     passwords: HashMap<String, String>,
/// }
///
/// #[async_trait]
/// impl Authenticator for Backend {
///     type Error = Infallible;
///
///     async fn authenticate(
///         &self,
///         creds: Credentials,
///     ) -> Result<Option<Identity>, Self::Error> {
///         let known = self.passwords.get(&creds.username);
///         Ok(known
///             .filter(|pw| pw.as_str() == creds.password.expose_secret())
///             .map(|_| Identity::new(creds.username)))
///     }
/// }
/// ```
#[async_trait]
pub trait Authenticator: Clone + Send + Sync + 'static {
    /// An error which can occur during authentication.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Authenticates the given credentials.
    async fn authenticate(&self, creds: Credentials) -> Result<Option<Identity>, Self::Error>;
}

/// A backend which decides whether an identity holds a capability.
#[async_trait]
pub trait Authorizer: Clone + Send + Sync + 'static {
    /// An error which can occur during authorization.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns `true` when `identity` may access resources labelled
    /// `capability`.
    async fn has_capability(
        &self,
        identity: &Identity,
        capability: &str,
    ) -> Result<bool, Self::Error>;
}

/// Accepts any credentials, using the username verbatim.
///
/// The password is not checked. Replace this with a real [`Authenticator`]
/// backed by a credential store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyPassword;

#[async_trait]
impl Authenticator for AcceptAnyPassword {
    type Error = Infallible;

    async fn authenticate(&self, creds: Credentials) -> Result<Option<Identity>, Self::Error> {
        Ok(Some(Identity::new(creds.username)))
    }
}

/// Grants every capability to the identity named `admin` and nothing to
/// anyone else.
///
/// The capability label is ignored. Replace this with a real [`Authorizer`]
/// keyed on identity and label.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminOnly;

#[async_trait]
impl Authorizer for AdminOnly {
    type Error = Infallible;

    async fn has_capability(
        &self,
        identity: &Identity,
        _capability: &str,
    ) -> Result<bool, Self::Error> {
        Ok(identity.name() == ADMIN_NAME)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_owned(),
            password: SecretString::from(password.to_owned()),
        }
    }

    #[tokio::test]
    async fn accept_any_password_uses_username() {
        let identity = AcceptAnyPassword
            .authenticate(creds("ferris", "bogus"))
            .await
            .unwrap();
        assert_eq!(identity, Some(Identity::new("ferris")));
    }

    #[tokio::test]
    async fn admin_only_grants_admin() {
        let admin = Identity::new("admin");
        assert!(AdminOnly
            .has_capability(&admin, "secret access")
            .await
            .unwrap());
        assert!(AdminOnly.has_capability(&admin, "anything").await.unwrap());
    }

    #[tokio::test]
    async fn admin_only_denies_others() {
        assert!(!AdminOnly
            .has_capability(&Identity::new("bob"), "secret access")
            .await
            .unwrap());
        assert!(!AdminOnly
            .has_capability(&Identity::anonymous(), "secret access")
            .await
            .unwrap());
    }
}
