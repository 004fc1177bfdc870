use std::fmt;

use base64::{
    alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use secrecy::SecretString;

use crate::error::MalformedCredentials;

const BASIC_PREFIX: &str = "Basic ";
const ANONYMOUS_NAME: &str = "guest";

/// Standard padded alphabet, tolerating non-zero trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// The resolved identity of a request.
///
/// Identities are constructed fresh on every request, either from the
/// `Authorization` header, from the name stored in the session or, when
/// neither is available, as the anonymous identity.
///
/// # Examples
///
/// ```rust
/// use axum_identity::Identity;
///
/// let guest = Identity::anonymous();
/// assert_eq!(guest.name(), "guest");
/// assert!(guest.is_anonymous());
///
/// let ferris = Identity::new("ferris");
/// assert!(!ferris.is_anonymous());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    name: String,
}

impl Identity {
    /// Creates an identity with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The identity used when neither credentials nor a session user are
    /// present.
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_NAME)
    }

    /// Returns the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for the anonymous identity.
    pub fn is_anonymous(&self) -> bool {
        self.name == ANONYMOUS_NAME
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A username and password pair decoded from an `Authorization` header.
///
/// The password is kept behind [`SecretString`] and is redacted from `Debug`
/// output.
#[derive(Debug)]
pub struct Credentials {
    /// The username, taken verbatim from the decoded header.
    pub username: String,

    /// The password; everything after the first `:`.
    pub password: SecretString,
}

impl Credentials {
    /// Decodes the value of an `Authorization: Basic` header.
    ///
    /// The `Basic ` prefix is stripped when present. Values without the prefix
    /// are decoded as raw base64 rather than rejected. Invalid UTF-8 in the
    /// decoded payload is replaced with `U+FFFD` rather than rejected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use axum_identity::Credentials;
    /// use secrecy::ExposeSecret;
    ///
    /// let creds = Credentials::from_authorization("Basic Ym9iOnB3").unwrap();
    /// assert_eq!(creds.username, "bob");
    /// assert_eq!(creds.password.expose_secret(), "pw");
    /// ```
    pub fn from_authorization(value: &str) -> Result<Self, MalformedCredentials> {
        let encoded = match value.strip_prefix(BASIC_PREFIX) {
            Some(encoded) => encoded,
            None => {
                tracing::debug!("authorization header lacks the basic scheme prefix");
                value
            }
        };

        let decoded = LENIENT
            .decode(encoded)
            .map_err(|_| MalformedCredentials::Undecodable)?;
        let decoded = String::from_utf8_lossy(&decoded);

        let (username, password) = decoded
            .split_once(':')
            .ok_or(MalformedCredentials::MissingPassword)?;

        Ok(Self {
            username: username.to_owned(),
            password: SecretString::from(password.to_owned()),
        })
    }
}
