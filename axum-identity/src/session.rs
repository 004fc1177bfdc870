//! A per-request session backed by a single signed or encrypted cookie.
//!
//! The whole session mapping travels in the cookie: there is no server-side
//! session table. [`SessionManager`](crate::SessionManager) loads the session
//! before the inner service runs and persists it exactly once afterwards.

use std::{collections::HashMap, fmt, sync::Arc};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tower_cookies::{cookie::SameSite, Cookie, Cookies, Key};

/// Minimum length in bytes of the secret used to sign or encrypt cookies.
pub const MIN_SECRET_LEN: usize = 64;

const DEFAULT_COOKIE_NAME: &str = "axum-identity.session";
const DEFAULT_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Session errors.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A value could not be serialized into the session.
    #[error("could not serialize session value: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A stored value could not be deserialized into the requested type.
    #[error("could not deserialize session value: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Errors raised while building the session layer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The provided secret is shorter than [`MIN_SECRET_LEN`].
    #[error("session secret must be at least {MIN_SECRET_LEN} bytes, got {len}")]
    SecretTooShort {
        /// Length of the rejected secret.
        len: usize,
    },
}

/// How the session cookie is protected from the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieProtection {
    /// Readable by the client but tamper-evident (HMAC).
    #[default]
    Signed,
    /// Encrypted and authenticated.
    Private,
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSitePolicy {
    /// `SameSite=Strict`.
    Strict,
    /// `SameSite=Lax`.
    #[default]
    Lax,
    /// `SameSite=None`.
    None,
}

impl From<SameSitePolicy> for SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        }
    }
}

/// Cookie settings for the session.
///
/// Deserializable so applications can load it alongside the rest of their
/// configuration; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name.
    pub cookie_name: String,

    /// Cookie `Path` attribute.
    pub path: String,

    /// Cookie `Domain` attribute.
    pub domain: Option<String>,

    /// Cookie `Max-Age` in seconds. `None` yields a browser-session cookie.
    pub max_age_secs: Option<i64>,

    /// Cookie `Secure` attribute.
    pub secure: bool,

    /// Cookie `HttpOnly` attribute.
    pub http_only: bool,

    /// Cookie `SameSite` attribute.
    pub same_site: SameSitePolicy,

    /// Whether the cookie is signed or encrypted.
    pub protection: CookieProtection,

    /// Write the cookie on every response, even for a fresh session that was
    /// never modified.
    pub always_save: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            path: "/".to_owned(),
            domain: None,
            max_age_secs: Some(DEFAULT_MAX_AGE_SECS),
            secure: true,
            http_only: true,
            same_site: SameSitePolicy::Lax,
            protection: CookieProtection::Signed,
            always_save: false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, Value>,
    modified: bool,
    invalidated: bool,
    persisted: bool,
    // Loaded from a valid cookie, so the cookie is renewed on persist.
    from_cookie: bool,
}

/// A mutable key-value mapping scoped to one request.
///
/// Values are stored as JSON. Cloning yields another handle to the same
/// session, which is how the session is shared between the layers and the
/// handler of a single request.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

impl Session {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_data(data: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                data,
                from_cookie: true,
                ..Default::default()
            })),
        }
    }

    /// Gets the value stored under `key`, deserialized as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        self.get_value(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(Error::Deserialize)
    }

    /// Gets the raw JSON value stored under `key`.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.inner.lock().data.get(key).cloned()
    }

    /// Stores `value` under `key`.
    ///
    /// Storing a value equal to the current one leaves the session
    /// unmodified.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), Error> {
        let value = serde_json::to_value(value).map_err(Error::Serialize)?;

        let mut inner = self.inner.lock();
        if inner.data.get(key) != Some(&value) {
            inner.data.insert(key.to_owned(), value);
            inner.modified = true;
        }

        Ok(())
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock();
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.modified = true;
        }
        removed
    }

    /// Clears the session and instructs the client to discard the cookie.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.data.clear();
        inner.modified = true;
        inner.invalidated = true;
    }

    /// Returns `true` if the session changed during this request.
    pub fn is_modified(&self) -> bool {
        self.inner.lock().modified
    }

    /// Returns `true` once [`invalidate`](Self::invalidate) has been called.
    pub fn is_invalidated(&self) -> bool {
        self.inner.lock().invalidated
    }

    /// Returns `true` if the session holds no values.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    /// Writes the session to the response cookies.
    ///
    /// A session that arrived in a cookie is always written back, renewing
    /// its expiry. A fresh session is written only once modified. Only the
    /// first call has an effect. Returns `true` when a cookie was written or
    /// removed.
    pub(crate) fn persist(&self, codec: &CookieCodec, cookies: &Cookies) -> bool {
        let mut inner = self.inner.lock();
        if inner.persisted {
            return false;
        }
        inner.persisted = true;

        if inner.invalidated {
            codec.remove(cookies);
            return true;
        }

        if !inner.modified && !inner.from_cookie && !codec.config.always_save {
            return false;
        }

        match codec.encode(&inner.data) {
            Ok(value) => {
                codec.write(cookies, value);
                true
            }
            Err(err) => {
                tracing::error!(err = %err, "could not encode session");
                false
            }
        }
    }
}

/// Reads and writes the session cookie.
#[derive(Clone)]
pub(crate) struct CookieCodec {
    key: Key,
    pub(crate) config: SessionConfig,
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("key", &"<redacted>")
            .field("config", &self.config)
            .finish()
    }
}

impl CookieCodec {
    pub(crate) fn new(key: Key, config: SessionConfig) -> Self {
        Self { key, config }
    }

    /// Loads the session, starting a fresh one when the cookie is absent,
    /// fails verification or cannot be decoded.
    pub(crate) fn load(&self, cookies: &Cookies) -> Session {
        let name = self.config.cookie_name.as_str();
        let cookie = match self.config.protection {
            CookieProtection::Signed => cookies.signed(&self.key).get(name),
            CookieProtection::Private => cookies.private(&self.key).get(name),
        };

        let Some(cookie) = cookie else {
            if cookies.get(name).is_some() {
                tracing::warn!(cookie = name, "session cookie failed verification");
            }
            return Session::new();
        };

        match self.decode(cookie.value()) {
            Ok(data) => Session::from_data(data),
            Err(err) => {
                tracing::warn!(err = %err, cookie = name, "discarding undecodable session");
                Session::new()
            }
        }
    }

    fn encode(&self, data: &HashMap<String, Value>) -> Result<String, Error> {
        let json = serde_json::to_vec(data).map_err(Error::Serialize)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(&self, value: &str) -> Result<HashMap<String, Value>, Error> {
        let json = URL_SAFE_NO_PAD.decode(value).map_err(|err| {
            Error::Deserialize(serde::de::Error::custom(format!("invalid base64: {err}")))
        })?;
        serde_json::from_slice(&json).map_err(Error::Deserialize)
    }

    fn write(&self, cookies: &Cookies, value: String) {
        let cookie = self.build_cookie(value);
        match self.config.protection {
            CookieProtection::Signed => cookies.signed(&self.key).add(cookie),
            CookieProtection::Private => cookies.private(&self.key).add(cookie),
        }
    }

    fn remove(&self, cookies: &Cookies) {
        let cookie = self.build_cookie(String::new());
        match self.config.protection {
            CookieProtection::Signed => cookies.signed(&self.key).remove(cookie),
            CookieProtection::Private => cookies.private(&self.key).remove(cookie),
        }
    }

    fn build_cookie(&self, value: String) -> Cookie<'static> {
        let config = &self.config;
        let mut builder = Cookie::build((config.cookie_name.clone(), value))
            .path(config.path.clone())
            .secure(config.secure)
            .http_only(config.http_only)
            .same_site(config.same_site.into());

        if let Some(ref domain) = config.domain {
            builder = builder.domain(domain.clone());
        }

        if let Some(secs) = config.max_age_secs {
            builder = builder.max_age(time::Duration::seconds(secs));
        }

        builder.build()
    }
}
