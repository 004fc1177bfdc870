use std::{
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    http::{self, header::AUTHORIZATION, HeaderValue, Request, Response},
    response::IntoResponse,
};
use futures::FutureExt;
use tower_cookies::{CookieManager, CookieManagerLayer, Cookies, Key};
use tower_layer::Layer;
use tower_service::Service;
use tracing::Instrument;

use crate::{
    error::MalformedCredentials,
    resolver::IdentityResolver,
    session::{
        ConfigError, CookieCodec, CookieProtection, SameSitePolicy, SessionConfig,
    },
    AuthError, Authenticator, RequestContext, Session,
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

fn internal_error<B: Default>() -> Response<B> {
    let mut res = Response::default();
    *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    res
}

/// A middleware that provides [`Session`] as a request extension and persists
/// it once the inner service has finished.
#[derive(Debug, Clone)]
pub struct SessionManager<S> {
    inner: S,
    codec: Arc<CookieCodec>,
}

impl<ReqBody, ResBody, S> Service<Request<ReqBody>> for SessionManager<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let codec = Arc::clone(&self.codec);

        // Because the inner service can panic until ready, we need to ensure we only
        // use the ready service.
        //
        // See: https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
                tracing::error!("cookies not found in request extensions");
                return Ok(internal_error());
            };

            let session = codec.load(&cookies);
            req.extensions_mut().insert(session.clone());

            let res = match AssertUnwindSafe(async move { inner.call(req).await })
                .catch_unwind()
                .await
            {
                Ok(res) => res,
                Err(_) => {
                    tracing::error!("inner service panicked");
                    Ok(internal_error())
                }
            };

            session.persist(&codec, &cookies);

            res
        })
    }
}

/// A layer for providing [`Session`] as a request extension.
///
/// The session is stored in a single cookie, signed (the default) or
/// encrypted with the provided [`Key`].
#[derive(Debug, Clone)]
pub struct SessionManagerLayer {
    codec: CookieCodec,
}

impl SessionManagerLayer {
    /// Create a new [`SessionManagerLayer`] with the provided key and cookie
    /// settings.
    pub fn new(key: Key, config: SessionConfig) -> Self {
        Self {
            codec: CookieCodec::new(key, config),
        }
    }

    /// Create a new [`SessionManagerLayer`] from raw secret bytes.
    ///
    /// The secret must be at least [`MIN_SECRET_LEN`](crate::MIN_SECRET_LEN) bytes long.
    pub fn from_secret(secret: &[u8], config: SessionConfig) -> Result<Self, ConfigError> {
        let key = Key::try_from(secret).map_err(|_| ConfigError::SecretTooShort {
            len: secret.len(),
        })?;

        Ok(Self::new(key, config))
    }

    /// Configures the name of the session cookie.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.codec.config.cookie_name = name.into();
        self
    }

    /// Configures the `Secure` attribute of the session cookie.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.codec.config.secure = secure;
        self
    }

    /// Configures the `Max-Age` of the session cookie in seconds. `None`
    /// yields a browser-session cookie.
    pub fn with_max_age(mut self, max_age_secs: Option<i64>) -> Self {
        self.codec.config.max_age_secs = max_age_secs;
        self
    }

    /// Configures the `SameSite` attribute of the session cookie.
    pub fn with_same_site(mut self, same_site: SameSitePolicy) -> Self {
        self.codec.config.same_site = same_site;
        self
    }

    /// Encrypts the session cookie instead of only signing it.
    pub fn with_private(mut self) -> Self {
        self.codec.config.protection = CookieProtection::Private;
        self
    }

    /// Writes the session cookie on every response.
    pub fn with_always_save(mut self, always_save: bool) -> Self {
        self.codec.config.always_save = always_save;
        self
    }

    /// The effective cookie settings.
    pub fn config(&self) -> &SessionConfig {
        &self.codec.config
    }
}

impl<S> Layer<S> for SessionManagerLayer {
    type Service = CookieManager<SessionManager<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        let session_manager = SessionManager {
            inner,
            codec: Arc::new(self.codec.clone()),
        };

        CookieManagerLayer::new().layer(session_manager)
    }
}

/// A middleware that resolves the request's [`Identity`](crate::Identity) and
/// provides it, along with [`RequestContext`], as request extensions.
///
/// Requests with a malformed `Authorization` header are answered with
/// `401 Unauthorized` and never reach the inner service.
#[derive(Debug, Clone)]
pub struct IdentityManager<S, A> {
    inner: S,
    resolver: IdentityResolver<A>,
}

impl<S, A: Authenticator> IdentityManager<S, A> {
    /// Create a new [`IdentityManager`] with the provided resolver.
    pub fn new(inner: S, resolver: IdentityResolver<A>) -> Self {
        Self { inner, resolver }
    }
}

impl<ReqBody, S, A> Service<Request<ReqBody>> for IdentityManager<S, A>
where
    S: Service<Request<ReqBody>, Response = axum::response::Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    A: Authenticator,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let span = tracing::info_span!("identity", identity.name = tracing::field::Empty);

        let resolver = self.resolver.clone();

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let Some(session) = req.extensions().get::<Session>().cloned() else {
                    tracing::error!("session not found in request extensions");
                    return Ok(internal_error());
                };

                let header = match req
                    .headers()
                    .get(AUTHORIZATION)
                    .map(HeaderValue::to_str)
                    .transpose()
                {
                    Ok(header) => header,
                    Err(_) => {
                        tracing::debug!("authorization header is not visible ascii");
                        let err = AuthError::from(MalformedCredentials::Undecodable);
                        return Ok(err.into_response());
                    }
                };

                let identity = match resolver.resolve(header, &session).await {
                    Ok(identity) => identity,
                    Err(err) => {
                        tracing::debug!(err = %err, "rejecting request");
                        return Ok(err.into_response());
                    }
                };

                tracing::Span::current().record("identity.name", identity.name());

                req.extensions_mut().insert(identity.clone());
                req.extensions_mut()
                    .insert(RequestContext::new(identity, session));

                inner.call(req).await
            }
            .instrument(span),
        )
    }
}

/// A layer combining [`SessionManagerLayer`] and [`IdentityManager`].
///
/// Built with [`IdentityManagerLayerBuilder`].
#[derive(Debug, Clone)]
pub struct IdentityManagerLayer<A: Authenticator> {
    resolver: IdentityResolver<A>,
    session_manager_layer: SessionManagerLayer,
}

impl<S, A: Authenticator> Layer<S> for IdentityManagerLayer<A> {
    type Service = CookieManager<SessionManager<IdentityManager<S, A>>>;

    fn layer(&self, inner: S) -> Self::Service {
        let identity_manager = IdentityManager::new(inner, self.resolver.clone());

        self.session_manager_layer.layer(identity_manager)
    }
}

/// Builder for the [`IdentityManagerLayer`].
///
/// # Examples
///
/// ```rust
/// use axum::{routing::get, Router};
/// use axum_identity::{
///     AcceptAnyPassword, Identity, IdentityManagerLayerBuilder, SessionConfig,
///     SessionManagerLayer,
/// };
/// use tower_cookies::Key;
///
/// let session_layer = SessionManagerLayer::new(Key::generate(), SessionConfig::default());
/// let identity_layer = IdentityManagerLayerBuilder::new(AcceptAnyPassword, session_layer).build();
///
/// let app: Router = Router::new()
///     .route("/", get(|identity: Identity| async move { format!("Hello {identity}!") }))
///     .layer(identity_layer);
/// ```
#[derive(Debug, Clone)]
pub struct IdentityManagerLayerBuilder<A: Authenticator> {
    authenticator: A,
    session_manager_layer: SessionManagerLayer,
    user_key: Option<&'static str>,
}

impl<A: Authenticator> IdentityManagerLayerBuilder<A> {
    /// Create a new [`IdentityManagerLayerBuilder`] with the provided
    /// authenticator.
    pub fn new(authenticator: A, session_manager_layer: SessionManagerLayer) -> Self {
        Self {
            authenticator,
            session_manager_layer,
            user_key: None,
        }
    }

    /// Configure the session key holding the username. If not configured it
    /// will default to "user".
    pub fn with_user_key(mut self, user_key: &'static str) -> Self {
        self.user_key = Some(user_key);
        self
    }

    /// Build the [`IdentityManagerLayer`].
    pub fn build(self) -> IdentityManagerLayer<A> {
        let mut resolver = IdentityResolver::new(self.authenticator);
        if let Some(user_key) = self.user_key {
            resolver = resolver.with_user_key(user_key);
        }

        IdentityManagerLayer {
            resolver,
            session_manager_layer: self.session_manager_layer,
        }
    }
}
