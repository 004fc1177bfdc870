use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_layer::Layer;
use tower_service::Service;

use crate::{AuthError, Authorizer, Identity};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Checks that `identity` holds the `required` capability.
///
/// Fails with [`AuthError::Forbidden`] when the authorizer denies access and
/// with [`AuthError::Backend`] when it errors.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(identity.name = identity.name(), required = required),
    err
)]
pub async fn authorize<Z: Authorizer>(
    authorizer: &Z,
    identity: &Identity,
    required: &str,
) -> Result<(), AuthError> {
    let allowed = authorizer
        .has_capability(identity, required)
        .await
        .map_err(AuthError::backend)?;

    if allowed {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// A layer which only lets requests through when the resolved identity holds
/// a capability.
///
/// Install it with `route_layer` beneath
/// [`IdentityManagerLayer`](crate::IdentityManagerLayer). Denied requests are
/// answered with `401 Unauthorized` and the body `Not Authorized`.
///
/// # Examples
///
/// ```rust
/// use axum::{routing::get, Router};
/// use axum_identity::{AdminOnly, Identity, RequireCapabilityLayer};
///
/// let app: Router = Router::new()
///     .route(
///         "/secret",
///         get(|identity: Identity| async move { format!("Hello Secret Agent {identity}!") }),
///     )
///     .route_layer(RequireCapabilityLayer::new(AdminOnly, "secret access"));
/// ```
#[derive(Debug, Clone)]
pub struct RequireCapabilityLayer<Z> {
    authorizer: Z,
    capability: Arc<str>,
}

impl<Z: Authorizer> RequireCapabilityLayer<Z> {
    /// Create a new [`RequireCapabilityLayer`] requiring `capability`.
    pub fn new(authorizer: Z, capability: impl Into<Arc<str>>) -> Self {
        Self {
            authorizer,
            capability: capability.into(),
        }
    }
}

impl<S, Z: Authorizer> Layer<S> for RequireCapabilityLayer<Z> {
    type Service = RequireCapability<S, Z>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireCapability {
            inner,
            authorizer: self.authorizer.clone(),
            capability: Arc::clone(&self.capability),
        }
    }
}

/// A Tower service that enforces a capability requirement.
#[derive(Debug, Clone)]
pub struct RequireCapability<S, Z> {
    inner: S,
    authorizer: Z,
    capability: Arc<str>,
}

impl<S, Z> Service<Request> for RequireCapability<S, Z>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Z: Authorizer,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let identity = req.extensions().get::<Identity>().cloned();
        let authorizer = self.authorizer.clone();
        let capability = Arc::clone(&self.capability);

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(identity) = identity else {
                tracing::error!("identity not found in request extensions");
                return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            };

            match authorize(&authorizer, &identity, &capability).await {
                Ok(()) => inner.call(req).await,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}
