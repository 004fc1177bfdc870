use axum::http::Request;

use crate::{Identity, Session};

/// The identity and session of the request currently being handled.
///
/// Inserted into the request extensions by
/// [`IdentityManager`](crate::IdentityManager) before the inner service runs,
/// so every downstream handler sees exactly one resolved identity.
#[derive(Debug, Clone)]
pub struct RequestContext {
    identity: Identity,
    session: Session,
}

impl RequestContext {
    pub(crate) fn new(identity: Identity, session: Session) -> Self {
        Self { identity, session }
    }

    /// The resolved identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The session of this request.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the context attached to `req`, or `None` if identity resolution
    /// has not run for it.
    pub fn from_request<B>(req: &Request<B>) -> Option<&Self> {
        req.extensions().get::<Self>()
    }
}

/// Returns the identity resolved for `req`, or `None` if resolution has not
/// run.
pub fn current_identity<B>(req: &Request<B>) -> Option<&Identity> {
    RequestContext::from_request(req).map(RequestContext::identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_before_resolution() {
        let req = Request::new(());
        assert!(RequestContext::from_request(&req).is_none());
        assert!(current_identity(&req).is_none());
    }

    #[test]
    fn returns_attached_identity() {
        let mut req = Request::new(());
        req.extensions_mut().insert(RequestContext::new(
            Identity::new("alice"),
            Session::new(),
        ));

        assert_eq!(current_identity(&req).map(Identity::name), Some("alice"));
    }
}
