//! Basic-auth identity resolution with cookie-backed sessions for Axum.
//!
//! This crate provides Tower middleware which resolves who is making a request
//! and gates access to protected routes. With it, these workflows are made
//! easy:
//!
//! 1. Logging users in with an `Authorization: Basic` header,
//! 2. Staying logged in via a signed session cookie,
//! 3. Logging users out by invalidating the session,
//! 4. Accessing the current identity within a route,
//! 5. Protecting access to a resource.
//!
//! # Identity resolution
//!
//! Every request passing through [`IdentityManagerLayer`] is given exactly one
//! [`Identity`]:
//!
//! - When an `Authorization` header is present it always wins. The header is
//!   decoded into [`Credentials`], checked by an [`Authenticator`], and the
//!   resulting username is written to the session under `"user"`.
//! - Without a header the username stored in the session is used.
//! - Otherwise the request is anonymous and the identity is named `"guest"`.
//!
//! A header which cannot be decoded halts the request with
//! `401 Unauthorized`; the route handler never runs.
//!
//! # Sessions
//!
//! Sessions are stored entirely in one cookie, signed or encrypted with a
//! [`Key`](tower_cookies::Key). [`SessionManagerLayer`] loads the session
//! before the route runs and persists it exactly once afterwards, even when the
//! route panics. A session which arrived in a cookie is written back on every
//! response, so its expiry is renewed by activity. Calling
//! [`Session::invalidate`] removes the cookie from the client.
//!
//! # Authorization
//!
//! [`RequireCapabilityLayer`] asks an [`Authorizer`] whether the resolved
//! identity holds a capability label. Denied requests receive
//! `401 Unauthorized` with the body `Not Authorized`.
//!
//! [`AcceptAnyPassword`] and [`AdminOnly`] are placeholder backends: the
//! former does not check passwords and the latter only admits the identity
//! named `admin`. Real applications supply their own implementations.
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::{response::IntoResponse, routing::get, Router};
//! use axum_identity::{
//!     AcceptAnyPassword, AdminOnly, Identity, IdentityManagerLayerBuilder,
//!     RequireCapabilityLayer, Session, SessionConfig, SessionManagerLayer,
//! };
//! use tower_cookies::Key;
//!
//! async fn hello(identity: Identity) -> impl IntoResponse {
//!     format!("Hello {identity}!")
//! }
//!
//! async fn secret(identity: Identity) -> impl IntoResponse {
//!     format!("Hello Secret Agent {identity}!")
//! }
//!
//! async fn logout(session: Session) -> impl IntoResponse {
//!     session.invalidate();
//!     "Goodbye!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let session_layer = SessionManagerLayer::new(Key::generate(), SessionConfig::default());
//!     let identity_layer =
//!         IdentityManagerLayerBuilder::new(AcceptAnyPassword, session_layer).build();
//!
//!     let app = Router::new()
//!         .route("/secret", get(secret))
//!         .route_layer(RequireCapabilityLayer::new(AdminOnly, "secret access"))
//!         .route("/", get(hello))
//!         .route("/logout", get(logout))
//!         .layer(identity_layer);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use axum;
pub use secrecy;
pub use tower_cookies;
pub use tracing;

pub use self::{
    backend::{AcceptAnyPassword, AdminOnly, Authenticator, Authorizer},
    context::{current_identity, RequestContext},
    error::{AuthError, BasicChallenge, BoxError, MalformedCredentials},
    identity::{Credentials, Identity},
    require::{authorize, RequireCapability, RequireCapabilityLayer},
    resolver::{IdentityResolver, DEFAULT_USER_KEY},
    service::{
        IdentityManager, IdentityManagerLayer, IdentityManagerLayerBuilder, SessionManager,
        SessionManagerLayer,
    },
    session::{
        ConfigError, CookieProtection, SameSitePolicy, Session, SessionConfig, MIN_SECRET_LEN,
    },
};

mod backend;
mod context;
mod error;
mod extract;
mod identity;
mod require;
mod resolver;
mod service;
pub mod session;
