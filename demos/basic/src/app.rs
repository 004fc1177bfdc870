use std::env;

use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use axum_identity::{
    tower_cookies::Key, AcceptAnyPassword, AdminOnly, BasicChallenge, Identity,
    IdentityManagerLayerBuilder, RequireCapabilityLayer, Session, SessionConfig,
    SessionManagerLayer,
};

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const REALM: &str = "axum-identity";

pub struct App {
    bind: String,
    session_layer: SessionManagerLayer,
}

impl App {
    /// Reads `IDENTITY_BIND`, `IDENTITY_SESSION_SECRET` and
    /// `IDENTITY_SESSION_CONFIG`.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let bind = env::var("IDENTITY_BIND").unwrap_or_else(|_| DEFAULT_BIND.into());

        let config = match env::var("IDENTITY_SESSION_CONFIG") {
            Ok(json) => serde_json::from_str(&json)?,
            Err(_) => SessionConfig::default(),
        };

        let session_layer = match env::var("IDENTITY_SESSION_SECRET") {
            Ok(secret) => SessionManagerLayer::from_secret(secret.as_bytes(), config)?,
            Err(_) => {
                tracing::warn!(
                    "IDENTITY_SESSION_SECRET is unset, sessions will not survive a restart"
                );
                SessionManagerLayer::new(Key::generate(), config)
            }
        };

        Ok(Self {
            bind,
            session_layer,
        })
    }

    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        let identity_layer =
            IdentityManagerLayerBuilder::new(AcceptAnyPassword, self.session_layer).build();

        let app = Router::new()
            .route("/secret", get(secret))
            .route_layer(RequireCapabilityLayer::new(AdminOnly, "secret access"))
            .route("/", get(hello))
            .route("/login", get(login))
            .route("/logout", get(logout))
            .layer(identity_layer);

        let listener = tokio::net::TcpListener::bind(&self.bind).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, app.into_make_service()).await?;

        Ok(())
    }
}

async fn hello(identity: Identity) -> impl IntoResponse {
    format!("Hello {identity}!")
}

async fn secret(identity: Identity) -> impl IntoResponse {
    format!("Hello Secret Agent {identity}!")
}

async fn login(identity: Identity) -> Response {
    if identity.is_anonymous() {
        return BasicChallenge::new(REALM).into_response();
    }

    format!("Logged in as {identity}.").into_response()
}

async fn logout(session: Session) -> impl IntoResponse {
    session.invalidate();
    "Goodbye!"
}
