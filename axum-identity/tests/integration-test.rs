use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    routing::get,
    Router,
};
use axum_identity::{
    tower_cookies::{
        cookie::{Cookie, SameSite},
        Key,
    },
    AcceptAnyPassword, AdminOnly, Identity, IdentityManagerLayerBuilder, RequireCapabilityLayer,
    SameSitePolicy, Session, SessionConfig, SessionManagerLayer,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower::ServiceExt;

const COOKIE_NAME: &str = "axum-identity.session";

fn app_with(session_layer: SessionManagerLayer) -> Router {
    let identity_layer = IdentityManagerLayerBuilder::new(AcceptAnyPassword, session_layer).build();

    Router::new()
        .route(
            "/secret",
            get(|identity: Identity| async move { format!("Hello Secret Agent {identity}!") }),
        )
        .route_layer(RequireCapabilityLayer::new(AdminOnly, "secret access"))
        .route(
            "/",
            get(|identity: Identity| async move { format!("Hello {identity}!") }),
        )
        .route(
            "/logout",
            get(|session: Session| async move {
                session.invalidate();
            }),
        )
        .layer(identity_layer)
}

fn app(key: &Key) -> Router {
    app_with(SessionManagerLayer::new(key.clone(), SessionConfig::default()).with_secure(false))
}

fn basic(raw: &str) -> String {
    format!("Basic {}", STANDARD.encode(raw))
}

fn request(uri: &str, authorization: Option<&str>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn set_cookie(res: &Response<Body>) -> Option<Cookie<'static>> {
    res.headers()
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Cookie::parse(s.to_owned()).ok())
}

fn session_cookie(res: &Response<Body>) -> String {
    set_cookie(res)
        .expect("Response should have a valid session cookie")
        .stripped()
        .to_string()
}

async fn body_string(res: Response<Body>) -> String {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn anonymous_request_is_guest() {
    let key = Key::generate();
    let res = app(&key).oneshot(request("/", None, None)).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(set_cookie(&res).is_none());
    assert_eq!(body_string(res).await, "Hello guest!");
}

#[tokio::test]
async fn login_is_sticky_across_requests() {
    let key = Key::generate();
    let header = basic("bob:pw");

    let res = app(&key)
        .oneshot(request("/", Some(&header), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res);
    assert_eq!(body_string(res).await, "Hello bob!");

    // No header: the session names the user and its cookie is sent back.
    let res = app(&key)
        .oneshot(request("/", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res);
    assert_eq!(body_string(res).await, "Hello bob!");

    let res = app(&key)
        .oneshot(request("/", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello bob!");
}

#[tokio::test]
async fn session_expiry_is_renewed_on_every_request() {
    let key = Key::generate();
    let layer = || {
        SessionManagerLayer::new(key.clone(), SessionConfig::default())
            .with_secure(false)
            .with_max_age(Some(60))
    };

    let res = app_with(layer())
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let res = app_with(layer())
        .oneshot(request("/", None, Some(&cookie)))
        .await
        .unwrap();
    let renewed = set_cookie(&res).expect("Session cookie should be renewed");
    assert_eq!(renewed.name(), COOKIE_NAME);
    assert_eq!(renewed.max_age(), Some(time::Duration::seconds(60)));
    assert_eq!(body_string(res).await, "Hello bob!");
}

#[tokio::test]
async fn header_overrides_session_user() {
    let key = Key::generate();

    let res = app(&key)
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();
    let bob_cookie = session_cookie(&res);

    let res = app(&key)
        .oneshot(request("/", Some(&basic("alice:pw")), Some(&bob_cookie)))
        .await
        .unwrap();
    let alice_cookie = session_cookie(&res);
    assert_eq!(body_string(res).await, "Hello alice!");

    let res = app(&key)
        .oneshot(request("/", None, Some(&alice_cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello alice!");
}

#[tokio::test]
async fn malformed_header_does_not_alter_session() {
    let key = Key::generate();

    let res = app(&key)
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let res = app(&key)
        .oneshot(request("/", Some("Basic !!!"), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let resent = session_cookie(&res);
    assert_eq!(
        body_string(res).await,
        "Could not decode Authorization header"
    );

    let res = app(&key)
        .oneshot(request("/", None, Some(&resent)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello bob!");

    let res = app(&key)
        .oneshot(request("/", Some(&basic("no-separator")), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_string(res).await,
        "Authorization header requires a username and password"
    );

    let res = app(&key)
        .oneshot(request("/", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello bob!");
}

#[tokio::test]
async fn logout_reverts_to_guest() {
    let key = Key::generate();

    let res = app(&key)
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let res = app(&key)
        .oneshot(request("/logout", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let removal = set_cookie(&res).expect("Logout should remove the session cookie");
    assert_eq!(removal.name(), COOKIE_NAME);
    assert_eq!(removal.value(), "");
    assert_eq!(removal.max_age(), Some(time::Duration::ZERO));

    // The client discarded the cookie.
    let res = app(&key).oneshot(request("/", None, None)).await.unwrap();
    assert_eq!(body_string(res).await, "Hello guest!");
}

#[tokio::test]
async fn secret_requires_admin() {
    let key = Key::generate();

    let res = app(&key)
        .oneshot(request("/secret", Some(&basic("bob:pw")), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(res).await, "Not Authorized");

    let res = app(&key)
        .oneshot(request("/", Some(&basic("admin:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let res = app(&key)
        .oneshot(request("/secret", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_string(res).await, "Hello Secret Agent admin!");
}

#[tokio::test]
async fn tampered_cookie_starts_fresh_session() {
    let key = Key::generate();

    let res = app(&key)
        .oneshot(request("/", Some(&basic("admin:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let (name, value) = cookie.split_once('=').unwrap();
    let forged = format!("{name}=AAAA{}", &value[4..]);

    let res = app(&key)
        .oneshot(request("/secret", None, Some(&forged)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app(&key)
        .oneshot(request("/", None, Some(&forged)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello guest!");
}

#[tokio::test]
async fn cookie_from_another_key_is_ignored() {
    let res = app(&Key::generate())
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);

    let res = app(&Key::generate())
        .oneshot(request("/", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello guest!");
}

#[tokio::test]
async fn private_cookie_round_trip() {
    let key = Key::generate();
    let layer = || {
        SessionManagerLayer::new(key.clone(), SessionConfig::default())
            .with_secure(false)
            .with_private()
    };

    let res = app_with(layer())
        .oneshot(request("/", Some(&basic("carol:pw")), None))
        .await
        .unwrap();
    let cookie = session_cookie(&res);
    assert!(!cookie.contains("carol"));

    let res = app_with(layer())
        .oneshot(request("/", None, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(res).await, "Hello carol!");
}

#[tokio::test]
async fn cookie_attributes_follow_config() {
    let config: SessionConfig = serde_json::from_str(
        r#"{
            "cookie_name": "sid",
            "path": "/app",
            "domain": "example.com",
            "max_age_secs": 60,
            "secure": false,
            "same_site": "strict"
        }"#,
    )
    .unwrap();
    let res = app_with(SessionManagerLayer::new(Key::generate(), config))
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();

    let cookie = set_cookie(&res).unwrap();
    assert_eq!(cookie.name(), "sid");
    assert_eq!(cookie.path(), Some("/app"));
    assert_eq!(cookie.domain(), Some("example.com"));
    assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), None);
}

#[tokio::test]
async fn same_site_override_applies() {
    let layer = SessionManagerLayer::new(Key::generate(), SessionConfig::default())
        .with_secure(false)
        .with_same_site(SameSitePolicy::None);
    let res = app_with(layer)
        .oneshot(request("/", Some(&basic("bob:pw")), None))
        .await
        .unwrap();

    let cookie = set_cookie(&res).unwrap();
    assert_eq!(cookie.same_site(), Some(SameSite::None));
}

#[tokio::test]
async fn always_save_writes_fresh_session() {
    let layer = SessionManagerLayer::new(Key::generate(), SessionConfig::default())
        .with_secure(false)
        .with_always_save(true);

    let res = app_with(layer)
        .oneshot(request("/", None, None))
        .await
        .unwrap();
    assert!(set_cookie(&res).is_some());
    assert_eq!(body_string(res).await, "Hello guest!");
}
