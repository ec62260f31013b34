use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::get,
    Extension, Router,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use charity_api::{
    build_router,
    config::Config,
    middleware::auth::{require_session, TokenKeys},
    models::auth::Session,
    AppState,
};

fn keys() -> Arc<TokenKeys> {
    Arc::new(TokenKeys::new("test-access", "test-refresh"))
}

/// Echoes the identity the guard resolved.
fn guarded(keys: Arc<TokenKeys>) -> Router {
    Router::new()
        .route("/whoami", get(|Extension(session): Extension<Session>| async move { session.cin }))
        .route_layer(from_fn_with_state(keys, require_session))
}

fn request(uri: &str, cookies: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if !cookies.is_empty() {
        let header_value = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, header_value);
    }
    builder.body(Body::empty()).unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn both_tokens_valid_passes_without_new_cookie() {
    let keys = keys();
    let access = keys.issue_access("AB123").unwrap();
    let refresh = keys.issue_refresh("AB123").unwrap();

    let response = guarded(keys)
        .oneshot(request("/whoami", &[("accessToken", &access), ("refreshToken", &refresh)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_text(response).await, "AB123");
}

#[tokio::test]
async fn missing_access_is_renewed_from_refresh() {
    let keys = keys();
    let refresh = keys.issue_refresh("CD456").unwrap();

    let response = guarded(keys.clone())
        .oneshot(request("/whoami", &[("refreshToken", &refresh)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("accessToken="));
    assert!(cookies[0].contains("HttpOnly"));

    let token = cookies[0]
        .trim_start_matches("accessToken=")
        .split(';')
        .next()
        .unwrap();
    assert_eq!(keys.decode_access(token).unwrap().cin, "CD456");
    assert_eq!(body_text(response).await, "CD456");
}

#[tokio::test]
async fn missing_refresh_is_rejected_and_cookies_cleared() {
    let keys = keys();
    let access = keys.issue_access("AB123").unwrap();

    let response = guarded(keys)
        .oneshot(request("/whoami", &[("accessToken", &access)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=;") && c.contains("Max-Age=0")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=;") && c.contains("Max-Age=0")));

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Refresh token is missing. Please log in.");
}

#[tokio::test]
async fn refresh_signed_with_wrong_secret_is_rejected() {
    let forged = TokenKeys::new("other", "other").issue_refresh("AB123").unwrap();

    let response = guarded(keys())
        .oneshot(request("/whoami", &[("refreshToken", &forged)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

fn app() -> Router {
    let config = Config {
        database_url: "postgres://localhost/charity_unused".into(),
        jwt_secret: "test-access".into(),
        jwt_refresh_secret: "test-refresh".into(),
        jwt_access_minutes: 75,
        jwt_renewed_minutes: 15,
        jwt_refresh_days: 7,
        upload_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        public_base_url: "http://localhost:8080".into(),
        cors_origins: vec!["http://localhost:8081".into()],
        host: "127.0.0.1".into(),
        port: 0,
    };
    // Never connects: every request below is answered before the database.
    let pool = PgPoolOptions::new().connect_lazy(&config.database_url).unwrap();
    build_router(AppState::new(pool, config))
}

#[tokio::test]
async fn api_routes_require_a_session() {
    for uri in ["/api/get-statistics", "/api/committees", "/api/get-all-widows"] {
        let response = app().oneshot(request(uri, &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(set_cookies(&response).len(), 2, "{uri}");
    }
}

#[tokio::test]
async fn logout_clears_both_cookies() {
    let keys = keys();
    let access = keys.issue_access("AB123").unwrap();
    let refresh = keys.issue_refresh("AB123").unwrap();

    let response = app()
        .oneshot(request("/api/logout", &[("accessToken", &access), ("refreshToken", &refresh)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=;")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=;")));
}

#[tokio::test]
async fn verify_tokens_without_cookies_is_unauthorized() {
    let response = app().oneshot(request("/api/verify-tokens", &[])).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
