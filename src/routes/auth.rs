use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{
    error::AppResult,
    middleware::auth::{
        check_session, clear_session_cookies, get_cookie, reject, SessionCheck, TokenKeys,
        ACCESS_COOKIE, REFRESH_COOKIE,
    },
    models::member::SignInRequest,
    services::{auth::AuthService, members::MemberService},
    AppState,
};

const UNKNOWN_MEMBER: &str = "Invalid access token. Please log in.";

pub async fn sign_in(
    State(state): State<AppState>,
    Json(body): Json<SignInRequest>,
) -> AppResult<Response> {
    let signed = AuthService::sign_in(
        &state.db,
        &state.keys,
        body.cin.as_deref(),
        body.password.as_deref(),
    )
    .await?;
    tracing::info!(cin = %signed.member.cin, "member signed in");

    Ok((
        StatusCode::OK,
        AppendHeaders([
            (header::SET_COOKIE, state.keys.access_cookie(&signed.access_token)),
            (header::SET_COOKIE, state.keys.refresh_cookie(&signed.refresh_token)),
        ]),
        Json(json!({ "message": "تم تسجيل الدخول بنجاح", "userData": signed.member })),
    )
        .into_response())
}

/// Same state machine as the guard, answering with the member profile.
pub async fn verify_tokens(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let keys: &Arc<TokenKeys> = &state.keys;
    let access = get_cookie(&headers, ACCESS_COOKIE);
    let refresh = get_cookie(&headers, REFRESH_COOKIE);

    let (cin, renewed) = match check_session(access.as_deref(), refresh.as_deref(), keys)? {
        SessionCheck::Valid(cin) => (cin, None),
        SessionCheck::Renewed { cin, access_token } => (cin, Some(access_token)),
        SessionCheck::Rejected(message) => return Ok(reject(message)),
    };

    let Some(member) = MemberService::find(&state.db, &cin).await? else {
        return Ok(reject(UNKNOWN_MEMBER));
    };

    let body = Json(json!({ "message": "Valid tokens", "member": member }));
    Ok(match renewed {
        Some(token) => (
            AppendHeaders([(header::SET_COOKIE, keys.access_cookie(&token))]),
            body,
        )
            .into_response(),
        None => body.into_response(),
    })
}

pub async fn logout() -> Response {
    (
        StatusCode::OK,
        clear_session_cookies(),
        Json(json!({ "message": "تم تسجيل الخروج بنجاح" })),
    )
        .into_response()
}
