use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::json;

use crate::{
    config::Config,
    error::AppError,
    models::{
        auth::{Claims, Session},
        member::Member,
    },
    services::members::MemberService,
    AppState,
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

const MISSING_REFRESH: &str = "Refresh token is missing. Please log in.";
const INVALID_REFRESH: &str = "Invalid or expired refresh token. Please log in.";

/// Signing secrets and lifetimes for the two session tokens.
#[derive(Clone)]
pub struct TokenKeys {
    access_secret: String,
    refresh_secret: String,
    pub access_ttl: Duration,
    pub renewed_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(75),
            renewed_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            access_ttl: Duration::minutes(config.jwt_access_minutes),
            renewed_ttl: Duration::minutes(config.jwt_renewed_minutes),
            refresh_ttl: Duration::days(config.jwt_refresh_days),
            ..Self::new(&config.jwt_secret, &config.jwt_refresh_secret)
        }
    }

    /// Access token handed out at sign-in.
    pub fn issue_access(&self, cin: &str) -> anyhow::Result<String> {
        sign(cin, &self.access_secret, self.access_ttl)
    }

    /// Short-lived access token minted from a still-valid refresh token.
    pub fn issue_renewed(&self, cin: &str) -> anyhow::Result<String> {
        sign(cin, &self.access_secret, self.renewed_ttl)
    }

    pub fn issue_refresh(&self, cin: &str) -> anyhow::Result<String> {
        sign(cin, &self.refresh_secret, self.refresh_ttl)
    }

    pub fn decode_access(&self, token: &str) -> anyhow::Result<Claims> {
        verify(token, &self.access_secret)
    }

    pub fn decode_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        verify(token, &self.refresh_secret)
    }

    /// Cookies outlive a renewed token; an expired one is simply renewed again.
    pub fn access_cookie(&self, token: &str) -> String {
        session_cookie(ACCESS_COOKIE, token, self.access_ttl.num_seconds())
    }

    pub fn refresh_cookie(&self, token: &str) -> String {
        session_cookie(REFRESH_COOKIE, token, self.refresh_ttl.num_seconds())
    }
}

fn sign(cin: &str, secret: &str, ttl: Duration) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        cin: cin.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp().max(0) as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

fn verify(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;
    let data = decode::<Claims>(token, &key, &validation)?;
    Ok(data.claims)
}

/// Extract a named cookie value from request headers.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

pub fn cleared_cookie(name: &str) -> String {
    format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Both `Set-Cookie` headers that drop the session.
pub fn clear_session_cookies() -> AppendHeaders<[(header::HeaderName, String); 2]> {
    AppendHeaders([
        (header::SET_COOKIE, cleared_cookie(ACCESS_COOKIE)),
        (header::SET_COOKIE, cleared_cookie(REFRESH_COOKIE)),
    ])
}

/// 401 with both cookies cleared.
pub fn reject(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        clear_session_cookies(),
        Json(json!({ "success": false, "message": message, "error": "Unauthorized" })),
    )
        .into_response()
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCheck {
    /// Access token valid: proceed as its subject.
    Valid(String),
    /// Access token missing or stale but refresh valid: proceed as the
    /// refresh subject and hand out `access_token`.
    Renewed { cin: String, access_token: String },
    Rejected(&'static str),
}

/// The refresh token decides whether a session exists at all; the access
/// token only decides whether a new one must be minted.
pub fn check_session(
    access: Option<&str>,
    refresh: Option<&str>,
    keys: &TokenKeys,
) -> anyhow::Result<SessionCheck> {
    let Some(refresh) = refresh else {
        return Ok(SessionCheck::Rejected(MISSING_REFRESH));
    };
    let refreshed = match keys.decode_refresh(refresh) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("refresh token rejected: {e}");
            return Ok(SessionCheck::Rejected(INVALID_REFRESH));
        }
    };

    if let Some(claims) = access.and_then(|token| keys.decode_access(token).ok()) {
        return Ok(SessionCheck::Valid(claims.cin));
    }

    let access_token = keys.issue_renewed(&refreshed.cin)?;
    Ok(SessionCheck::Renewed { cin: refreshed.cin, access_token })
}

/// Route-layer guard: resolves the session from cookies and stores it in
/// request extensions for [`Actor`].
pub async fn require_session(
    State(keys): State<Arc<TokenKeys>>,
    mut request: Request,
    next: Next,
) -> Response {
    let access = get_cookie(request.headers(), ACCESS_COOKIE);
    let refresh = get_cookie(request.headers(), REFRESH_COOKIE);

    match check_session(access.as_deref(), refresh.as_deref(), &keys) {
        Ok(SessionCheck::Valid(cin)) => {
            request.extensions_mut().insert(Session { cin });
            next.run(request).await
        }
        Ok(SessionCheck::Renewed { cin, access_token }) => {
            tracing::debug!(%cin, "access token renewed");
            request.extensions_mut().insert(Session { cin });
            let mut response = next.run(request).await;
            match HeaderValue::from_str(&keys.access_cookie(&access_token)) {
                Ok(cookie) => {
                    response.headers_mut().append(header::SET_COOKIE, cookie);
                }
                Err(e) => tracing::error!("renewed cookie is not a valid header: {e}"),
            }
            response
        }
        Ok(SessionCheck::Rejected(message)) => reject(message),
        Err(e) => AppError::Internal(e).into_response(),
    }
}

/// The member behind the current session. Handlers that take an `Actor`
/// must sit behind [`require_session`].
#[derive(Debug, Clone)]
pub struct Actor(pub Member);

impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::unauthorized("رقم الهوية مطلوب"))?;

        let member = MemberService::find(&state.db, &session.cin)
            .await?
            .ok_or_else(|| AppError::unauthorized("العضو غير موجود"))?;
        Ok(Actor(member))
    }
}
