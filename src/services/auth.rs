use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::TokenKeys,
    models::member::Member,
    services::members::MemberService,
};

/// Tokens handed out on a successful sign-in.
pub struct SignedIn {
    pub member: Member,
    pub access_token: String,
    pub refresh_token: String,
}

pub struct AuthService;

impl AuthService {
    /// Checks the password against the stored bcrypt hash. Unknown cin and
    /// wrong password are indistinguishable to the caller.
    pub async fn sign_in(
        pool: &PgPool,
        keys: &TokenKeys,
        cin: Option<&str>,
        password: Option<&str>,
    ) -> AppResult<SignedIn> {
        let (cin, password) = match (cin.map(str::trim), password) {
            (Some(cin), Some(password)) if !cin.is_empty() && !password.is_empty() => (cin, password),
            _ => return Err(AppError::bad_request("الرجاء ملء جميع الحقول")),
        };

        let member = MemberService::find(pool, cin)
            .await?
            .ok_or_else(|| AppError::bad_request("المعلومات غير صحيحة"))?;

        let valid = bcrypt::verify(password, &member.password_hash).unwrap_or(false);
        if !valid {
            tracing::info!(%cin, "sign-in rejected");
            return Err(AppError::bad_request("المعلومات غير صحيحة"));
        }

        let access_token = keys.issue_access(&member.cin)?;
        let refresh_token = keys.issue_refresh(&member.cin)?;
        Ok(SignedIn { member, access_token, refresh_token })
    }
}
