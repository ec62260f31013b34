use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Generic message shown for any failure we do not want to describe to clients.
pub const INTERNAL_MESSAGE: &str = "حدث خطأ ، يرجى المحاولة لاحقاً";

/// A single field-level validation failure, `path` is dot-joined (`children.0.data.fullName`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    /// Unique-key violation on a natural key (cin, email).
    #[error("{0}")]
    Duplicate(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A restrict-on-delete rule still has dependents.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Database(sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// One-field validation error, used for checks that need the database (duplicate widow cin).
    pub fn field(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(path, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Duplicate(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// English counterpart of the Arabic message, for API consumers and logs.
    fn label(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "Validation error",
            AppError::BadRequest(_) => "Bad request",
            AppError::Duplicate(_) => "Duplicate key",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "Not found",
            AppError::Conflict(_) => "Conflict",
            AppError::Database(_) | AppError::Internal(_) => "Internal server error",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23505") => {
                    return AppError::Duplicate("رقم الهوية أو البريد الإلكتروني موجود بالفعل".into())
                }
                // Postgres words the referencing side "insert or update on
                // table"; the referenced side is "update or delete on table".
                Some("23503") if db.message().starts_with("insert or update") => {
                    return AppError::BadRequest("السجل المرتبط غير موجود".into())
                }
                Some("23503") => {
                    return AppError::Conflict("لا يمكن الحذف لوجود بيانات مرتبطة".into())
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(errors) => json!({
                "success": false,
                "message": "خطأ في التحقق من البيانات",
                "error": self.label(),
                "errors": errors,
            }),
            AppError::Database(e) => {
                tracing::error!("database error: {e}");
                json!({ "success": false, "message": INTERNAL_MESSAGE, "error": self.label() })
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {e:#}");
                json!({ "success": false, "message": INTERNAL_MESSAGE, "error": self.label() })
            }
            other => json!({ "success": false, "message": other.to_string(), "error": self.label() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused at 10.0.0.5:5432"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("10.0.0.5"));
        assert!(text.contains(INTERNAL_MESSAGE));
    }

    #[tokio::test]
    async fn validation_errors_carry_field_paths() {
        let err = AppError::Validation(vec![FieldError::new("amounts", "bad total")]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"][0]["path"], "amounts");
        assert_eq!(body["success"], false);
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(AppError::Duplicate("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
    }
}
