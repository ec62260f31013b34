use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub content: String,
    /// `None` once the author's membership is deleted.
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i32,
    pub post_id: i32,
    /// Relative to the server root, e.g. `uploads/<file>`.
    pub url: String,
    pub position: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    #[serde(flatten)]
    pub image: Image,
    pub full_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    /// `dd/mm/yyyy` rendering of `createdAt`.
    pub date: String,
    pub images: Vec<ImageView>,
}

/// Parsed multipart body for post create/edit.
#[derive(Debug, Default)]
pub struct PostUpload {
    pub title: String,
    pub content: String,
    /// Absolute URLs of already-stored images the editor kept.
    pub existing_images: Vec<String>,
    /// Raw image parts, stored only once the text fields check out.
    pub files: Vec<Bytes>,
}
