//! Files under the upload directory: child avatars sent inline as data URIs
//! and post images sent as multipart parts.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use rand::{distributions::Alphanumeric, Rng};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::family::ChildForm;

/// URL path prefix under which stored files are served.
pub const UPLOADS_PREFIX: &str = "/uploads/";

fn extension_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Gif => Some("gif"),
        _ => None,
    }
}

/// Sniff the real image type of an upload; the declared type is not trusted.
pub fn image_extension(bytes: &[u8]) -> AppResult<&'static str> {
    image::guess_format(bytes)
        .ok()
        .and_then(extension_for)
        .ok_or_else(|| AppError::bad_request("صيغة الصورة غير مدعومة"))
}

/// `data:image/png;base64,....` → raw bytes.
pub fn decode_data_uri(raw: &str) -> AppResult<Vec<u8>> {
    let (_, payload) = raw
        .split_once(";base64,")
        .ok_or_else(|| AppError::bad_request("صيغة الصورة غير صالحة"))?;
    STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::bad_request("صيغة الصورة غير صالحة"))
}

/// Reduce a stored or absolute avatar URL to its `/uploads/...` path;
/// anything pointing elsewhere is dropped.
pub fn normalize_upload_path(raw: &str) -> Option<String> {
    let path = match raw.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..])?,
        None => raw,
    };
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.starts_with(UPLOADS_PREFIX)
        .then(|| path.to_string())
        .filter(|p| !p.contains(".."))
}

fn avatar_file_name(ext: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("child_{}_{}.{}", chrono::Utc::now().timestamp_millis(), suffix, ext)
}

async fn write_file(upload_dir: &str, name: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    let dir = PathBuf::from(upload_dir);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    Ok(path)
}

/// An avatar sent as image bytes rather than as a stored path.
pub fn is_inline(raw: &str) -> bool {
    raw.trim_start().starts_with("data:image")
}

/// Stores an inline avatar and returns the `/uploads/...` path to persist.
pub async fn store_avatar(upload_dir: &str, raw: Option<&str>) -> AppResult<Option<String>> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if !is_inline(raw) {
        return Ok(normalize_upload_path(raw));
    }

    let bytes = decode_data_uri(raw)?;
    let name = avatar_file_name(image_extension(&bytes)?);
    write_file(upload_dir, &name, &bytes).await?;
    tracing::debug!(file = %name, size = bytes.len(), "avatar stored");
    Ok(Some(format!("{UPLOADS_PREFIX}{name}")))
}

/// Replaces every child's avatar field with its stored path and returns the
/// files written by this call. A failure removes the ones already written.
pub async fn store_child_avatars(upload_dir: &str, children: &mut [ChildForm]) -> AppResult<Vec<String>> {
    let mut written = Vec::new();
    for child in children.iter_mut() {
        let fresh = child.avatar.as_deref().is_some_and(is_inline);
        match store_avatar(upload_dir, child.avatar.as_deref()).await {
            Ok(stored) => {
                if fresh {
                    written.extend(stored.iter().cloned());
                }
                child.avatar = stored;
            }
            Err(e) => {
                remove_all(upload_dir, &written).await;
                return Err(e);
            }
        }
    }
    Ok(written)
}

/// Awaits `work`; if it fails, the files written for it are removed.
pub async fn discard_on_error<T>(
    upload_dir: &str,
    written: &[String],
    work: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    let result = work.await;
    if result.is_err() && !written.is_empty() {
        tracing::debug!(files = written.len(), "removing uploads of a failed write");
        remove_all(upload_dir, written).await;
    }
    result
}

/// Stores one post image; returns the relative url persisted on the image row.
pub async fn store_post_image(upload_dir: &str, bytes: &[u8]) -> AppResult<String> {
    let ext = image_extension(bytes)?;
    let name = format!("{}.{}", Uuid::new_v4(), ext);
    write_file(upload_dir, &name, bytes).await?;
    Ok(format!("uploads/{name}"))
}

pub async fn remove_all(upload_dir: &str, stored_urls: &[String]) {
    for url in stored_urls {
        remove(upload_dir, url).await;
    }
}

/// Best effort: a file that is already gone is not an error.
pub async fn remove(upload_dir: &str, stored_url: &str) {
    let Some(name) = Path::new(stored_url).file_name() else {
        return;
    };
    let path = Path::new(upload_dir).join(name);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "upload removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "could not remove upload: {e}"),
    }
}

/// Absolute URL for a stored path (`/uploads/x.png` or `uploads/x.png`).
pub fn public_url(base_url: &str, stored: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), stored.trim_start_matches('/'))
}
