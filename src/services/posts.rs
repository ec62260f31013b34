use std::collections::HashMap;

use axum::extract::Multipart;
use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::post::{Image, ImageView, Post, PostUpload, PostView},
    services::uploads,
    validation::member::post_text,
};

pub const MAX_POST_IMAGES: usize = 5;

const POST_COLUMNS: &str = "id, title, content, author_id, created_at, updated_at";

/// Reads the `title`, `content`, `existingImages` and `images` parts.
/// Unknown parts are ignored.
pub async fn read_upload(mut multipart: Multipart) -> AppResult<PostUpload> {
    let mut upload = PostUpload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("طلب غير صالح: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        let invalid = |e: axum::extract::multipart::MultipartError| {
            AppError::bad_request(format!("طلب غير صالح: {e}"))
        };
        match name.as_str() {
            "title" => upload.title = field.text().await.map_err(invalid)?,
            "content" => upload.content = field.text().await.map_err(invalid)?,
            "existingImages" | "existingImages[]" => {
                upload.existing_images.push(field.text().await.map_err(invalid)?)
            }
            "images" => {
                if upload.files.len() == MAX_POST_IMAGES {
                    return Err(AppError::bad_request("لا يمكن رفع أكثر من 5 صور"));
                }
                if !declared_image(field.content_type(), field.file_name()) {
                    return Err(AppError::bad_request("يسمح فقط بملفات الصور"));
                }
                upload.files.push(field.bytes().await.map_err(invalid)?);
            }
            _ => {}
        }
    }
    Ok(upload)
}

/// Part declared as an image, by content type or else by file name. The
/// bytes are still sniffed before anything is written.
fn declared_image(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let declared = content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .or_else(|| file_name.and_then(|name| mime_guess::from_path(name).first()));
    declared.is_some_and(|m| m.type_() == mime::IMAGE)
}

/// Stored images whose public URL the editor did not send back.
pub fn images_to_drop(images: &[Image], kept_urls: &[String], base_url: &str) -> Vec<Image> {
    images
        .iter()
        .filter(|img| !kept_urls.contains(&uploads::public_url(base_url, &img.url)))
        .cloned()
        .collect()
}

pub fn post_view(post: Post, images: Vec<Image>, base_url: &str) -> PostView {
    PostView {
        date: post.created_at.format("%d/%m/%Y").to_string(),
        images: images
            .into_iter()
            .map(|image| ImageView {
                full_url: uploads::public_url(base_url, &image.url),
                image,
            })
            .collect(),
        post,
    }
}

pub struct PostService;

impl PostService {
    pub async fn find(pool: &PgPool, id: i32) -> AppResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(post)
    }

    pub async fn require(pool: &PgPool, id: i32) -> AppResult<Post> {
        Self::find(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("لم يتم العثور على المنشور"))
    }

    async fn images_of(pool: &PgPool, post_ids: &[i32]) -> AppResult<Vec<Image>> {
        let images = sqlx::query_as::<_, Image>(
            "SELECT id, post_id, url, position FROM images
             WHERE post_id = ANY($1)
             ORDER BY post_id, position, id",
        )
        .bind(post_ids)
        .fetch_all(pool)
        .await?;
        Ok(images)
    }

    pub async fn list(pool: &PgPool, base_url: &str) -> AppResult<Vec<PostView>> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await?;
        let ids: Vec<i32> = posts.iter().map(|p| p.id).collect();
        let mut by_post: HashMap<i32, Vec<Image>> = HashMap::new();
        for image in Self::images_of(pool, &ids).await? {
            by_post.entry(image.post_id).or_default().push(image);
        }
        Ok(posts
            .into_iter()
            .map(|post| {
                let images = by_post.remove(&post.id).unwrap_or_default();
                post_view(post, images, base_url)
            })
            .collect())
    }

    pub async fn view(pool: &PgPool, post: Post, base_url: &str) -> AppResult<PostView> {
        let images = Self::images_of(pool, &[post.id]).await?;
        Ok(post_view(post, images, base_url))
    }

    /// Writes every uploaded file; on failure the ones already written are removed.
    async fn store_files(upload_dir: &str, upload: &PostUpload) -> AppResult<Vec<String>> {
        let mut stored = Vec::with_capacity(upload.files.len());
        for bytes in &upload.files {
            match uploads::store_post_image(upload_dir, bytes).await {
                Ok(url) => stored.push(url),
                Err(e) => {
                    for url in &stored {
                        uploads::remove(upload_dir, url).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(stored)
    }

    async fn insert_images(conn: &mut PgConnection, post_id: i32, first_position: i32, urls: &[String]) -> AppResult<()> {
        for (offset, url) in urls.iter().enumerate() {
            sqlx::query("INSERT INTO images (post_id, url, position) VALUES ($1, $2, $3)")
                .bind(post_id)
                .bind(url)
                .bind(first_position + offset as i32)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    pub async fn create(
        pool: &PgPool,
        author: &str,
        upload: &PostUpload,
        upload_dir: &str,
        base_url: &str,
    ) -> AppResult<PostView> {
        post_text(&upload.title, &upload.content)?;
        let urls = Self::store_files(upload_dir, upload).await?;

        let result: AppResult<Post> = async {
            let mut tx = pool.begin().await?;
            let post = sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (title, content, author_id) VALUES ($1, $2, $3)
                 RETURNING {POST_COLUMNS}"
            ))
            .bind(upload.title.trim())
            .bind(upload.content.trim())
            .bind(author)
            .fetch_one(&mut *tx)
            .await?;
            Self::insert_images(&mut tx, post.id, 0, &urls).await?;
            tx.commit().await?;
            Ok::<_, AppError>(post)
        }
        .await;

        let post = match result {
            Ok(post) => post,
            Err(e) => {
                for url in &urls {
                    uploads::remove(upload_dir, url).await;
                }
                return Err(e);
            }
        };
        tracing::info!(post_id = post.id, %author, images = urls.len(), "post created");
        Self::view(pool, post, base_url).await
    }

    /// Keeps the images listed in `existingImages`, drops the rest and
    /// appends the new files after them.
    pub async fn update(
        pool: &PgPool,
        post: &Post,
        upload: &PostUpload,
        upload_dir: &str,
        base_url: &str,
    ) -> AppResult<PostView> {
        post_text(&upload.title, &upload.content)?;
        let current = Self::images_of(pool, &[post.id]).await?;
        let dropped = images_to_drop(&current, &upload.existing_images, base_url);
        let dropped_ids: Vec<i32> = dropped.iter().map(|img| img.id).collect();
        let next_position = current.iter().map(|img| img.position + 1).max().unwrap_or(0);
        let urls = Self::store_files(upload_dir, upload).await?;

        let result: AppResult<Post> = async {
            let mut tx = pool.begin().await?;
            sqlx::query("DELETE FROM images WHERE id = ANY($1)")
                .bind(&dropped_ids)
                .execute(&mut *tx)
                .await?;
            let updated = sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title = $2, content = $3, updated_at = NOW()
                 WHERE id = $1
                 RETURNING {POST_COLUMNS}"
            ))
            .bind(post.id)
            .bind(upload.title.trim())
            .bind(upload.content.trim())
            .fetch_one(&mut *tx)
            .await?;
            Self::insert_images(&mut tx, post.id, next_position, &urls).await?;
            tx.commit().await?;
            Ok::<_, AppError>(updated)
        }
        .await;

        let updated = match result {
            Ok(updated) => updated,
            Err(e) => {
                for url in &urls {
                    uploads::remove(upload_dir, url).await;
                }
                return Err(e);
            }
        };
        for image in &dropped {
            uploads::remove(upload_dir, &image.url).await;
        }
        tracing::info!(post_id = post.id, dropped = dropped.len(), added = urls.len(), "post updated");
        Self::view(pool, updated, base_url).await
    }

    pub async fn delete(pool: &PgPool, post: &Post, upload_dir: &str) -> AppResult<()> {
        let images = Self::images_of(pool, &[post.id]).await?;
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post.id)
            .execute(pool)
            .await?;
        for image in &images {
            uploads::remove(upload_dir, &image.url).await;
        }
        tracing::info!(post_id = post.id, images = images.len(), "post deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn only_image_parts_are_accepted() {
        assert!(declared_image(Some("image/png"), None));
        assert!(declared_image(None, Some("photo.JPG")));
        assert!(!declared_image(Some("application/pdf"), Some("photo.png")));
        assert!(!declared_image(None, Some("notes.txt")));
        assert!(!declared_image(None, None));
    }

    fn image(id: i32, url: &str) -> Image {
        Image { id, post_id: 1, url: url.into(), position: id }
    }

    #[test]
    fn images_missing_from_editor_are_dropped() {
        let images = vec![image(1, "uploads/a.png"), image(2, "uploads/b.png")];
        let kept = vec!["http://host:8080/uploads/b.png".to_string()];
        let dropped = images_to_drop(&images, &kept, "http://host:8080");
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].id, 1);

        assert_eq!(images_to_drop(&images, &[], "http://host:8080").len(), 2);
    }

    #[test]
    fn view_renders_date_and_full_urls() {
        let post = Post {
            id: 1,
            title: "Eid".into(),
            content: "Distribution".into(),
            author_id: Some("AB123".into()),
            created_at: Utc.with_ymd_and_hms(2024, 4, 9, 10, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 4, 9, 10, 0, 0).unwrap(),
        };
        let view = post_view(post, vec![image(3, "uploads/c.webp")], "http://host:8080/");
        assert_eq!(view.date, "09/04/2024");
        assert_eq!(view.images[0].full_url, "http://host:8080/uploads/c.webp");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["authorId"], "AB123");
        assert_eq!(json["images"][0]["fullUrl"], "http://host:8080/uploads/c.webp");
    }
}
