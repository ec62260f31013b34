use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::post::{PostUpload, PostView},
    policy::{authorize, Action, Resource},
    services::posts::{read_upload, PostService, MAX_POST_IMAGES},
    AppState,
};

/// Kept images count against the same limit as new ones.
fn check_image_count(upload: &PostUpload) -> AppResult<()> {
    if upload.existing_images.len() + upload.files.len() > MAX_POST_IMAGES {
        return Err(AppError::bad_request("لا يمكن رفع أكثر من 5 صور"));
    }
    Ok(())
}

pub async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<PostView>>> {
    let posts = PostService::list(&state.db, &state.config.public_base_url).await?;
    Ok(Json(posts))
}

pub async fn get_post(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<PostView>> {
    let post = PostService::require(&state.db, id).await?;
    let view = PostService::view(&state.db, post, &state.config.public_base_url).await?;
    Ok(Json(view))
}

pub async fn create_post(
    State(state): State<AppState>,
    Actor(actor): Actor,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<PostView>)> {
    authorize(&actor, Action::Publish, Resource::Post { author: None })?;
    let upload = read_upload(multipart).await?;

    let view = PostService::create(
        &state.db,
        &actor.cin,
        &upload,
        &state.config.upload_dir,
        &state.config.public_base_url,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> AppResult<Json<PostView>> {
    let post = PostService::require(&state.db, id).await?;
    authorize(&actor, Action::Edit, Resource::Post { author: post.author_id.as_deref() })?;
    let upload = read_upload(multipart).await?;
    check_image_count(&upload)?;

    let view = PostService::update(
        &state.db,
        &post,
        &upload,
        &state.config.upload_dir,
        &state.config.public_base_url,
    )
    .await?;
    Ok(Json(view))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    let post = PostService::require(&state.db, id).await?;
    authorize(&actor, Action::Edit, Resource::Post { author: post.author_id.as_deref() })?;
    PostService::delete(&state.db, &post, &state.config.upload_dir).await?;
    Ok(Json(json!({ "message": "تم حذف المنشور بنجاح" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn kept_and_new_images_share_the_limit() {
        let mut upload = PostUpload {
            existing_images: vec!["a".into(), "b".into(), "c".into()],
            files: vec![Bytes::from_static(b"x"), Bytes::from_static(b"y")],
            ..Default::default()
        };
        assert!(check_image_count(&upload).is_ok());
        upload.files.push(Bytes::from_static(b"z"));
        assert!(check_image_count(&upload).is_err());
    }
}
