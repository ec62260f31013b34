use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::family::{IdRequest, LevelRequest, PageRequest, SearchRequest, ALL_LEVELS},
    policy::{authorize, Action, CommitteeScope, Resource},
    routes::{owning_committee, required_id},
    services::{
        children::ChildService,
        committees::CommitteeService,
        families::{editor_view, FamilyService},
        uploads,
    },
    validation::{coerce_id, family as forms},
    AppState,
};

const FAMILY_NOT_FOUND: &str = "العائلة غير موجودة";
const CHILD_NOT_FOUND: &str = "الطفل غير موجود";

fn ok(message: &str, data: impl serde::Serialize) -> Json<Value> {
    Json(json!({ "success": true, "message": message, "data": data }))
}

/// Page numbers arrive as numbers or numeric strings; anything else is page 1.
fn page_number(request: &PageRequest) -> i64 {
    request
        .page
        .as_ref()
        .and_then(coerce_id)
        .filter(|p| *p > 0)
        .map(i64::from)
        .unwrap_or(1)
}

async fn family_committee(state: &AppState, actor: &Actor, id: i32, action: Action) -> AppResult<i32> {
    let committee_id = FamilyService::committee_of(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(FAMILY_NOT_FOUND))?;
    authorize(&actor.0, action, Resource::Record { committee_id: Some(committee_id) })?;
    Ok(committee_id)
}

async fn child_committee(state: &AppState, actor: &Actor, id: i32, action: Action) -> AppResult<i32> {
    let committee_id = ChildService::committee_of(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(CHILD_NOT_FOUND))?;
    authorize(&actor.0, action, Resource::Record { committee_id: Some(committee_id) })?;
    Ok(committee_id)
}

pub async fn create_family(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let committee_id = owning_committee(CommitteeScope::of(&actor.0), &body)?;
    authorize(&actor.0, Action::Edit, Resource::Record { committee_id: Some(committee_id) })?;

    let mut form = forms::family_form(&body, false)?;
    let upload_dir = &state.config.upload_dir;
    let written = uploads::store_child_avatars(upload_dir, &mut form.children).await?;
    let family =
        uploads::discard_on_error(upload_dir, &written, FamilyService::create(&state.db, committee_id, &form))
            .await?;

    Ok((StatusCode::CREATED, ok("Family created successfully", family)))
}

/// Either a committee transfer (`committee` present) or a full editor save.
pub async fn update_family(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    if let Some(raw) = body.get("committee") {
        let family_id = required_id(body.get("id"), "معرف العائلة مطلوب")?;
        let target = coerce_id(raw).ok_or_else(|| AppError::bad_request("معرف اللجنة غير صالح"))?;
        family_committee(&state, &actor, family_id, Action::Edit).await?;
        authorize(&actor.0, Action::Edit, Resource::Record { committee_id: Some(target) })?;
        if CommitteeService::find(&state.db, target).await?.is_none() {
            return Err(AppError::not_found("اللجنة غير موجودة"));
        }

        let family = FamilyService::transfer(&state.db, family_id, target).await?;
        tracing::info!(family_id, to = target, by = %actor.0.cin, "family moved");
        return Ok(ok("Family transferred successfully", family));
    }

    let mut form = forms::family_form(&body, true)?;
    let family_id = form.id.ok_or_else(|| AppError::field("id", "معرف العائلة مطلوب"))?;
    family_committee(&state, &actor, family_id, Action::Edit).await?;

    let upload_dir = &state.config.upload_dir;
    let written = uploads::store_child_avatars(upload_dir, &mut form.children).await?;
    let family = uploads::discard_on_error(upload_dir, &written, FamilyService::update(&state.db, &form)).await?;
    Ok(ok("Family updated successfully", family))
}

pub async fn three_families(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Value>> {
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let (families, count) = FamilyService::preview(&state.db, committee, 3).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Families retrieved successfully",
        "data": families,
        "count": count,
    })))
}

pub async fn family_data(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<IdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "معرف العائلة غير صالح")?;
    family_committee(&state, &actor, id, Action::View).await?;
    let card = FamilyService::card(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(FAMILY_NOT_FOUND))?;
    Ok(ok("Family data retrieved successfully", card))
}

pub async fn families_of_page(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<PageRequest>,
) -> AppResult<Json<Value>> {
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let families = FamilyService::page(&state.db, committee, page_number(&body)).await?;
    Ok(ok("Families retrieved successfully", families))
}

pub async fn four_children(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Value>> {
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let children = ChildService::preview(&state.db, committee, 4).await?;
    Ok(ok("Children retrieved successfully", children))
}

pub async fn children_of_page(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<PageRequest>,
) -> AppResult<Json<Value>> {
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let children = ChildService::page(&state.db, committee, page_number(&body)).await?;
    Ok(ok("Children retrieved successfully", children))
}

pub async fn search_children(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<SearchRequest>,
) -> AppResult<Json<Value>> {
    let term = body.search_term.unwrap_or_default();
    if term.trim().is_empty() {
        return Ok(ok("Children retrieved successfully", Vec::<Value>::new()));
    }
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let children = ChildService::search(&state.db, committee, &term).await?;
    Ok(ok("Children retrieved successfully", children))
}

pub async fn family_update_data(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<IdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "معرف العائلة غير صالح")?;
    family_committee(&state, &actor, id, Action::View).await?;
    let detail = FamilyService::detail(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(FAMILY_NOT_FOUND))?;
    let view = editor_view(detail, &state.config.public_base_url)?;
    Ok(ok("Family data retrieved successfully", view))
}

pub async fn child_data(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<IdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "Invalid child ID")?;
    child_committee(&state, &actor, id, Action::View).await?;
    let profile = ChildService::profile(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(CHILD_NOT_FOUND))?;

    let avatar = profile
        .avatar
        .as_deref()
        .map(|a| uploads::public_url(&state.config.public_base_url, a));
    let committee = json!({ "id": profile.committee_id, "name": profile.committee_name });
    let mut data = json!(profile);
    data["avatar"] = json!(avatar);
    data["committee"] = committee;
    Ok(ok("Child data retrieved successfully", data))
}

/// Child editor payload: profile fields and grades, no family context.
pub async fn child_with_grades(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<IdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "Invalid child ID")?;
    child_committee(&state, &actor, id, Action::View).await?;
    let found = ChildService::with_grades(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found(CHILD_NOT_FOUND))?;

    let grades: Vec<Value> = found
        .semester_grades
        .iter()
        .map(|g| json!({ "yearNumber": g.year_number, "yearLabel": g.year_label, "grade": g.grade }))
        .collect();
    let child = found.child;
    Ok(Json(json!({
        "avatar": child.avatar.as_deref().map(|a| uploads::public_url(&state.config.public_base_url, a)),
        "fullName": child.full_name,
        "dateOfBirth": child.date_of_birth,
        "gender": child.gender,
        "schoolLevel": child.school_level,
        "semesterGrades": grades,
    })))
}

pub async fn update_child(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let (id, mut form) = forms::child_update_form(&body)?;
    child_committee(&state, &actor, id, Action::Edit).await?;

    let upload_dir = &state.config.upload_dir;
    let fresh = form.avatar.as_deref().is_some_and(uploads::is_inline);
    form.avatar = uploads::store_avatar(upload_dir, form.avatar.as_deref()).await?;
    let written: Vec<String> = form.avatar.iter().filter(|_| fresh).cloned().collect();
    let mut child = uploads::discard_on_error(upload_dir, &written, ChildService::update(&state.db, id, &form)).await?;
    child.child.avatar = child
        .child
        .avatar
        .map(|a| uploads::public_url(&state.config.public_base_url, &a));
    Ok(ok("Child updated successfully", child))
}

pub async fn children_by_level(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<LevelRequest>,
) -> AppResult<Json<Value>> {
    let level = body
        .selected_level
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| ALL_LEVELS.to_string());
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let children = ChildService::names_by_level(&state.db, committee, level.trim()).await?;
    Ok(ok("Children data retrieved successfully", children))
}

pub async fn all_widows(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Value>> {
    let committee = CommitteeScope::of(&actor.0).committee_id();
    let widows = ChildService::widow_names(&state.db, committee).await?;
    Ok(ok("Widows retrieved successfully", widows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(value: Value) -> PageRequest {
        serde_json::from_value(json!({ "page": value })).unwrap()
    }

    #[test]
    fn page_numbers_default_to_first_page() {
        assert_eq!(page_number(&page(json!(3))), 3);
        assert_eq!(page_number(&page(json!("2"))), 2);
        assert_eq!(page_number(&page(json!(0))), 1);
        assert_eq!(page_number(&page(json!("x"))), 1);
        assert_eq!(page_number(&PageRequest { page: None }), 1);
    }

    #[test]
    fn responses_carry_success_envelope() {
        let Json(body) = ok("done", vec![1, 2]);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "done");
        assert_eq!(body["data"], json!([1, 2]));
    }
}
