use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::member::MemberRole,
    policy::{authorize, Action, CommitteeScope, Resource},
    routes::required_id,
    services::{committees::CommitteeService, members::MemberService},
    validation::{coerce_id, member as forms},
    AppState,
};

pub async fn create_committee(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    authorize(&actor, Action::Administer, Resource::Organisation)?;
    let form = forms::committee_form(&body)?;
    let created = CommitteeService::create(&state.db, &form).await?;
    Ok((StatusCode::CREATED, Json(json!(created))))
}

pub async fn list_committees(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> AppResult<Json<Value>> {
    let committees = CommitteeService::list(&state.db, CommitteeScope::of(&actor).committee_id()).await?;
    Ok(Json(json!(committees)))
}

/// Committee filter for the candidate pickers: scoped actors see their own
/// committee, the others may narrow with `committeeId`.
fn candidate_scope(actor_scope: CommitteeScope, body: &Value) -> Option<i32> {
    match actor_scope {
        CommitteeScope::Committee(id) => Some(id),
        CommitteeScope::All => body.get("committeeId").and_then(coerce_id),
    }
}

pub async fn committee_orphans(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let project_id = required_id(body.get("projectId"), "معرف المشروع مطلوب")?;
    let committee = candidate_scope(CommitteeScope::of(&actor), &body);
    let orphans = CommitteeService::orphan_candidates(&state.db, committee, project_id).await?;
    Ok(Json(json!(orphans)))
}

pub async fn committee_families(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let project_id = required_id(body.get("projectId"), "معرف المشروع مطلوب")?;
    let committee = candidate_scope(CommitteeScope::of(&actor), &body);
    let families = CommitteeService::family_candidates(&state.db, committee, project_id).await?;
    Ok(Json(json!(families)))
}

pub async fn add_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let form = forms::add_member_form(&body)?;
    authorize(&actor, Action::Administer, Resource::Committee(form.committee_id))?;
    if form.member.role == MemberRole::President {
        authorize(&actor, Action::Administer, Resource::Organisation)?;
    }
    if CommitteeService::find(&state.db, form.committee_id).await?.is_none() {
        return Err(AppError::not_found("اللجنة غير موجودة"));
    }

    let member = MemberService::create(&state.db, &form.member, Some(form.committee_id)).await?;
    tracing::info!(cin = %member.cin, committee_id = form.committee_id, "member added");
    Ok((StatusCode::CREATED, Json(json!(member))))
}

pub async fn delete_committee(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    authorize(&actor, Action::Administer, Resource::Organisation)?;
    CommitteeService::delete(&state.db, id).await?;
    Ok(Json(json!({ "message": "Committee deleted successfully" })))
}
