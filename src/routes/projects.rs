use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::{
        member::Member,
        project::{Project, ProjectFilterRequest, ProjectListQuery},
    },
    policy::{authorize, Action, CommitteeScope, Resource},
    services::{
        export::{file_stream, ExportService, XLSX_MIME},
        projects::{filter_from_request, ProjectService},
    },
    validation::project as forms,
    AppState,
};

async fn load_project(state: &AppState, actor: &Member, id: i32, action: Action) -> AppResult<Project> {
    let project = ProjectService::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("المشروع غير موجود"))?;
    authorize(actor, action, Resource::Record { committee_id: project.committee_id })?;
    Ok(project)
}

/// `?committeeId=` narrows the list for actors who see every committee;
/// scoped actors always get their own.
fn list_committee(scope: CommitteeScope, query: &ProjectListQuery) -> Option<i32> {
    match scope {
        CommitteeScope::Committee(id) => Some(id),
        CommitteeScope::All => query
            .committee_id
            .as_deref()
            .filter(|c| *c != "all")
            .and_then(|c| c.trim().parse().ok()),
    }
}

pub async fn create_project(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let form = forms::project_form(&body, false)?;
    let committee_id = CommitteeScope::of(&actor).committee_id();
    let project = ProjectService::create(&state.db, committee_id, &form).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": project }))))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<ProjectListQuery>,
) -> AppResult<Json<Value>> {
    let committee = list_committee(CommitteeScope::of(&actor), &query);
    let projects = ProjectService::list(&state.db, committee).await?;
    Ok(Json(json!(projects)))
}

pub async fn project_stats(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<ProjectFilterRequest>,
) -> AppResult<Json<Value>> {
    let filter = filter_from_request(&query, CommitteeScope::of(&actor));
    let stats = ProjectService::stats(&state.db, &filter).await?;
    Ok(Json(json!(stats)))
}

pub async fn project_detail(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    load_project(&state, &actor, id, Action::View).await?;
    let detail = ProjectService::detail(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("المشروع غير موجود"))?;
    Ok(Json(json!(detail)))
}

/// The project with its beneficiary lists, without the committee.
pub async fn project_beneficiaries(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<i32>,
) -> AppResult<Json<Value>> {
    load_project(&state, &actor, id, Action::View).await?;
    let detail = ProjectService::detail(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("المشروع غير موجود"))?;
    let mut body = json!(detail);
    if let Some(fields) = body.as_object_mut() {
        fields.remove("committee");
    }
    Ok(Json(body))
}

pub async fn update_project(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<i32>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let existing = load_project(&state, &actor, id, Action::Edit).await?;
    let form = forms::project_form(&forms::normalize_project_update(id, &body), true)?;

    let committee = CommitteeScope::of(&actor).committee_id();
    let detail = ProjectService::update(&state.db, &existing, committee, &form).await?;
    Ok(Json(json!(detail)))
}

pub async fn orphan_options(State(state): State<AppState>, Actor(actor): Actor) -> AppResult<Json<Value>> {
    let orphans = ProjectService::orphan_options(&state.db, CommitteeScope::of(&actor).committee_id()).await?;
    Ok(Json(json!(orphans)))
}

pub async fn family_options(State(state): State<AppState>, Actor(actor): Actor) -> AppResult<Json<Value>> {
    let families = ProjectService::family_options(&state.db, CommitteeScope::of(&actor).committee_id()).await?;
    Ok(Json(json!(families)))
}

/// Streams the xlsx report; the temp file goes away with the body.
pub async fn export_projects(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<ProjectFilterRequest>,
) -> AppResult<Response> {
    let filter = filter_from_request(&body, CommitteeScope::of(&actor));
    let report = ExportService::project_report(&state.db, &filter).await?;
    let rows = report.rows.len();
    let (file, path) = ExportService::write_report(report).await?;
    tracing::info!(?filter, rows, by = %actor.cin, "projects exported");

    let disposition = format!("attachment; filename=\"{}\"", ExportService::file_name());
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(file_stream(file, path)),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(committee: Option<&str>) -> ProjectListQuery {
        ProjectListQuery { committee_id: committee.map(str::to_string) }
    }

    #[test]
    fn list_filter_honours_scope() {
        assert_eq!(list_committee(CommitteeScope::All, &query(Some("4"))), Some(4));
        assert_eq!(list_committee(CommitteeScope::All, &query(Some("all"))), None);
        assert_eq!(list_committee(CommitteeScope::All, &query(None)), None);
        assert_eq!(list_committee(CommitteeScope::Committee(2), &query(Some("4"))), Some(2));
    }
}
