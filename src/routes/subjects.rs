use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::{
        family::IdRequest,
        member::Member,
        subject::{
            ClassIdRequest, EducationTarget, ExportSubjectsRequest, RemarkForm, RemarkRow, Subject,
            SubjectDataRequest, SubjectIdRequest, SubjectsQuery,
        },
    },
    policy::{authorize, Action, CommitteeScope, Resource, FORBIDDEN_MESSAGE},
    routes::{owning_committee, required_id},
    services::subjects::SubjectService,
    validation::{coerce_id, subject as forms},
    AppState,
};

/// Committee scope first, then teachers are held to the subjects they teach.
fn check_subject(actor: &Member, subject: &Subject, action: Action) -> AppResult<()> {
    authorize(actor, action, Resource::Record { committee_id: Some(subject.committee_id) })?;
    if actor.is_teacher() && subject.teacher_id.as_deref() != Some(actor.cin.as_str()) {
        return Err(AppError::forbidden(FORBIDDEN_MESSAGE));
    }
    Ok(())
}

async fn load_subject(state: &AppState, actor: &Member, id: i32, action: Action) -> AppResult<Subject> {
    let subject = SubjectService::require(&state.db, id).await?;
    check_subject(actor, &subject, action)?;
    Ok(subject)
}

/// Remarks name their target explicitly; it has to agree with the subject's.
async fn remark_subject(state: &AppState, actor: &Member, form: &RemarkForm) -> AppResult<Subject> {
    let subject = load_subject(state, actor, form.subject_id, Action::Edit).await?;
    if subject.target()? != form.target {
        return Err(AppError::bad_request("Invalid subject or target mismatch"));
    }
    Ok(subject)
}

fn parse_target(raw: Option<&str>) -> AppResult<EducationTarget> {
    raw.ok_or_else(|| AppError::bad_request("Missing required fields"))?
        .parse()
        .map_err(|_| AppError::bad_request("Invalid target type"))
}

fn remark_view(row: &RemarkRow) -> Value {
    json!({
        "id": row.id,
        "content": row.content,
        "subjectId": row.subject_id,
        "createdAt": row.created_at,
        "updatedAt": row.updated_at,
        "student": { "id": row.student_id, "name": row.student_name },
    })
}

pub async fn create_subject(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let form = forms::subject_form(&body, false)?;
    let committee_id = owning_committee(CommitteeScope::of(&actor), &body)?;
    authorize(&actor, Action::Edit, Resource::Record { committee_id: Some(committee_id) })?;

    let subject = SubjectService::create(&state.db, committee_id, &form).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": subject,
            "message": format!("{} subject created successfully", form.target.lower()),
        })),
    ))
}

pub async fn update_subject(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let form = forms::subject_form(&forms::normalize_subject_update(&body), true)?;
    let id = form.id.ok_or_else(|| AppError::field("id", "معرف المادة مطلوب"))?;
    let subject = load_subject(&state, &actor, id, Action::Edit).await?;

    SubjectService::update(&state.db, &subject, &form).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("{} subject updated successfully", subject.target()?.lower()),
    })))
}

pub async fn all_subjects(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<SubjectsQuery>,
) -> AppResult<Json<Value>> {
    let target = parse_target(body.target.as_deref())?;
    let committee_id = match CommitteeScope::of(&actor) {
        CommitteeScope::Committee(id) => id,
        CommitteeScope::All => body
            .committee_id
            .as_ref()
            .and_then(coerce_id)
            .ok_or_else(|| AppError::bad_request("Missing required fields"))?,
    };
    let teacher = actor.is_teacher().then_some(actor.cin.as_str());

    let subjects = SubjectService::list(&state.db, committee_id, target, teacher).await?;
    Ok(Json(json!(subjects)))
}

pub async fn create_class(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let form = forms::class_form(&body, "subjectId")?;
    let subject = load_subject(&state, &actor, form.id, Action::Edit).await?;

    let class = SubjectService::create_class(&state.db, &subject, &form).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Class created successfully with attendance records",
            "data": class,
        })),
    ))
}

pub async fn subject_data(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<SubjectDataRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "Subject ID and level are required")?;
    let subject = load_subject(&state, &actor, id, Action::View).await?;
    let enrolled = SubjectService::enrolled(&state.db, &subject).await?;

    let mut data = json!({
        "subjectName": subject.name,
        "teacherId": subject.teacher_id,
        "target": subject.target,
        "enrolledStudents": enrolled,
    });
    if subject.target()? == EducationTarget::Orphan {
        data["level"] = json!(subject.level_targeted);
    }
    Ok(Json(json!({ "success": true, "data": data })))
}

pub async fn subject_students(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<SubjectDataRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "Subject ID is required")?;
    let subject = load_subject(&state, &actor, id, Action::View).await?;
    let students = SubjectService::students(&state.db, &subject, body.selected_level.as_deref()).await?;
    Ok(Json(json!({ "success": true, "data": { "students": students } })))
}

pub async fn class_data(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<IdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.id.as_ref(), "Class ID is required")?;
    let class = SubjectService::require_class(&state.db, id).await?;
    let subject = load_subject(&state, &actor, class.subject_id, Action::View).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "name": class.name,
            "classDate": class.class_date,
            "startTime": class.start_time,
            "subject": { "id": subject.id, "name": subject.name, "target": subject.target },
        },
    })))
}

pub async fn add_remark(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let form = forms::remark_form(&body, true)?;
    let subject = remark_subject(&state, &actor, &form).await?;
    let content = form
        .content
        .as_deref()
        .ok_or_else(|| AppError::field("content", "الملاحظة مطلوبة"))?;

    let (remark, existed) = SubjectService::upsert_remark(&state.db, &subject, &form, content).await?;
    let verb = if existed { "updated" } else { "created" };
    Ok(Json(json!({
        "success": true,
        "data": remark_view(&remark),
        "message": format!("{} remark {verb} successfully", form.target.lower()),
    })))
}

pub async fn subject_remarks(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<SubjectIdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.subject_id.as_ref(), "Subject ID is required")?;
    let subject = load_subject(&state, &actor, id, Action::View).await?;
    let remarks = SubjectService::remarks(&state.db, &subject).await?;
    let data: Vec<Value> = remarks.iter().map(remark_view).collect();
    Ok(Json(json!({ "success": true, "data": data })))
}

pub async fn edit_class(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let form = forms::class_form(&body, "classId")?;
    let class = SubjectService::require_class(&state.db, form.id).await?;
    load_subject(&state, &actor, class.subject_id, Action::Edit).await?;

    let class = SubjectService::edit_class(&state.db, &form).await?;
    Ok(Json(json!({ "success": true, "data": class })))
}

pub async fn class_absence(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<ClassIdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.class_id.as_ref(), "Class ID is required")?;
    let class = SubjectService::require_class(&state.db, id).await?;
    load_subject(&state, &actor, class.subject_id, Action::View).await?;

    let rows = SubjectService::attendance(&state.db, &class).await?;
    Ok(Json(json!({ "success": true, "data": rows })))
}

pub async fn update_absence(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let form = forms::attendance_form(&body)?;
    let class = SubjectService::require_class(&state.db, form.class_id).await?;
    let subject = load_subject(&state, &actor, class.subject_id, Action::Edit).await?;

    SubjectService::record_attendance(&state.db, &class, &form).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("{} attendance updated successfully", subject.target()?.lower()),
    })))
}

pub async fn subject_classes(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<SubjectIdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.subject_id.as_ref(), "Subject ID is required")?;
    let subject = load_subject(&state, &actor, id, Action::View).await?;
    let classes = SubjectService::classes(&state.db, subject.id).await?;
    Ok(Json(json!({ "success": true, "data": classes })))
}

pub async fn delete_remark(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let form = forms::remark_form(&body, false)?;
    remark_subject(&state, &actor, &form).await?;

    let removed = SubjectService::delete_remark(&state.db, &form).await?;
    tracing::debug!(subject_id = form.subject_id, removed, "remark delete");
    Ok(Json(json!({
        "success": true,
        "message": format!("{} remark deleted successfully", form.target.lower()),
    })))
}

pub async fn delete_subject(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<SubjectIdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.subject_id.as_ref(), "Subject ID is required")?;
    let subject = load_subject(&state, &actor, id, Action::Edit).await?;
    SubjectService::delete(&state.db, subject.id).await?;
    Ok(Json(json!({ "success": true, "message": "Subject deleted successfully" })))
}

pub async fn delete_class(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<ClassIdRequest>,
) -> AppResult<Json<Value>> {
    let id = required_id(body.class_id.as_ref(), "Class ID is required")?;
    let class = SubjectService::require_class(&state.db, id).await?;
    load_subject(&state, &actor, class.subject_id, Action::Edit).await?;
    SubjectService::delete_class(&state.db, class.id).await?;
    Ok(Json(json!({ "success": true, "message": "Class deleted successfully" })))
}

/// Committee ids from `[{id}, ...]` (bare ids accepted too), narrowed to
/// what the actor can see.
fn export_committees(scope: CommitteeScope, selected: &[Value]) -> Vec<i32> {
    selected
        .iter()
        .filter_map(|c| c.get("id").map_or_else(|| coerce_id(c), coerce_id))
        .filter(|id| scope.covers(Some(*id)))
        .collect()
}

pub async fn export_subjects(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<ExportSubjectsRequest>,
) -> AppResult<Json<Value>> {
    let selected = body
        .export_selected_committees
        .ok_or_else(|| AppError::bad_request("Missing required fields"))?;
    let target = parse_target(body.target.as_deref())?;
    let committees = export_committees(CommitteeScope::of(&actor), &selected);

    let subjects = SubjectService::for_export(&state.db, &committees, target).await?;
    Ok(Json(json!({ "success": true, "data": subjects })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::member::MemberRole;
    use crate::policy::tests::member;
    use chrono::Utc;

    fn subject(committee_id: i32, teacher: &str) -> Subject {
        Subject {
            id: 1,
            name: "Arabic".into(),
            target: "ORPHAN".into(),
            level_targeted: Some("الأولى ابتدائي".into()),
            teacher_id: Some(teacher.into()),
            committee_id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn teachers_reach_only_their_own_subjects() {
        let mut teacher = member("T1", MemberRole::Member, Some(1));
        teacher.member_type = Some("ORPHANTEACHER".into());
        let head = member("H1", MemberRole::CommitteeHead, Some(1));

        assert!(check_subject(&teacher, &subject(1, "T1"), Action::Edit).is_ok());
        assert!(check_subject(&teacher, &subject(1, "T2"), Action::View).is_err());
        assert!(check_subject(&head, &subject(1, "T2"), Action::Edit).is_ok());
        assert!(check_subject(&head, &subject(2, "T2"), Action::View).is_err());
    }

    #[test]
    fn export_selection_is_clamped_to_scope() {
        let selected = vec![json!({ "id": 1 }), json!({ "id": "2" }), json!(3), json!({})];
        assert_eq!(export_committees(CommitteeScope::All, &selected), vec![1, 2, 3]);
        assert_eq!(export_committees(CommitteeScope::Committee(2), &selected), vec![2]);
    }

    #[test]
    fn target_must_be_known() {
        assert_eq!(parse_target(Some("WIDOW")).unwrap(), EducationTarget::Widow);
        assert!(parse_target(Some("widow")).is_err());
        assert!(parse_target(None).is_err());
    }
}
