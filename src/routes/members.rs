use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::Actor,
    models::member::{Member, MemberRole, TeachersRequest},
    policy::{authorize, Action, CommitteeScope, Resource},
    services::members::MemberService,
    validation::member as forms,
    AppState,
};

/// Membership changes belong to whoever administers the member's committee;
/// committee-less members (the president) belong to the organisation.
fn administer_member(actor: &Member, target: &Member) -> AppResult<()> {
    match target.committee_id {
        Some(id) => authorize(actor, Action::Administer, Resource::Committee(id)),
        None => authorize(actor, Action::Administer, Resource::Organisation),
    }
}

async fn load_target(state: &AppState, raw_cin: &str) -> AppResult<Member> {
    let cin = forms::member_cin(raw_cin)?;
    MemberService::find(&state.db, &cin)
        .await?
        .ok_or_else(|| AppError::not_found("العضو غير موجود"))
}

pub async fn edit_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(cin): Path<String>,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let target = load_target(&state, &cin).await?;
    administer_member(&actor, &target)?;

    let update = forms::member_update_form(&body)?;
    if update.role == MemberRole::President && target.role() != MemberRole::President {
        authorize(&actor, Action::Administer, Resource::Organisation)?;
    }
    if let Some(committee_id) = update.committee_id.filter(|id| Some(*id) != target.committee_id) {
        authorize(&actor, Action::Administer, Resource::Committee(committee_id))?;
    }

    let member = MemberService::update(&state.db, &target.cin, &update).await?;
    tracing::info!(cin = %member.cin, by = %actor.cin, "member updated");
    Ok(Json(json!(member)))
}

pub async fn committee_teachers(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<TeachersRequest>,
) -> AppResult<Json<Value>> {
    let category = body
        .teacher_category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("نوع المدرس مطلوب"))?;
    let teachers = MemberService::teachers(
        &state.db,
        CommitteeScope::of(&actor).committee_id(),
        category.trim(),
    )
    .await?;
    Ok(Json(json!(teachers)))
}

pub async fn delete_member(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(cin): Path<String>,
) -> AppResult<Json<Value>> {
    let target = load_target(&state, &cin).await?;
    administer_member(&actor, &target)?;
    if target.cin == actor.cin {
        return Err(AppError::bad_request("لا يمكنك حذف حسابك"));
    }

    MemberService::delete(&state.db, &target.cin).await?;
    tracing::info!(cin = %target.cin, by = %actor.cin, "member deleted");
    Ok(Json(json!({ "message": "تم حذف العضو بنجاح" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::tests::member;

    #[test]
    fn committee_head_administers_only_own_members() {
        let head = member("AB1", MemberRole::CommitteeHead, Some(1));
        let own = member("CD2", MemberRole::Member, Some(1));
        let other = member("EF3", MemberRole::Member, Some(2));
        let president = member("GH4", MemberRole::President, None);

        assert!(administer_member(&head, &own).is_ok());
        assert!(administer_member(&head, &other).is_err());
        assert!(administer_member(&head, &president).is_err());
        assert!(administer_member(&president, &other).is_ok());
    }
}
