use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::member::{Member, NewMember};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Committee {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommitteeWithMembers {
    #[serde(flatten)]
    pub committee: Committee,
    pub members: Vec<Member>,
}

/// A beneficiary candidate for a project, with whether it is already linked.
#[derive(Debug, Serialize, FromRow)]
pub struct JoinCandidate {
    pub id: i32,
    pub name: String,
    pub joined: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectIdRequest {
    pub project_id: Option<Value>,
}

// ─── Validated forms ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CommitteeForm {
    pub name: String,
    pub head: NewMember,
    pub members: Vec<NewMember>,
}

#[derive(Debug, Clone)]
pub struct AddMemberForm {
    pub committee_id: i32,
    pub member: NewMember,
}
