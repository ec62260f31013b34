use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    President,
    CommitteeHead,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::President => "PRESIDENT",
            MemberRole::CommitteeHead => "COMMITTEE_HEAD",
            MemberRole::Member => "MEMBER",
        }
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemberRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PRESIDENT" => Ok(MemberRole::President),
            "COMMITTEE_HEAD" => Ok(MemberRole::CommitteeHead),
            "MEMBER" => Ok(MemberRole::Member),
            _ => Err(anyhow::anyhow!("Unknown role: {s}")),
        }
    }
}

/// DB row; role is kept as TEXT and parsed on demand.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub cin: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub committee_id: Option<i32>,
    pub subscription_status: bool,
    pub member_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn role(&self) -> MemberRole {
        self.role.parse().unwrap_or(MemberRole::Member)
    }

    /// Teachers only ever see the subjects they teach.
    pub fn is_teacher(&self) -> bool {
        matches!(self.member_type.as_deref(), Some("ORPHANTEACHER") | Some("WIDOWTEACHER"))
    }
}

/// Validated input for a new member (committee creation, add-member, CLI seeding).
#[derive(Debug, Clone)]
pub struct NewMember {
    pub cin: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: MemberRole,
    pub subscription_status: bool,
    pub member_type: Option<String>,
}

/// Validated input for edit-member; `None` fields keep their current value.
#[derive(Debug, Clone)]
pub struct MemberUpdate {
    pub name: String,
    pub email: String,
    pub role: MemberRole,
    pub committee_id: Option<i32>,
    pub member_type: Option<String>,
    pub subscription_status: Option<bool>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub cin: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachersRequest {
    pub teacher_category: Option<String>,
}

/// `{id, name}` pair used by teacher pickers.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeacherOption {
    #[sqlx(rename = "cin")]
    pub id: String,
    pub name: String,
}
