use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::{committee::Committee, family::Child};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub description: String,
    #[serde(rename = "Date")]
    pub project_date: NaiveDate,
    pub committee_budget: f64,
    pub external_budget: f64,
    pub total_budget: f64,
    pub for_orphans: bool,
    #[serde(rename = "totalBenificiaries")]
    pub total_beneficiaries: i32,
    pub committee_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Family beneficiary with the widow's name flattened in.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FamilyBeneficiary {
    pub id: i32,
    #[serde(rename = "OrphansLastName")]
    pub orphans_last_name: String,
    pub registration_date: NaiveDate,
    pub committee_id: i32,
    #[serde(rename = "WidowsName")]
    pub widows_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub committee: Option<Committee>,
    #[serde(rename = "orphanBenificiaries")]
    pub orphan_beneficiaries: Vec<Child>,
    #[serde(rename = "familyBenificiaries")]
    pub family_beneficiaries: Vec<FamilyBeneficiary>,
}

/// Aggregates over a filtered project listing.
#[derive(Debug, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub project_count: i64,
    pub total_budget: f64,
    pub committee_budget: f64,
    pub external_budget: f64,
    pub total_beneficiaries: i64,
    pub orphan_projects_count: i64,
}

/// Committee and date-range filter shared by export and statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectFilter {
    pub committee_id: Option<i32>,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

// ─── Validated forms ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    pub committee: f64,
    pub external: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct ProjectForm {
    pub id: Option<i32>,
    pub name: String,
    pub description: String,
    pub date: NaiveDate,
    pub budget: Budget,
    /// Absent on update: the beneficiary kind is fixed at creation.
    pub for_orphans: Option<bool>,
    pub beneficiaries: Vec<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListQuery {
    pub committee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFilterRequest {
    pub committee_id: Option<Value>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}
