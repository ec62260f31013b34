use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Who a subject teaches: orphan children or widows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum EducationTarget {
    Orphan,
    Widow,
}

impl EducationTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            EducationTarget::Orphan => "ORPHAN",
            EducationTarget::Widow => "WIDOW",
        }
    }

    /// Lower-case form used in success messages (`orphan subject created successfully`).
    pub fn lower(&self) -> &'static str {
        match self {
            EducationTarget::Orphan => "orphan",
            EducationTarget::Widow => "widow",
        }
    }
}

impl std::fmt::Display for EducationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EducationTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORPHAN" => Ok(EducationTarget::Orphan),
            "WIDOW" => Ok(EducationTarget::Widow),
            _ => Err(anyhow::anyhow!("Unknown education target: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i32,
    pub name: String,
    pub target: String,
    pub level_targeted: Option<String>,
    pub teacher_id: Option<String>,
    pub committee_id: i32,
    pub created_at: DateTime<Utc>,
}

/// A stored target outside the CHECK constraint is a broken row, not a
/// client error.
fn stored_target(table: &str, id: i32, raw: &str) -> AppResult<EducationTarget> {
    raw.parse()
        .map_err(|e: anyhow::Error| AppError::Internal(e.context(format!("{table} row {id}"))))
}

impl Subject {
    pub fn target(&self) -> AppResult<EducationTarget> {
        stored_target("subjects", self.id, &self.target)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: i32,
    pub subject_id: i32,
    pub name: String,
    pub class_date: NaiveDate,
    pub start_time: String,
    pub target: String,
}

impl Class {
    pub fn target(&self) -> AppResult<EducationTarget> {
        stored_target("classes", self.id, &self.target)
    }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubjectListItem {
    pub id: i32,
    pub name: String,
    #[serde(rename = "level")]
    pub level_targeted: Option<String>,
    pub students_count: i64,
}

/// An enrolled student, child or widow, by id and display name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Student {
    pub id: i32,
    pub name: String,
}

/// Subject editor roster entry; widows have no school level.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledStudent {
    pub id: i32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_level: Option<String>,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    pub id: i32,
    pub name: String,
    pub is_present: bool,
    pub is_justified: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RemarkRow {
    pub id: i32,
    pub content: String,
    pub subject_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub student_id: i32,
    #[serde(skip)]
    pub student_name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct SubjectName {
    pub id: i32,
    pub name: String,
}

// ─── Validated forms ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SubjectForm {
    pub id: Option<i32>,
    pub name: String,
    pub student_ids: Vec<i32>,
    pub level: Option<String>,
    pub teacher: String,
    pub target: EducationTarget,
}

impl SubjectForm {
    /// Only orphan subjects carry a targeted level.
    pub fn level_targeted(&self) -> Option<&str> {
        match self.target {
            EducationTarget::Orphan => self.level.as_deref(),
            EducationTarget::Widow => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassForm {
    /// Subject id on create, class id on edit.
    pub id: i32,
    pub name: String,
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone)]
pub struct RemarkForm {
    pub student_id: i32,
    pub subject_id: i32,
    pub target: EducationTarget,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceMark {
    pub student_id: i32,
    pub is_present: bool,
    pub is_justified: bool,
}

#[derive(Debug, Clone)]
pub struct AttendanceForm {
    pub class_id: i32,
    pub students: Vec<AttendanceMark>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectsQuery {
    pub committee_id: Option<Value>,
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDataRequest {
    pub id: Option<Value>,
    pub selected_level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectIdRequest {
    pub subject_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassIdRequest {
    pub class_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSubjectsRequest {
    pub export_selected_committees: Option<Vec<Value>>,
    pub target: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(target: &str) -> Class {
        Class {
            id: 7,
            subject_id: 1,
            name: "Lesson 1".into(),
            class_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            start_time: "10:00".into(),
            target: target.into(),
        }
    }

    #[test]
    fn stored_target_is_read_strictly() {
        assert_eq!(class("WIDOW").target().unwrap(), EducationTarget::Widow);
        match class("orphan").target() {
            Err(AppError::Internal(e)) => assert!(format!("{e:#}").contains("classes row 7")),
            other => panic!("expected internal error, got {other:?}"),
        }
    }
}
