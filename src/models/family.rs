use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// School levels a child or widow may be registered at.
pub const SCHOOL_LEVELS: [&str; 13] = [
    "غير متمدرس",
    "الأولى إبتدائي",
    "الثانية إبتدائي",
    "الثالثة إبتدائي",
    "الرابعة إبتدائي",
    "الخامسة إبتدائي",
    "السادسة إبتدائي",
    "الأولى ثانوي إعدادي",
    "الثانية ثانوي إعدادي",
    "الثالثة ثانوي إعدادي",
    "الأولى ثانوي تأهيلي",
    "الثانية ثانوي تأهيلي",
    "الثالثة ثانوي تأهيلي",
];

/// Labels of the twelve schooling years a semester grade can belong to.
pub const YEAR_LABELS: [&str; 12] = [
    "السنة 1 إبتدائي",
    "السنة 2 إبتدائي",
    "السنة 3 إبتدائي",
    "السنة 4 إبتدائي",
    "السنة 5 إبتدائي",
    "السنة 6 إبتدائي",
    "السنة 1 إعدادي",
    "السنة 2 إعدادي",
    "السنة 3 إعدادي",
    "السنة 1 تأهيلي",
    "السنة 2 تأهيلي",
    "السنة 3 تأهيلي",
];

/// Level filter value meaning "every level".
pub const ALL_LEVELS: &str = "الكل";

pub const GENDERS: [&str; 2] = ["male", "female"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Family {
    pub id: i32,
    #[serde(rename = "registrationDate")]
    pub registration_date: NaiveDate,
    #[serde(rename = "OrphansLastName")]
    pub orphans_last_name: String,
    #[serde(rename = "Housing")]
    pub housing: String,
    #[serde(rename = "HousingType")]
    pub housing_type: String,
    #[serde(rename = "RentalAmount")]
    pub rental_amount: String,
    #[serde(rename = "importantNeeds")]
    pub important_needs: String,
    #[serde(rename = "committeeId")]
    pub committee_id: i32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Widow {
    pub id: i32,
    #[serde(rename = "familyId")]
    pub family_id: i32,
    #[serde(rename = "committeeId")]
    pub committee_id: i32,
    #[serde(rename = "WidowsName")]
    pub widows_name: String,
    #[serde(rename = "HealthStatus")]
    pub health_status: String,
    #[serde(rename = "AddressOfHeadOfFamily")]
    pub address_of_head_of_family: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    #[serde(rename = "cinNumber")]
    pub cin_number: String,
    pub level: String,
    pub diplome: Option<String>,
    #[serde(rename = "Job")]
    pub job: String,
    #[serde(rename = "salaire")]
    pub salary: String,
    #[serde(rename = "ExtraSalaire")]
    pub extra_salary: String,
    #[serde(rename = "importantNeeds")]
    pub important_needs: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: i32,
    pub family_id: i32,
    pub committee_id: i32,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub school_level: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGrade {
    pub id: i32,
    pub child_id: i32,
    pub year_number: i16,
    pub year_label: String,
    pub grade: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildWithGrades {
    #[serde(flatten)]
    pub child: Child,
    pub semester_grades: Vec<SemesterGrade>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FamilyDetail {
    #[serde(flatten)]
    pub family: Family,
    #[serde(rename = "Widow")]
    pub widow: Widow,
    pub children: Vec<ChildWithGrades>,
}

// ─── Listing shapes ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, FromRow)]
pub struct FamilySummary {
    pub id: i32,
    #[serde(rename = "OrphansLastName")]
    pub orphans_last_name: String,
    #[serde(rename = "WidowsName")]
    pub widows_name: String,
}

/// Family row flattened with the widow's contact fields.
#[derive(Debug, Serialize, FromRow)]
pub struct FamilyCard {
    pub id: i32,
    #[serde(rename = "registrationDate")]
    pub registration_date: NaiveDate,
    #[serde(rename = "OrphansLastName")]
    pub orphans_last_name: String,
    #[serde(rename = "WidowsName")]
    pub widows_name: String,
    #[serde(rename = "AddressOfHeadOfFamily")]
    pub address_of_head_of_family: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    #[serde(rename = "cinNumber")]
    pub cin_number: String,
    #[serde(rename = "Job")]
    pub job: String,
    #[serde(rename = "numberOfChildren", skip_serializing_if = "Option::is_none")]
    pub number_of_children: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ChildCard {
    pub id: i32,
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "dateOfBirth")]
    pub date_of_birth: NaiveDate,
    /// Enrolled in at least one subject.
    #[serde(rename = "Beneficiary")]
    pub beneficiary: bool,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChildName {
    pub id: i32,
    pub full_name: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct WidowName {
    pub id: i32,
    #[serde(rename = "WidowsName")]
    pub widows_name: String,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub school_level: String,
    pub avatar: Option<String>,
    #[serde(skip)]
    pub committee_id: i32,
    #[serde(skip)]
    pub committee_name: String,
}

// ─── Validated forms ─────────────────────────────────────────────────────────

/// Child identity as submitted by the family editor: temporary `new_*` keys
/// mark rows to insert, numeric ids mark rows to keep.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRef {
    New(String),
    Existing(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeForm {
    pub year_number: i16,
    pub year_label: String,
    pub grade: f64,
}

#[derive(Debug, Clone)]
pub struct ChildForm {
    pub id: Option<ChildRef>,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub school_level: String,
    pub avatar: Option<String>,
    pub semester_grades: Vec<GradeForm>,
}

#[derive(Debug, Clone)]
pub struct WidowForm {
    pub widows_name: String,
    pub health_status: String,
    pub address_of_head_of_family: String,
    pub phone_number: String,
    pub cin_number: String,
    pub level: String,
    pub diplome: Option<String>,
    pub job: String,
    pub salary: String,
    pub extra_salary: String,
}

#[derive(Debug, Clone)]
pub struct FamilyForm {
    pub id: Option<i32>,
    pub registration_date: NaiveDate,
    pub orphans_last_name: String,
    pub housing: String,
    pub housing_type: String,
    pub rental_amount: String,
    pub important_needs: Vec<String>,
    pub widow: WidowForm,
    pub children: Vec<ChildForm>,
}

impl FamilyForm {
    pub fn needs_joined(&self) -> String {
        self.important_needs.join(",")
    }
}

#[derive(Debug, Deserialize)]
pub struct IdRequest {
    pub id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct PageRequest {
    pub page: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub search_term: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRequest {
    pub selected_level: Option<String>,
}
