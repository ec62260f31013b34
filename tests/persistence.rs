//! Service behaviour against a real database. Each test gets a fresh,
//! migrated database from `sqlx::test` (needs `DATABASE_URL`).

use chrono::NaiveDate;
use serde_json::{json, Value};
use sqlx::PgPool;

use charity_api::{
    error::AppError,
    models::{
        project::{Budget, ProjectForm},
        subject::{ClassForm, EducationTarget, RemarkForm, Subject, SubjectForm},
    },
    services::{
        committees::CommitteeService, families::FamilyService, projects::ProjectService,
        subjects::SubjectService,
    },
    validation::family::family_form,
};

async fn committee(pool: &PgPool, name: &str) -> i32 {
    sqlx::query_scalar("INSERT INTO committees (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn member(pool: &PgPool, cin: &str, committee_id: i32) {
    sqlx::query(
        "INSERT INTO members (cin, name, email, password_hash, role, committee_id, member_type)
         VALUES ($1, $1, $2, 'x', 'MEMBER', $3, 'ORPHANTEACHER')",
    )
    .bind(cin)
    .bind(format!("{}@example.org", cin.to_lowercase()))
    .bind(committee_id)
    .execute(pool)
    .await
    .unwrap();
}

fn family_body(widow_cin: &str, children: &[&str]) -> Value {
    let children: Vec<Value> = children
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "id": format!("new_{i}"),
                "data": {
                    "fullName": name,
                    "dateOfBirth": "2015-05-05",
                    "gender": "male",
                    "schoolLevel": "الأولى إبتدائي",
                    "semesterGrades": [
                        { "yearNumber": 1, "yearLabel": "السنة 1 إبتدائي", "grade": 8 }
                    ]
                }
            })
        })
        .collect();
    json!({
        "registrationDate": "2024-01-01",
        "OrphansLastName": "Benali",
        "Housing": "rent",
        "HousingType": "apartment",
        "RentalAmount": "1500",
        "WidowsName": "Fatima",
        "HealthStatus": "good",
        "AddressOfHeadOfFamily": "12 Main Street",
        "phoneNumber": "0612345678",
        "cinNumber": widow_cin,
        "level": "غير متمدرس",
        "Job": "none",
        "salaire": "0",
        "ExtraSalaire": "0",
        "children": children,
    })
}

/// Creates a family and returns its id with its children's ids.
async fn family(pool: &PgPool, committee_id: i32, widow_cin: &str, children: &[&str]) -> (i32, Vec<i32>) {
    let form = family_form(&family_body(widow_cin, children), false).unwrap();
    let detail = FamilyService::create(pool, committee_id, &form).await.unwrap();
    let ids = detail.children.iter().map(|c| c.child.id).collect();
    (detail.family.id, ids)
}

async fn orphan_subject(pool: &PgPool, committee_id: i32, teacher: &str, students: Vec<i32>) -> Subject {
    let form = SubjectForm {
        id: None,
        name: "Arabic".into(),
        student_ids: students,
        level: None,
        teacher: teacher.into(),
        target: EducationTarget::Orphan,
    };
    SubjectService::create(pool, committee_id, &form).await.unwrap()
}

fn remark(subject: &Subject, student_id: i32) -> RemarkForm {
    RemarkForm {
        student_id,
        subject_id: subject.id,
        target: EducationTarget::Orphan,
        content: None,
    }
}

fn project_form(beneficiaries: Vec<i32>) -> ProjectForm {
    ProjectForm {
        id: None,
        name: "Ramadan baskets".into(),
        description: "Food baskets".into(),
        date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        budget: Budget { committee: 1000.0, external: 500.0, total: 1500.0 },
        for_orphans: Some(true),
        beneficiaries,
    }
}

async fn count(pool: &PgPool, sql: &str, key: i32) -> i64 {
    sqlx::query_scalar(sql).bind(key).fetch_one(pool).await.unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn family_is_stored_with_widow_and_children_in_its_committee(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let form = family_form(&family_body("AB100", &["Ali", "Omar", "Sara"]), false).unwrap();

    let detail = FamilyService::create(&pool, north, &form).await.unwrap();

    assert_eq!(detail.family.committee_id, north);
    assert_eq!(detail.widow.committee_id, north);
    assert_eq!(detail.children.len(), 3);
    assert!(detail.children.iter().all(|c| c.child.committee_id == north));
    assert!(detail.children.iter().all(|c| c.semester_grades.len() == 1));
}

#[sqlx::test(migrations = "./migrations")]
async fn transfer_moves_widow_and_children_along(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let south = committee(&pool, "South").await;
    let (family_id, _) = family(&pool, north, "AB101", &["Ali", "Omar"]).await;

    let moved = FamilyService::transfer(&pool, family_id, south).await.unwrap();

    assert_eq!(moved.family.committee_id, south);
    assert_eq!(moved.widow.committee_id, south);
    assert!(moved.children.iter().all(|c| c.child.committee_id == south));
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM children WHERE committee_id = $1", north).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn resubmitted_remark_replaces_the_first(pool: PgPool) {
    let north = committee(&pool, "North").await;
    member(&pool, "T1", north).await;
    let (_, children) = family(&pool, north, "AB102", &["Ali"]).await;
    let subject = orphan_subject(&pool, north, "T1", children.clone()).await;
    let form = remark(&subject, children[0]);

    let (_, existed) = SubjectService::upsert_remark(&pool, &subject, &form, "late twice").await.unwrap();
    assert!(!existed);
    let (row, existed) = SubjectService::upsert_remark(&pool, &subject, &form, "much better").await.unwrap();
    assert!(existed);
    assert_eq!(row.content, "much better");

    let remarks = SubjectService::remarks(&pool, &subject).await.unwrap();
    assert_eq!(remarks.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn class_opens_one_absence_per_enrolled_student(pool: PgPool) {
    let north = committee(&pool, "North").await;
    member(&pool, "T1", north).await;
    let (_, children) = family(&pool, north, "AB103", &["Ali", "Omar", "Sara"]).await;
    let subject = orphan_subject(&pool, north, "T1", children).await;
    let form = ClassForm {
        id: subject.id,
        name: "Lesson 1".into(),
        date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        time: "10:00".into(),
    };

    let class = SubjectService::create_class(&pool, &subject, &form).await.unwrap();
    let rows = SubjectService::attendance(&pool, &class).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.is_present));

    SubjectService::delete_class(&pool, class.id).await.unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM absences WHERE class_id = $1", class.id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn project_total_matches_linked_beneficiaries(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let (_, children) = family(&pool, north, "AB104", &["Ali", "Omar"]).await;
    let mut requested = children.clone();
    requested.push(children[0]);

    let detail = ProjectService::create(&pool, Some(north), &project_form(requested)).await.unwrap();

    assert_eq!(detail.project.total_beneficiaries, 2);
    assert_eq!(detail.orphan_beneficiaries.len(), 2);
    assert_eq!(detail.project.total_budget, 1500.0);
}

#[sqlx::test(migrations = "./migrations")]
async fn committee_with_families_cannot_be_deleted(pool: PgPool) {
    let north = committee(&pool, "North").await;
    family(&pool, north, "AB105", &["Ali"]).await;

    let err = CommitteeService::delete(&pool, north).await.unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
    assert!(CommitteeService::find(&pool, north).await.unwrap().is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn subject_cannot_enroll_another_committees_orphan(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let south = committee(&pool, "South").await;
    member(&pool, "T1", north).await;
    let (_, foreign) = family(&pool, south, "AB106", &["Ali"]).await;
    let form = SubjectForm {
        id: None,
        name: "Arabic".into(),
        student_ids: foreign,
        level: None,
        teacher: "T1".into(),
        target: EducationTarget::Orphan,
    };

    let err = SubjectService::create(&pool, north, &form).await.unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM subjects WHERE committee_id = $1", north).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn subject_teacher_must_sit_on_its_committee(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let south = committee(&pool, "South").await;
    member(&pool, "T2", south).await;
    let form = SubjectForm {
        id: None,
        name: "Arabic".into(),
        student_ids: Vec::new(),
        level: None,
        teacher: "T2".into(),
        target: EducationTarget::Orphan,
    };

    let err = SubjectService::create(&pool, north, &form).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
async fn remark_on_foreign_student_is_rejected(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let south = committee(&pool, "South").await;
    member(&pool, "T1", north).await;
    let subject = orphan_subject(&pool, north, "T1", Vec::new()).await;
    let (_, foreign) = family(&pool, south, "AB107", &["Ali"]).await;

    let err = SubjectService::upsert_remark(&pool, &subject, &remark(&subject, foreign[0]), "note")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM remarks WHERE subject_id = $1", subject.id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn project_rejects_beneficiaries_of_another_committee(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let south = committee(&pool, "South").await;
    let (_, foreign) = family(&pool, south, "AB108", &["Ali"]).await;

    let err = ProjectService::create(&pool, Some(north), &project_form(foreign.clone())).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");

    // Organisation-wide projects may reach any committee.
    let detail = ProjectService::create(&pool, None, &project_form(foreign)).await.unwrap();
    assert_eq!(detail.project.total_beneficiaries, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn dangling_reference_is_a_bad_request(pool: PgPool) {
    let north = committee(&pool, "North").await;
    let project = ProjectService::create(&pool, Some(north), &project_form(Vec::new())).await.unwrap();

    let err: AppError = sqlx::query("INSERT INTO project_orphans (project_id, child_id) VALUES ($1, 999999)")
        .bind(project.project.id)
        .execute(&pool)
        .await
        .unwrap_err()
        .into();

    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
async fn posts_outlive_a_deleted_committee(pool: PgPool) {
    let north = committee(&pool, "North").await;
    member(&pool, "H1", north).await;
    let post_id: i32 =
        sqlx::query_scalar("INSERT INTO posts (title, content, author_id) VALUES ('Eid', 'Gifts', 'H1') RETURNING id")
            .fetch_one(&pool)
            .await
            .unwrap();

    CommitteeService::delete(&pool, north).await.unwrap();

    let author: Option<String> = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(author, None);
}
