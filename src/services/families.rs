use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::family::{
        Child, ChildForm, ChildRef, ChildWithGrades, Family, FamilyCard, FamilyDetail, FamilyForm,
        FamilySummary, Widow, WidowForm,
    },
    services::{children::ChildService, uploads},
};

pub const FAMILIES_PAGE_SIZE: i64 = 10;

const FAMILY_COLUMNS: &str = "id, registration_date, orphans_last_name, housing, housing_type,
    rental_amount, important_needs, committee_id, created_at";
const WIDOW_COLUMNS: &str = "id, family_id, committee_id, widows_name, health_status,
    address_of_head_of_family, phone_number, cin_number, level, diplome, job, salary,
    extra_salary, important_needs";

/// Existing children that the submitted list no longer mentions.
pub fn children_to_delete(existing: &[i32], submitted: &[ChildForm]) -> Vec<i32> {
    let kept: HashSet<i32> = submitted
        .iter()
        .filter_map(|c| match &c.id {
            Some(ChildRef::Existing(id)) => Some(*id),
            _ => None,
        })
        .collect();
    existing.iter().copied().filter(|id| !kept.contains(id)).collect()
}

/// Family editor payload: widow fields first, family fields over them (so
/// `id` stays the family id), children with absolute avatar URLs.
pub fn editor_view(detail: FamilyDetail, base_url: &str) -> AppResult<Value> {
    let mut merged = Map::new();
    if let Value::Object(widow) = serde_json::to_value(&detail.widow).map_err(anyhow::Error::from)? {
        merged.extend(widow);
    }
    if let Value::Object(family) = serde_json::to_value(&detail.family).map_err(anyhow::Error::from)? {
        merged.extend(family);
    }
    let children = detail
        .children
        .into_iter()
        .map(|mut c| {
            c.child.avatar = c.child.avatar.map(|a| uploads::public_url(base_url, &a));
            c
        })
        .collect::<Vec<_>>();
    merged.insert(
        "children".into(),
        serde_json::to_value(children).map_err(anyhow::Error::from)?,
    );
    Ok(Value::Object(merged))
}

pub struct FamilyService;

impl FamilyService {
    pub async fn committee_of(pool: &PgPool, id: i32) -> AppResult<Option<i32>> {
        let committee = sqlx::query_scalar::<_, i32>("SELECT committee_id FROM families WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(committee)
    }

    /// Whether another widow already uses this national id.
    pub async fn widow_cin_taken(pool: &PgPool, cin: &str, except_family: Option<i32>) -> AppResult<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM widows
                            WHERE cin_number = $1 AND ($2::INT IS NULL OR family_id <> $2))",
        )
        .bind(cin)
        .bind(except_family)
        .fetch_one(pool)
        .await?;
        Ok(taken)
    }

    async fn ensure_widow_cin_free(pool: &PgPool, cin: &str, except_family: Option<i32>) -> AppResult<()> {
        if Self::widow_cin_taken(pool, cin, except_family).await? {
            return Err(AppError::field("cinNumber", "رقم البطاقة الوطنية موجود مسبقا"));
        }
        Ok(())
    }

    async fn insert_child(
        conn: &mut PgConnection,
        family_id: i32,
        committee_id: i32,
        child: &ChildForm,
    ) -> AppResult<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO children (family_id, committee_id, full_name, date_of_birth, gender,
                                   school_level, avatar)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(family_id)
        .bind(committee_id)
        .bind(&child.full_name)
        .bind(child.date_of_birth)
        .bind(&child.gender)
        .bind(&child.school_level)
        .bind(&child.avatar)
        .fetch_one(&mut *conn)
        .await?;
        ChildService::insert_grades(conn, id, &child.semester_grades).await?;
        Ok(id)
    }

    async fn write_widow(
        conn: &mut PgConnection,
        family_id: i32,
        committee_id: i32,
        widow: &WidowForm,
        needs: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO widows (family_id, committee_id, widows_name, health_status,
                                 address_of_head_of_family, phone_number, cin_number, level,
                                 diplome, job, salary, extra_salary, important_needs)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (family_id) DO UPDATE SET
                 widows_name = EXCLUDED.widows_name,
                 health_status = EXCLUDED.health_status,
                 address_of_head_of_family = EXCLUDED.address_of_head_of_family,
                 phone_number = EXCLUDED.phone_number,
                 cin_number = EXCLUDED.cin_number,
                 level = EXCLUDED.level,
                 diplome = EXCLUDED.diplome,
                 job = EXCLUDED.job,
                 salary = EXCLUDED.salary,
                 extra_salary = EXCLUDED.extra_salary,
                 important_needs = EXCLUDED.important_needs",
        )
        .bind(family_id)
        .bind(committee_id)
        .bind(&widow.widows_name)
        .bind(&widow.health_status)
        .bind(&widow.address_of_head_of_family)
        .bind(&widow.phone_number)
        .bind(&widow.cin_number)
        .bind(&widow.level)
        .bind(&widow.diplome)
        .bind(&widow.job)
        .bind(&widow.salary)
        .bind(&widow.extra_salary)
        .bind(needs)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Family, widow, children and grades in one transaction. Avatars must
    /// already be stored.
    pub async fn create(pool: &PgPool, committee_id: i32, form: &FamilyForm) -> AppResult<FamilyDetail> {
        Self::ensure_widow_cin_free(pool, &form.widow.cin_number, None).await?;
        let needs = form.needs_joined();

        let mut tx = pool.begin().await?;
        let family_id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO families (registration_date, orphans_last_name, housing, housing_type,
                                   rental_amount, important_needs, committee_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(form.registration_date)
        .bind(&form.orphans_last_name)
        .bind(&form.housing)
        .bind(&form.housing_type)
        .bind(&form.rental_amount)
        .bind(&needs)
        .bind(committee_id)
        .fetch_one(&mut *tx)
        .await?;

        Self::write_widow(&mut tx, family_id, committee_id, &form.widow, &needs).await?;
        for child in &form.children {
            Self::insert_child(&mut tx, family_id, committee_id, child).await?;
        }
        tx.commit().await?;

        tracing::info!(family_id, committee_id, children = form.children.len(), "family created");
        Self::detail(pool, family_id)
            .await?
            .ok_or_else(|| AppError::not_found("العائلة غير موجودة"))
    }

    /// Applies the editor payload: children missing from the list are
    /// deleted, `new_*` children inserted, the rest updated with their grades
    /// replaced.
    pub async fn update(pool: &PgPool, form: &FamilyForm) -> AppResult<FamilyDetail> {
        let family_id = form.id.ok_or_else(|| AppError::field("id", "معرف العائلة مطلوب"))?;
        let committee_id = Self::committee_of(pool, family_id)
            .await?
            .ok_or_else(|| AppError::not_found("العائلة غير موجودة"))?;
        Self::ensure_widow_cin_free(pool, &form.widow.cin_number, Some(family_id)).await?;
        let needs = form.needs_joined();

        let mut tx = pool.begin().await?;
        let existing: Vec<i32> = sqlx::query_scalar("SELECT id FROM children WHERE family_id = $1")
            .bind(family_id)
            .fetch_all(&mut *tx)
            .await?;
        let removed = children_to_delete(&existing, &form.children);
        if !removed.is_empty() {
            sqlx::query("DELETE FROM children WHERE id = ANY($1)")
                .bind(&removed)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE families
             SET registration_date = $2, orphans_last_name = $3, housing = $4,
                 housing_type = $5, rental_amount = $6, important_needs = $7
             WHERE id = $1",
        )
        .bind(family_id)
        .bind(form.registration_date)
        .bind(&form.orphans_last_name)
        .bind(&form.housing)
        .bind(&form.housing_type)
        .bind(&form.rental_amount)
        .bind(&needs)
        .execute(&mut *tx)
        .await?;
        Self::write_widow(&mut tx, family_id, committee_id, &form.widow, &needs).await?;

        for child in &form.children {
            match &child.id {
                Some(ChildRef::Existing(child_id)) => {
                    let updated = sqlx::query(
                        "UPDATE children
                         SET full_name = $3, date_of_birth = $4, gender = $5, school_level = $6,
                             avatar = $7, committee_id = $8
                         WHERE id = $1 AND family_id = $2",
                    )
                    .bind(child_id)
                    .bind(family_id)
                    .bind(&child.full_name)
                    .bind(child.date_of_birth)
                    .bind(&child.gender)
                    .bind(&child.school_level)
                    .bind(&child.avatar)
                    .bind(committee_id)
                    .execute(&mut *tx)
                    .await?;
                    if updated.rows_affected() == 0 {
                        return Err(AppError::not_found("الطفل غير موجود"));
                    }
                    ChildService::replace_grades(&mut tx, *child_id, &child.semester_grades).await?;
                }
                Some(ChildRef::New(_)) | None => {
                    Self::insert_child(&mut tx, family_id, committee_id, child).await?;
                }
            }
        }
        tx.commit().await?;

        tracing::info!(family_id, removed = removed.len(), "family updated");
        Self::detail(pool, family_id)
            .await?
            .ok_or_else(|| AppError::not_found("العائلة غير موجودة"))
    }

    /// Moves the family, its widow and its children to another committee.
    pub async fn transfer(pool: &PgPool, family_id: i32, committee_id: i32) -> AppResult<FamilyDetail> {
        let mut tx = pool.begin().await?;
        let moved = sqlx::query("UPDATE families SET committee_id = $2 WHERE id = $1")
            .bind(family_id)
            .bind(committee_id)
            .execute(&mut *tx)
            .await?;
        if moved.rows_affected() == 0 {
            return Err(AppError::not_found("العائلة غير موجودة"));
        }
        sqlx::query("UPDATE widows SET committee_id = $2 WHERE family_id = $1")
            .bind(family_id)
            .bind(committee_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE children SET committee_id = $2 WHERE family_id = $1")
            .bind(family_id)
            .bind(committee_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(family_id, committee_id, "family transferred");
        Self::detail(pool, family_id)
            .await?
            .ok_or_else(|| AppError::not_found("العائلة غير موجودة"))
    }

    pub async fn detail(pool: &PgPool, id: i32) -> AppResult<Option<FamilyDetail>> {
        let Some(family) = sqlx::query_as::<_, Family>(&format!(
            "SELECT {FAMILY_COLUMNS} FROM families WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        else {
            return Ok(None);
        };

        let widow = sqlx::query_as::<_, Widow>(&format!(
            "SELECT {WIDOW_COLUMNS} FROM widows WHERE family_id = $1"
        ))
        .bind(id)
        .fetch_one(pool)
        .await?;

        let children = sqlx::query_as::<_, Child>(
            "SELECT id, family_id, committee_id, full_name, date_of_birth, gender, school_level, avatar
             FROM children WHERE family_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        let ids: Vec<i32> = children.iter().map(|c| c.id).collect();
        let mut grades: HashMap<i32, Vec<_>> = HashMap::new();
        for grade in ChildService::grades_of(pool, &ids).await? {
            grades.entry(grade.child_id).or_default().push(grade);
        }
        let children = children
            .into_iter()
            .map(|child| {
                let semester_grades = grades.remove(&child.id).unwrap_or_default();
                ChildWithGrades { child, semester_grades }
            })
            .collect();

        Ok(Some(FamilyDetail { family, widow, children }))
    }

    /// First families in scope plus the scope's total count.
    pub async fn preview(
        pool: &PgPool,
        committee_id: Option<i32>,
        limit: i64,
    ) -> AppResult<(Vec<FamilySummary>, i64)> {
        let families = sqlx::query_as::<_, FamilySummary>(
            "SELECT f.id, f.orphans_last_name, COALESCE(w.widows_name, '') AS widows_name
             FROM families f
             LEFT JOIN widows w ON w.family_id = f.id
             WHERE $1::INT IS NULL OR f.committee_id = $1
             ORDER BY f.id
             LIMIT $2",
        )
        .bind(committee_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        let count = Self::count(pool, committee_id).await?;
        Ok((families, count))
    }

    pub async fn count(pool: &PgPool, committee_id: Option<i32>) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM families WHERE $1::INT IS NULL OR committee_id = $1",
        )
        .bind(committee_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Family card with the widow's contact fields and the child count.
    pub async fn card(pool: &PgPool, id: i32) -> AppResult<Option<FamilyCard>> {
        let card = sqlx::query_as::<_, FamilyCard>(
            "SELECT f.id, f.registration_date, f.orphans_last_name, w.widows_name,
                    w.address_of_head_of_family, w.phone_number, w.cin_number, w.job,
                    (SELECT COUNT(*) FROM children c WHERE c.family_id = f.id) AS number_of_children
             FROM families f
             JOIN widows w ON w.family_id = f.id
             WHERE f.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(card)
    }

    pub async fn page(pool: &PgPool, committee_id: Option<i32>, page: i64) -> AppResult<Vec<FamilyCard>> {
        let offset = (page.max(1) - 1) * FAMILIES_PAGE_SIZE;
        let cards = sqlx::query_as::<_, FamilyCard>(
            "SELECT f.id, f.registration_date, f.orphans_last_name, w.widows_name,
                    w.address_of_head_of_family, w.phone_number, w.cin_number, w.job,
                    NULL::BIGINT AS number_of_children
             FROM families f
             JOIN widows w ON w.family_id = f.id
             WHERE $1::INT IS NULL OR f.committee_id = $1
             ORDER BY f.id
             LIMIT $2 OFFSET $3",
        )
        .bind(committee_id)
        .bind(FAMILIES_PAGE_SIZE)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::family::{Family, Widow};
    use chrono::{NaiveDate, Utc};

    fn child_form(id: Option<ChildRef>) -> ChildForm {
        ChildForm {
            id,
            full_name: "Ali".into(),
            date_of_birth: NaiveDate::from_ymd_opt(2015, 5, 5).unwrap(),
            gender: "male".into(),
            school_level: "الأولى إبتدائي".into(),
            avatar: None,
            semester_grades: vec![],
        }
    }

    #[test]
    fn children_missing_from_submission_are_deleted() {
        let submitted = vec![
            child_form(Some(ChildRef::Existing(2))),
            child_form(Some(ChildRef::New("new_9".into()))),
            child_form(None),
        ];
        assert_eq!(children_to_delete(&[1, 2, 3], &submitted), vec![1, 3]);
        assert!(children_to_delete(&[], &submitted).is_empty());
    }

    #[test]
    fn editor_view_keeps_family_id_and_absolute_avatars() {
        let detail = FamilyDetail {
            family: Family {
                id: 10,
                registration_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                orphans_last_name: "Benali".into(),
                housing: "rent".into(),
                housing_type: "apartment".into(),
                rental_amount: "1500".into(),
                important_needs: "food".into(),
                committee_id: 1,
                created_at: Utc::now(),
            },
            widow: Widow {
                id: 77,
                family_id: 10,
                committee_id: 1,
                widows_name: "Fatima".into(),
                health_status: "good".into(),
                address_of_head_of_family: "12 Main Street".into(),
                phone_number: "0612345678".into(),
                cin_number: "AB123456".into(),
                level: "غير متمدرس".into(),
                diplome: None,
                job: "none".into(),
                salary: "0".into(),
                extra_salary: "0".into(),
                important_needs: "food".into(),
            },
            children: vec![ChildWithGrades {
                child: Child {
                    id: 5,
                    family_id: 10,
                    committee_id: 1,
                    full_name: "Ali".into(),
                    date_of_birth: NaiveDate::from_ymd_opt(2015, 5, 5).unwrap(),
                    gender: "male".into(),
                    school_level: "الأولى إبتدائي".into(),
                    avatar: Some("/uploads/child_1_ab.png".into()),
                },
                semester_grades: vec![],
            }],
        };

        let view = editor_view(detail, "http://host:8080").unwrap();
        assert_eq!(view["id"], 10);
        assert_eq!(view["WidowsName"], "Fatima");
        assert_eq!(view["cinNumber"], "AB123456");
        assert_eq!(view["children"][0]["avatar"], "http://host:8080/uploads/child_1_ab.png");
        assert!(view.get("Widow").is_none());
    }
}
