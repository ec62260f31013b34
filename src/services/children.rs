use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::family::{
        Child, ChildCard, ChildForm, ChildName, ChildProfile, ChildWithGrades, GradeForm,
        SemesterGrade, WidowName, ALL_LEVELS,
    },
};

pub const CHILDREN_PAGE_SIZE: i64 = 20;
const CHILD_COLUMNS: &str =
    "id, family_id, committee_id, full_name, date_of_birth, gender, school_level, avatar";

pub struct ChildService;

impl ChildService {
    pub async fn insert_grades(
        conn: &mut PgConnection,
        child_id: i32,
        grades: &[GradeForm],
    ) -> AppResult<()> {
        for grade in grades {
            sqlx::query(
                "INSERT INTO semester_grades (child_id, year_number, year_label, grade)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(child_id)
            .bind(grade.year_number)
            .bind(&grade.year_label)
            .bind(grade.grade)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Grades are replaced wholesale on every edit.
    pub async fn replace_grades(
        conn: &mut PgConnection,
        child_id: i32,
        grades: &[GradeForm],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM semester_grades WHERE child_id = $1")
            .bind(child_id)
            .execute(&mut *conn)
            .await?;
        Self::insert_grades(conn, child_id, grades).await
    }

    pub async fn grades_of(pool: &PgPool, child_ids: &[i32]) -> AppResult<Vec<SemesterGrade>> {
        let grades = sqlx::query_as::<_, SemesterGrade>(
            "SELECT id, child_id, year_number, year_label, grade
             FROM semester_grades WHERE child_id = ANY($1)
             ORDER BY child_id, year_number",
        )
        .bind(child_ids)
        .fetch_all(pool)
        .await?;
        Ok(grades)
    }

    pub async fn committee_of(pool: &PgPool, id: i32) -> AppResult<Option<i32>> {
        let committee = sqlx::query_scalar::<_, i32>("SELECT committee_id FROM children WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(committee)
    }

    /// Dashboard preview: a handful of children with their enrollment flag.
    pub async fn preview(pool: &PgPool, committee_id: Option<i32>, limit: i64) -> AppResult<Vec<ChildCard>> {
        Self::cards(pool, committee_id, limit, 0).await
    }

    pub async fn page(pool: &PgPool, committee_id: Option<i32>, page: i64) -> AppResult<Vec<ChildCard>> {
        let offset = (page.max(1) - 1) * CHILDREN_PAGE_SIZE;
        Self::cards(pool, committee_id, CHILDREN_PAGE_SIZE, offset).await
    }

    async fn cards(
        pool: &PgPool,
        committee_id: Option<i32>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ChildCard>> {
        let cards = sqlx::query_as::<_, ChildCard>(
            "SELECT c.id, c.full_name, c.date_of_birth,
                    EXISTS (SELECT 1 FROM orphan_subject_enrollments e WHERE e.child_id = c.id)
                        AS beneficiary
             FROM children c
             WHERE $1::INT IS NULL OR c.committee_id = $1
             ORDER BY c.id
             LIMIT $2 OFFSET $3",
        )
        .bind(committee_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(cards)
    }

    /// Case-insensitive substring match on the full name.
    pub async fn search(pool: &PgPool, committee_id: Option<i32>, term: &str) -> AppResult<Vec<Child>> {
        let pattern = format!("%{}%", escape_like(term.trim()));
        let children = sqlx::query_as::<_, Child>(&format!(
            "SELECT {CHILD_COLUMNS} FROM children
             WHERE ($1::INT IS NULL OR committee_id = $1) AND full_name ILIKE $2
             ORDER BY full_name
             LIMIT 50"
        ))
        .bind(committee_id)
        .bind(pattern)
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    pub async fn profile(pool: &PgPool, id: i32) -> AppResult<Option<ChildProfile>> {
        let profile = sqlx::query_as::<_, ChildProfile>(
            "SELECT c.full_name, c.date_of_birth, c.gender, c.school_level, c.avatar,
                    c.committee_id, cm.name AS committee_name
             FROM children c
             JOIN committees cm ON cm.id = c.committee_id
             WHERE c.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(profile)
    }

    pub async fn with_grades(pool: &PgPool, id: i32) -> AppResult<Option<ChildWithGrades>> {
        let Some(child) = sqlx::query_as::<_, Child>(&format!(
            "SELECT {CHILD_COLUMNS} FROM children WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        else {
            return Ok(None);
        };
        let semester_grades = Self::grades_of(pool, &[id]).await?;
        Ok(Some(ChildWithGrades { child, semester_grades }))
    }

    /// Standalone child edit. A missing avatar keeps the stored one.
    pub async fn update(pool: &PgPool, id: i32, form: &ChildForm) -> AppResult<ChildWithGrades> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE children
             SET full_name = $2, date_of_birth = $3, gender = $4, school_level = $5,
                 avatar = COALESCE($6, avatar)
             WHERE id = $1",
        )
        .bind(id)
        .bind(&form.full_name)
        .bind(form.date_of_birth)
        .bind(&form.gender)
        .bind(&form.school_level)
        .bind(&form.avatar)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("الطفل غير موجود"));
        }
        Self::replace_grades(&mut tx, id, &form.semester_grades).await?;
        tx.commit().await?;

        Self::with_grades(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("الطفل غير موجود"))
    }

    /// Children at one school level (or all levels) for enrollment pickers.
    pub async fn names_by_level(
        pool: &PgPool,
        committee_id: Option<i32>,
        level: &str,
    ) -> AppResult<Vec<ChildName>> {
        let level = (level != ALL_LEVELS).then_some(level);
        let names = sqlx::query_as::<_, ChildName>(
            "SELECT id, full_name FROM children
             WHERE ($1::INT IS NULL OR committee_id = $1)
               AND ($2::TEXT IS NULL OR school_level = $2)
             ORDER BY full_name",
        )
        .bind(committee_id)
        .bind(level)
        .fetch_all(pool)
        .await?;
        Ok(names)
    }

    pub async fn widow_names(pool: &PgPool, committee_id: Option<i32>) -> AppResult<Vec<WidowName>> {
        let names = sqlx::query_as::<_, WidowName>(
            "SELECT id, widows_name FROM widows
             WHERE $1::INT IS NULL OR committee_id = $1
             ORDER BY widows_name",
        )
        .bind(committee_id)
        .fetch_all(pool)
        .await?;
        Ok(names)
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("ali"), "ali");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
