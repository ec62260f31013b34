use std::collections::HashSet;

use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::{
        family::ALL_LEVELS,
        subject::{
            AttendanceForm, AttendanceRow, Class, ClassForm, EducationTarget, EnrolledStudent,
            RemarkForm, RemarkRow, Student, Subject, SubjectForm, SubjectListItem, SubjectName,
        },
    },
    services::ensure_in_committee,
};

const SUBJECT_COLUMNS: &str = "id, name, target, level_targeted, teacher_id, committee_id, created_at";
const STUDENT_SCOPE_MESSAGE: &str = "الطالب غير موجود في لجنة هذه المادة";
const CLASS_COLUMNS: &str = "id, subject_id, name, class_date, start_time, target";

/// Table names and columns that differ between orphan and widow subjects.
struct Roster {
    enrollments: &'static str,
    student_column: &'static str,
    students: &'static str,
    name_column: &'static str,
}

fn roster(target: EducationTarget) -> Roster {
    match target {
        EducationTarget::Orphan => Roster {
            enrollments: "orphan_subject_enrollments",
            student_column: "child_id",
            students: "children",
            name_column: "full_name",
        },
        EducationTarget::Widow => Roster {
            enrollments: "widow_subject_enrollments",
            student_column: "widow_id",
            students: "widows",
            name_column: "widows_name",
        },
    }
}

/// `(to_remove, to_add)` turning `current` enrollment into `wanted`.
pub fn enrollment_diff(current: &[i32], wanted: &[i32]) -> (Vec<i32>, Vec<i32>) {
    let current_set: HashSet<i32> = current.iter().copied().collect();
    let wanted_set: HashSet<i32> = wanted.iter().copied().collect();
    let to_remove = current.iter().copied().filter(|id| !wanted_set.contains(id)).collect();
    let mut seen = HashSet::new();
    let to_add = wanted
        .iter()
        .copied()
        .filter(|id| !current_set.contains(id) && seen.insert(*id))
        .collect();
    (to_remove, to_add)
}

pub struct SubjectService;

impl SubjectService {
    pub async fn find(pool: &PgPool, id: i32) -> AppResult<Option<Subject>> {
        let subject = sqlx::query_as::<_, Subject>(&format!(
            "SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(subject)
    }

    pub async fn require(pool: &PgPool, id: i32) -> AppResult<Subject> {
        Self::find(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("المادة غير موجودة"))
    }

    /// Students must belong to the subject's committee.
    async fn enroll(
        conn: &mut PgConnection,
        target: EducationTarget,
        subject_id: i32,
        committee_id: i32,
        student_ids: &[i32],
    ) -> AppResult<()> {
        if student_ids.is_empty() {
            return Ok(());
        }
        let r = roster(target);
        ensure_in_committee(conn, r.students, student_ids, Some(committee_id), STUDENT_SCOPE_MESSAGE).await?;
        sqlx::query(&format!(
            "INSERT INTO {} ({}, subject_id)
             SELECT student, $2 FROM UNNEST($1::INT[]) AS student
             ON CONFLICT DO NOTHING",
            r.enrollments, r.student_column
        ))
        .bind(student_ids)
        .bind(subject_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// One absence row per (class, student) for the given students across
    /// every existing class of the subject, or of a single class.
    async fn open_absences(
        conn: &mut PgConnection,
        target: EducationTarget,
        subject_id: i32,
        class_id: Option<i32>,
        student_ids: &[i32],
    ) -> AppResult<u64> {
        if student_ids.is_empty() {
            return Ok(0);
        }
        let r = roster(target);
        let inserted = sqlx::query(&format!(
            "INSERT INTO absences (class_id, subject_id, {}, is_absent, is_justified)
             SELECT c.id, c.subject_id, student, FALSE, FALSE
             FROM classes c CROSS JOIN UNNEST($3::INT[]) AS student
             WHERE c.subject_id = $1 AND ($2::INT IS NULL OR c.id = $2)
             ON CONFLICT DO NOTHING",
            r.student_column
        ))
        .bind(subject_id)
        .bind(class_id)
        .bind(student_ids)
        .execute(&mut *conn)
        .await?;
        Ok(inserted.rows_affected())
    }

    /// The teacher must be a member of the subject's committee.
    async fn ensure_teacher(conn: &mut PgConnection, cin: &str, committee_id: i32) -> AppResult<()> {
        let known = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM members WHERE cin = $1 AND committee_id = $2)",
        )
        .bind(cin)
        .bind(committee_id)
        .fetch_one(&mut *conn)
        .await?;
        if !known {
            return Err(AppError::field("teacher", "المعلم غير موجود في هذه اللجنة"));
        }
        Ok(())
    }

    pub async fn create(pool: &PgPool, committee_id: i32, form: &SubjectForm) -> AppResult<Subject> {
        let mut tx = pool.begin().await?;
        Self::ensure_teacher(&mut tx, &form.teacher, committee_id).await?;
        let subject = sqlx::query_as::<_, Subject>(&format!(
            "INSERT INTO subjects (name, target, level_targeted, teacher_id, committee_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SUBJECT_COLUMNS}"
        ))
        .bind(&form.name)
        .bind(form.target.as_str())
        .bind(form.level_targeted())
        .bind(&form.teacher)
        .bind(committee_id)
        .fetch_one(&mut *tx)
        .await?;
        Self::enroll(&mut tx, form.target, subject.id, committee_id, &form.student_ids).await?;
        tx.commit().await?;

        tracing::info!(subject_id = subject.id, committee_id, target = %form.target, "subject created");
        Ok(subject)
    }

    /// Renames/reassigns the subject and diffs its enrollment; absences follow
    /// the enrollment change for every existing class.
    pub async fn update(pool: &PgPool, subject: &Subject, form: &SubjectForm) -> AppResult<()> {
        let target = subject.target()?;
        let r = roster(target);
        let mut tx = pool.begin().await?;
        Self::ensure_teacher(&mut tx, &form.teacher, subject.committee_id).await?;

        sqlx::query(
            "UPDATE subjects
             SET name = $2, teacher_id = $3,
                 level_targeted = CASE WHEN target = 'ORPHAN' THEN $4 ELSE level_targeted END
             WHERE id = $1",
        )
        .bind(subject.id)
        .bind(&form.name)
        .bind(&form.teacher)
        .bind(form.level_targeted())
        .execute(&mut *tx)
        .await?;

        let current: Vec<i32> = sqlx::query_scalar(&format!(
            "SELECT {} FROM {} WHERE subject_id = $1",
            r.student_column, r.enrollments
        ))
        .bind(subject.id)
        .fetch_all(&mut *tx)
        .await?;
        let (to_remove, to_add) = enrollment_diff(&current, &form.student_ids);

        if !to_remove.is_empty() {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE subject_id = $1 AND {} = ANY($2)",
                r.enrollments, r.student_column
            ))
            .bind(subject.id)
            .bind(&to_remove)
            .execute(&mut *tx)
            .await?;
            sqlx::query(&format!(
                "DELETE FROM absences WHERE subject_id = $1 AND {} = ANY($2)",
                r.student_column
            ))
            .bind(subject.id)
            .bind(&to_remove)
            .execute(&mut *tx)
            .await?;
        }
        Self::enroll(&mut tx, target, subject.id, subject.committee_id, &to_add).await?;
        Self::open_absences(&mut tx, target, subject.id, None, &to_add).await?;
        tx.commit().await?;

        tracing::info!(
            subject_id = subject.id,
            removed = to_remove.len(),
            added = to_add.len(),
            "subject updated"
        );
        Ok(())
    }

    /// Subjects of one committee and target; teachers only see their own.
    pub async fn list(
        pool: &PgPool,
        committee_id: i32,
        target: EducationTarget,
        teacher: Option<&str>,
    ) -> AppResult<Vec<SubjectListItem>> {
        let r = roster(target);
        let items = sqlx::query_as::<_, SubjectListItem>(&format!(
            "SELECT s.id, s.name, s.level_targeted,
                    (SELECT COUNT(*) FROM {} e WHERE e.subject_id = s.id) AS students_count
             FROM subjects s
             WHERE s.committee_id = $1 AND s.target = $2
               AND ($3::TEXT IS NULL OR s.teacher_id = $3)
             ORDER BY s.id",
            r.enrollments
        ))
        .bind(committee_id)
        .bind(target.as_str())
        .bind(teacher)
        .fetch_all(pool)
        .await?;
        Ok(items)
    }

    /// Enrolled students by id and name; orphans may be narrowed to one level.
    pub async fn students(pool: &PgPool, subject: &Subject, level: Option<&str>) -> AppResult<Vec<Student>> {
        let target = subject.target()?;
        let r = roster(target);
        let level = match target {
            EducationTarget::Orphan => level.filter(|l| *l != ALL_LEVELS),
            EducationTarget::Widow => None,
        };
        let level_filter = match target {
            EducationTarget::Orphan => "AND ($2::TEXT IS NULL OR s.school_level = $2)",
            EducationTarget::Widow => "AND $2::TEXT IS NULL",
        };
        let students = sqlx::query_as::<_, Student>(&format!(
            "SELECT s.id, s.{name} AS name
             FROM {enrollments} e
             JOIN {students} s ON s.id = e.{column}
             WHERE e.subject_id = $1 {level_filter}
             ORDER BY s.{name}",
            name = r.name_column,
            enrollments = r.enrollments,
            students = r.students,
            column = r.student_column,
        ))
        .bind(subject.id)
        .bind(level)
        .fetch_all(pool)
        .await?;
        Ok(students)
    }

    /// Full roster for the subject editor, with school levels for orphans.
    pub async fn enrolled(pool: &PgPool, subject: &Subject) -> AppResult<Vec<EnrolledStudent>> {
        let target = subject.target()?;
        let r = roster(target);
        let level = match target {
            EducationTarget::Orphan => "s.school_level",
            EducationTarget::Widow => "NULL::TEXT",
        };
        let students = sqlx::query_as::<_, EnrolledStudent>(&format!(
            "SELECT s.id, s.{name} AS name, {level} AS school_level
             FROM {enrollments} e
             JOIN {students} s ON s.id = e.{column}
             WHERE e.subject_id = $1
             ORDER BY s.{name}",
            name = r.name_column,
            enrollments = r.enrollments,
            students = r.students,
            column = r.student_column,
        ))
        .bind(subject.id)
        .fetch_all(pool)
        .await?;
        Ok(students)
    }

    pub async fn delete(pool: &PgPool, id: i32) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::not_found("المادة غير موجودة"));
        }
        tracing::info!(subject_id = id, "subject deleted");
        Ok(())
    }

    /// `{id, name}` of the subjects of the selected committees.
    pub async fn for_export(
        pool: &PgPool,
        committee_ids: &[i32],
        target: EducationTarget,
    ) -> AppResult<Vec<SubjectName>> {
        let subjects = sqlx::query_as::<_, SubjectName>(
            "SELECT id, name FROM subjects
             WHERE committee_id = ANY($1) AND target = $2
             ORDER BY committee_id, name",
        )
        .bind(committee_ids)
        .bind(target.as_str())
        .fetch_all(pool)
        .await?;
        Ok(subjects)
    }

    // ─── Classes ─────────────────────────────────────────────────────────────

    pub async fn find_class(pool: &PgPool, id: i32) -> AppResult<Option<Class>> {
        let class = sqlx::query_as::<_, Class>(&format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(class)
    }

    pub async fn require_class(pool: &PgPool, id: i32) -> AppResult<Class> {
        Self::find_class(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("الحصة غير موجودة"))
    }

    pub async fn classes(pool: &PgPool, subject_id: i32) -> AppResult<Vec<Class>> {
        let classes = sqlx::query_as::<_, Class>(&format!(
            "SELECT {CLASS_COLUMNS} FROM classes WHERE subject_id = $1 ORDER BY class_date, start_time"
        ))
        .bind(subject_id)
        .fetch_all(pool)
        .await?;
        Ok(classes)
    }

    /// The class and one absence row per enrolled student, together.
    pub async fn create_class(pool: &PgPool, subject: &Subject, form: &ClassForm) -> AppResult<Class> {
        let target = subject.target()?;
        let r = roster(target);
        let mut tx = pool.begin().await?;

        let class = sqlx::query_as::<_, Class>(&format!(
            "INSERT INTO classes (subject_id, name, class_date, start_time, target)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {CLASS_COLUMNS}"
        ))
        .bind(subject.id)
        .bind(&form.name)
        .bind(form.date)
        .bind(&form.time)
        .bind(target.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let enrolled: Vec<i32> = sqlx::query_scalar(&format!(
            "SELECT {} FROM {} WHERE subject_id = $1",
            r.student_column, r.enrollments
        ))
        .bind(subject.id)
        .fetch_all(&mut *tx)
        .await?;
        let opened = Self::open_absences(&mut tx, target, subject.id, Some(class.id), &enrolled).await?;
        tx.commit().await?;

        tracing::info!(class_id = class.id, subject_id = subject.id, absences = opened, "class created");
        Ok(class)
    }

    pub async fn edit_class(pool: &PgPool, form: &ClassForm) -> AppResult<Class> {
        sqlx::query_as::<_, Class>(&format!(
            "UPDATE classes SET name = $2, class_date = $3, start_time = $4
             WHERE id = $1
             RETURNING {CLASS_COLUMNS}"
        ))
        .bind(form.id)
        .bind(&form.name)
        .bind(form.date)
        .bind(&form.time)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("الحصة غير موجودة"))
    }

    pub async fn delete_class(pool: &PgPool, id: i32) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::not_found("الحصة غير موجودة"));
        }
        tracing::info!(class_id = id, "class deleted");
        Ok(())
    }

    // ─── Attendance ──────────────────────────────────────────────────────────

    pub async fn attendance(pool: &PgPool, class: &Class) -> AppResult<Vec<AttendanceRow>> {
        let target = class.target()?;
        let r = roster(target);
        let rows = sqlx::query_as::<_, AttendanceRow>(&format!(
            "SELECT s.id, s.{name} AS name, NOT a.is_absent AS is_present, a.is_justified
             FROM absences a
             JOIN {students} s ON s.id = a.{column}
             WHERE a.class_id = $1
             ORDER BY s.{name}",
            name = r.name_column,
            students = r.students,
            column = r.student_column,
        ))
        .bind(class.id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// All marks or none: a student without an absence row in this class
    /// aborts the batch.
    pub async fn record_attendance(pool: &PgPool, class: &Class, form: &AttendanceForm) -> AppResult<()> {
        let target = class.target()?;
        let r = roster(target);
        let sql = format!(
            "UPDATE absences SET is_absent = $3, is_justified = $4
             WHERE class_id = $1 AND {} = $2",
            r.student_column
        );

        let mut tx = pool.begin().await?;
        for mark in &form.students {
            let updated = sqlx::query(&sql)
                .bind(class.id)
                .bind(mark.student_id)
                .bind(!mark.is_present)
                .bind(mark.is_justified)
                .execute(&mut *tx)
                .await?;
            if updated.rows_affected() == 0 {
                return Err(AppError::not_found(format!(
                    "لا يوجد سجل غياب للطالب {}",
                    mark.student_id
                )));
            }
        }
        tx.commit().await?;

        tracing::info!(class_id = class.id, marks = form.students.len(), "attendance recorded");
        Ok(())
    }

    // ─── Remarks ─────────────────────────────────────────────────────────────

    /// Insert or replace the remark for (subject, student). Returns the row
    /// and whether it already existed.
    pub async fn upsert_remark(
        pool: &PgPool,
        subject: &Subject,
        form: &RemarkForm,
        content: &str,
    ) -> AppResult<(RemarkRow, bool)> {
        let r = roster(form.target);
        ensure_in_committee(
            &mut *pool.acquire().await?,
            r.students,
            &[form.student_id],
            Some(subject.committee_id),
            STUDENT_SCOPE_MESSAGE,
        )
        .await?;

        let existed = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS (SELECT 1 FROM remarks WHERE subject_id = $1 AND {} = $2)",
            r.student_column
        ))
        .bind(form.subject_id)
        .bind(form.student_id)
        .fetch_one(pool)
        .await?;

        let id = sqlx::query_scalar::<_, i32>(&format!(
            "INSERT INTO remarks (subject_id, {column}, content)
             VALUES ($1, $2, $3)
             ON CONFLICT (subject_id, {column})
             DO UPDATE SET content = EXCLUDED.content, updated_at = NOW()
             RETURNING id",
            column = r.student_column,
        ))
        .bind(form.subject_id)
        .bind(form.student_id)
        .bind(content)
        .fetch_one(pool)
        .await?;

        let remark = Self::remarks_where(pool, form.target, "r.id = $1", id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("الملاحظة غير موجودة"))?;
        Ok((remark, existed))
    }

    pub async fn remarks(pool: &PgPool, subject: &Subject) -> AppResult<Vec<RemarkRow>> {
        Self::remarks_where(pool, subject.target()?, "r.subject_id = $1", subject.id).await
    }

    async fn remarks_where(
        pool: &PgPool,
        target: EducationTarget,
        condition: &str,
        key: i32,
    ) -> AppResult<Vec<RemarkRow>> {
        let r = roster(target);
        let rows = sqlx::query_as::<_, RemarkRow>(&format!(
            "SELECT r.id, r.content, r.subject_id, r.created_at, r.updated_at,
                    s.id AS student_id, s.{name} AS student_name
             FROM remarks r
             JOIN {students} s ON s.id = r.{column}
             WHERE {condition}
             ORDER BY r.updated_at DESC",
            name = r.name_column,
            students = r.students,
            column = r.student_column,
        ))
        .bind(key)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn delete_remark(pool: &PgPool, form: &RemarkForm) -> AppResult<u64> {
        let r = roster(form.target);
        let deleted = sqlx::query(&format!(
            "DELETE FROM remarks WHERE subject_id = $1 AND {} = $2",
            r.student_column
        ))
        .bind(form.subject_id)
        .bind(form.student_id)
        .execute(pool)
        .await?;
        Ok(deleted.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_diff_splits_removed_and_added() {
        let (remove, add) = enrollment_diff(&[1, 2, 3], &[2, 3, 4, 5]);
        assert_eq!(remove, vec![1]);
        assert_eq!(add, vec![4, 5]);
    }

    #[test]
    fn enrollment_diff_ignores_duplicates_and_no_ops() {
        let (remove, add) = enrollment_diff(&[7], &[7, 8, 8]);
        assert!(remove.is_empty());
        assert_eq!(add, vec![8]);

        let (remove, add) = enrollment_diff(&[1, 2], &[]);
        assert_eq!(remove, vec![1, 2]);
        assert!(add.is_empty());
    }

    #[test]
    fn roster_tables_follow_target() {
        let orphans = roster(EducationTarget::Orphan);
        assert_eq!(orphans.enrollments, "orphan_subject_enrollments");
        assert_eq!(orphans.student_column, "child_id");

        let widows = roster(EducationTarget::Widow);
        assert_eq!(widows.students, "widows");
        assert_eq!(widows.name_column, "widows_name");
    }
}
