use std::collections::HashMap;

use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::committee::{Committee, CommitteeForm, CommitteeWithMembers, JoinCandidate},
    services::members::MemberService,
};

pub struct CommitteeService;

impl CommitteeService {
    /// Committee, head and members in one transaction.
    pub async fn create(pool: &PgPool, form: &CommitteeForm) -> AppResult<CommitteeWithMembers> {
        let mut tx = pool.begin().await?;

        let committee = sqlx::query_as::<_, Committee>(
            "INSERT INTO committees (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(&form.name)
        .fetch_one(&mut *tx)
        .await?;

        let mut members = Vec::with_capacity(form.members.len() + 1);
        members.push(MemberService::insert(&mut tx, &form.head, Some(committee.id)).await?);
        for member in &form.members {
            members.push(MemberService::insert(&mut tx, member, Some(committee.id)).await?);
        }

        tx.commit().await?;
        tracing::info!(committee_id = committee.id, members = members.len(), "committee created");
        Ok(CommitteeWithMembers { committee, members })
    }

    pub async fn find(pool: &PgPool, id: i32) -> AppResult<Option<Committee>> {
        let committee = sqlx::query_as::<_, Committee>(
            "SELECT id, name, created_at FROM committees WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(committee)
    }

    /// Committees in scope (`None` = all) with their members.
    pub async fn list(pool: &PgPool, committee_id: Option<i32>) -> AppResult<Vec<CommitteeWithMembers>> {
        let committees = sqlx::query_as::<_, Committee>(
            "SELECT id, name, created_at FROM committees
             WHERE $1::INT IS NULL OR id = $1
             ORDER BY id",
        )
        .bind(committee_id)
        .fetch_all(pool)
        .await?;

        let ids: Vec<i32> = committees.iter().map(|c| c.id).collect();
        let mut by_committee: HashMap<i32, Vec<_>> = HashMap::new();
        for member in MemberService::in_committees(pool, &ids).await? {
            if let Some(id) = member.committee_id {
                by_committee.entry(id).or_default().push(member);
            }
        }

        Ok(committees
            .into_iter()
            .map(|committee| {
                let members = by_committee.remove(&committee.id).unwrap_or_default();
                CommitteeWithMembers { committee, members }
            })
            .collect())
    }

    /// Members go with the committee; families, subjects and projects must be
    /// moved or deleted first (the foreign keys restrict).
    pub async fn delete(pool: &PgPool, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM committees WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict(
                    "لا يمكن حذف اللجنة لوجود عائلات أو مواد أو مشاريع مرتبطة بها".into(),
                ),
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("اللجنة غير موجودة"));
        }
        tracing::info!(committee_id = id, "committee deleted");
        Ok(())
    }

    /// Children in scope, flagged when already linked to the project.
    pub async fn orphan_candidates(
        pool: &PgPool,
        committee_id: Option<i32>,
        project_id: i32,
    ) -> AppResult<Vec<JoinCandidate>> {
        let rows = sqlx::query_as::<_, JoinCandidate>(
            "SELECT c.id, c.full_name AS name,
                    EXISTS (SELECT 1 FROM project_orphans po
                            WHERE po.child_id = c.id AND po.project_id = $2) AS joined
             FROM children c
             WHERE $1::INT IS NULL OR c.committee_id = $1
             ORDER BY c.full_name",
        )
        .bind(committee_id)
        .bind(project_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Families in scope, named by their widow.
    pub async fn family_candidates(
        pool: &PgPool,
        committee_id: Option<i32>,
        project_id: i32,
    ) -> AppResult<Vec<JoinCandidate>> {
        let rows = sqlx::query_as::<_, JoinCandidate>(
            "SELECT f.id, w.widows_name AS name,
                    EXISTS (SELECT 1 FROM project_families pf
                            WHERE pf.family_id = f.id AND pf.project_id = $2) AS joined
             FROM families f
             JOIN widows w ON w.family_id = f.id
             WHERE $1::INT IS NULL OR f.committee_id = $1
             ORDER BY w.widows_name",
        )
        .bind(committee_id)
        .bind(project_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}
