use std::collections::HashMap;

use sqlx::{FromRow, PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::{
        committee::Committee,
        family::Child,
        project::{
            FamilyBeneficiary, Project, ProjectDetail, ProjectFilter, ProjectFilterRequest,
            ProjectForm, ProjectStats,
        },
    },
    policy::CommitteeScope,
    services::ensure_in_committee,
    validation::{coerce_id, parse_date},
};

const PROJECT_COLUMNS: &str = "id, name, description, project_date, committee_budget, external_budget,
    total_budget, for_orphans, total_beneficiaries, committee_id, created_at";

#[derive(FromRow)]
struct LinkedChild {
    project_id: i32,
    #[sqlx(flatten)]
    child: Child,
}

#[derive(FromRow)]
struct LinkedFamily {
    project_id: i32,
    #[sqlx(flatten)]
    family: FamilyBeneficiary,
}

/// Turns the export/statistics request into a filter. `"all"` or a missing
/// committee means every committee, narrowed to the actor's own committee
/// when the actor is scoped. The date range applies only when both ends parse.
pub fn filter_from_request(req: &ProjectFilterRequest, scope: CommitteeScope) -> ProjectFilter {
    let requested = req
        .committee_id
        .as_ref()
        .filter(|v| v.as_str() != Some("all"))
        .and_then(coerce_id);
    let committee_id = match scope {
        CommitteeScope::All => requested,
        CommitteeScope::Committee(own) => Some(own),
    };
    let start = req.start_date.as_deref().and_then(parse_date);
    let end = req.end_date.as_deref().and_then(parse_date);
    ProjectFilter {
        committee_id,
        date_range: start.zip(end),
    }
}

pub struct ProjectService;

impl ProjectService {
    /// Beneficiaries of a committee project must belong to that committee.
    async fn link_beneficiaries(
        conn: &mut PgConnection,
        project_id: i32,
        committee_id: Option<i32>,
        for_orphans: bool,
        ids: &[i32],
    ) -> AppResult<()> {
        let (table, column, source) = if for_orphans {
            ("project_orphans", "child_id", "children")
        } else {
            ("project_families", "family_id", "families")
        };
        ensure_in_committee(conn, source, ids, committee_id, "المستفيدون غير موجودين في لجنة المشروع").await?;
        sqlx::query(&format!("DELETE FROM {table} WHERE project_id = $1"))
            .bind(project_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(&format!(
            "INSERT INTO {table} (project_id, {column})
             SELECT $1, b FROM UNNEST($2::INT[]) AS b
             ON CONFLICT DO NOTHING"
        ))
        .bind(project_id)
        .bind(ids)
        .execute(&mut *conn)
        .await?;
        sqlx::query(&format!(
            "UPDATE projects SET total_beneficiaries =
                 (SELECT COUNT(*) FROM {table} WHERE project_id = $1)
             WHERE id = $1"
        ))
        .bind(project_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// The stored total is always recomputed from its two parts.
    pub async fn create(pool: &PgPool, committee_id: Option<i32>, form: &ProjectForm) -> AppResult<ProjectDetail> {
        let for_orphans = form.for_orphans.unwrap_or(false);
        let mut tx = pool.begin().await?;
        let id = sqlx::query_scalar::<_, i32>(
            "INSERT INTO projects (name, description, project_date, committee_budget, external_budget,
                                   total_budget, for_orphans, committee_id)
             VALUES ($1, $2, $3, $4, $5, $4 + $5, $6, $7)
             RETURNING id",
        )
        .bind(&form.name)
        .bind(&form.description)
        .bind(form.date)
        .bind(form.budget.committee)
        .bind(form.budget.external)
        .bind(for_orphans)
        .bind(committee_id)
        .fetch_one(&mut *tx)
        .await?;
        Self::link_beneficiaries(&mut tx, id, committee_id, for_orphans, &form.beneficiaries).await?;
        tx.commit().await?;

        tracing::info!(project_id = id, ?committee_id, beneficiaries = form.beneficiaries.len(), "project created");
        Self::require_detail(pool, id).await
    }

    /// Beneficiaries are replaced only when a non-empty list is sent; the
    /// beneficiary kind never changes after creation.
    pub async fn update(
        pool: &PgPool,
        existing: &Project,
        actor_committee: Option<i32>,
        form: &ProjectForm,
    ) -> AppResult<ProjectDetail> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE projects
             SET name = $2, description = $3, project_date = $4, committee_budget = $5,
                 external_budget = $6, total_budget = $5 + $6,
                 committee_id = COALESCE($7, committee_id)
             WHERE id = $1",
        )
        .bind(existing.id)
        .bind(&form.name)
        .bind(&form.description)
        .bind(form.date)
        .bind(form.budget.committee)
        .bind(form.budget.external)
        .bind(actor_committee)
        .execute(&mut *tx)
        .await?;
        if !form.beneficiaries.is_empty() {
            let committee_id = actor_committee.or(existing.committee_id);
            Self::link_beneficiaries(&mut tx, existing.id, committee_id, existing.for_orphans, &form.beneficiaries)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(project_id = existing.id, "project updated");
        Self::require_detail(pool, existing.id).await
    }

    pub async fn find(pool: &PgPool, id: i32) -> AppResult<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(project)
    }

    pub async fn detail(pool: &PgPool, id: i32) -> AppResult<Option<ProjectDetail>> {
        let Some(project) = Self::find(pool, id).await? else {
            return Ok(None);
        };
        Ok(Self::attach(pool, vec![project]).await?.pop())
    }

    async fn require_detail(pool: &PgPool, id: i32) -> AppResult<ProjectDetail> {
        Self::detail(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("المشروع غير موجود"))
    }

    /// Projects of one committee (or all) with committee and beneficiaries.
    pub async fn list(pool: &PgPool, committee_id: Option<i32>) -> AppResult<Vec<ProjectDetail>> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE $1::INT IS NULL OR committee_id = $1
             ORDER BY project_date DESC, id DESC"
        ))
        .bind(committee_id)
        .fetch_all(pool)
        .await?;
        Self::attach(pool, projects).await
    }

    async fn attach(pool: &PgPool, projects: Vec<Project>) -> AppResult<Vec<ProjectDetail>> {
        let ids: Vec<i32> = projects.iter().map(|p| p.id).collect();
        let committee_ids: Vec<i32> = projects.iter().filter_map(|p| p.committee_id).collect();

        let committees: HashMap<i32, Committee> = sqlx::query_as::<_, Committee>(
            "SELECT id, name, created_at FROM committees WHERE id = ANY($1)",
        )
        .bind(&committee_ids)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

        let mut orphans: HashMap<i32, Vec<Child>> = HashMap::new();
        for row in sqlx::query_as::<_, LinkedChild>(
            "SELECT po.project_id, c.id, c.family_id, c.committee_id, c.full_name, c.date_of_birth,
                    c.gender, c.school_level, c.avatar
             FROM project_orphans po
             JOIN children c ON c.id = po.child_id
             WHERE po.project_id = ANY($1)
             ORDER BY c.full_name",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?
        {
            orphans.entry(row.project_id).or_default().push(row.child);
        }

        let mut families: HashMap<i32, Vec<FamilyBeneficiary>> = HashMap::new();
        for row in sqlx::query_as::<_, LinkedFamily>(
            "SELECT pf.project_id, f.id, f.orphans_last_name, f.registration_date, f.committee_id,
                    COALESCE(w.widows_name, '') AS widows_name
             FROM project_families pf
             JOIN families f ON f.id = pf.family_id
             LEFT JOIN widows w ON w.family_id = f.id
             WHERE pf.project_id = ANY($1)
             ORDER BY f.orphans_last_name",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?
        {
            families.entry(row.project_id).or_default().push(row.family);
        }

        Ok(projects
            .into_iter()
            .map(|project| ProjectDetail {
                committee: project.committee_id.and_then(|id| committees.get(&id).cloned()),
                orphan_beneficiaries: orphans.remove(&project.id).unwrap_or_default(),
                family_beneficiaries: families.remove(&project.id).unwrap_or_default(),
                project,
            })
            .collect())
    }

    pub async fn count(pool: &PgPool, committee_id: Option<i32>) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM projects WHERE $1::INT IS NULL OR committee_id = $1",
        )
        .bind(committee_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    pub async fn stats(pool: &PgPool, filter: &ProjectFilter) -> AppResult<ProjectStats> {
        let (start, end) = filter.date_range.unzip();
        let stats = sqlx::query_as::<_, ProjectStats>(
            "SELECT COUNT(*) AS project_count,
                    COALESCE(SUM(total_budget), 0)::FLOAT8 AS total_budget,
                    COALESCE(SUM(committee_budget), 0)::FLOAT8 AS committee_budget,
                    COALESCE(SUM(external_budget), 0)::FLOAT8 AS external_budget,
                    COALESCE(SUM(total_beneficiaries), 0)::BIGINT AS total_beneficiaries,
                    COUNT(*) FILTER (WHERE for_orphans) AS orphan_projects_count
             FROM projects
             WHERE ($1::INT IS NULL OR committee_id = $1)
               AND ($2::DATE IS NULL OR project_date BETWEEN $2 AND $3)",
        )
        .bind(filter.committee_id)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;
        Ok(stats)
    }

    /// Children a project in this scope may benefit.
    pub async fn orphan_options(pool: &PgPool, committee_id: Option<i32>) -> AppResult<Vec<Child>> {
        let children = sqlx::query_as::<_, Child>(
            "SELECT id, family_id, committee_id, full_name, date_of_birth, gender, school_level, avatar
             FROM children
             WHERE $1::INT IS NULL OR committee_id = $1
             ORDER BY full_name",
        )
        .bind(committee_id)
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    pub async fn family_options(pool: &PgPool, committee_id: Option<i32>) -> AppResult<Vec<FamilyBeneficiary>> {
        let families = sqlx::query_as::<_, FamilyBeneficiary>(
            "SELECT f.id, f.orphans_last_name, f.registration_date, f.committee_id,
                    COALESCE(w.widows_name, '') AS widows_name
             FROM families f
             LEFT JOIN widows w ON w.family_id = f.id
             WHERE $1::INT IS NULL OR f.committee_id = $1
             ORDER BY f.orphans_last_name",
        )
        .bind(committee_id)
        .fetch_all(pool)
        .await?;
        Ok(families)
    }
}
