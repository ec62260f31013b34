use sqlx::{PgConnection, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::member::{Member, MemberUpdate, NewMember, TeacherOption},
};

const MEMBER_COLUMNS: &str = "cin, name, email, password_hash, role, committee_id,
    subscription_status, member_type, created_at, updated_at";

const PASSWORD_COST: u32 = 12;

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, PASSWORD_COST).map_err(|e| AppError::Internal(e.into()))
}

pub struct MemberService;

impl MemberService {
    pub async fn find(pool: &PgPool, cin: &str) -> AppResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE cin = $1"
        ))
        .bind(cin)
        .fetch_optional(pool)
        .await?;
        Ok(member)
    }

    /// Inserts a member; runs on a transaction connection when created with a committee.
    pub async fn insert(
        conn: &mut PgConnection,
        member: &NewMember,
        committee_id: Option<i32>,
    ) -> AppResult<Member> {
        let password_hash = hash_password(&member.password)?;
        let created = sqlx::query_as::<_, Member>(&format!(
            "INSERT INTO members (cin, name, email, password_hash, role, committee_id,
                                  subscription_status, member_type)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(&member.cin)
        .bind(&member.name)
        .bind(&member.email)
        .bind(password_hash)
        .bind(member.role.as_str())
        .bind(committee_id)
        .bind(member.subscription_status)
        .bind(&member.member_type)
        .fetch_one(conn)
        .await?;
        Ok(created)
    }

    pub async fn create(pool: &PgPool, member: &NewMember, committee_id: Option<i32>) -> AppResult<Member> {
        let mut conn = pool.acquire().await?;
        Self::insert(&mut conn, member, committee_id).await
    }

    pub async fn update(pool: &PgPool, cin: &str, update: &MemberUpdate) -> AppResult<Member> {
        let password_hash = update.password.as_deref().map(hash_password).transpose()?;
        sqlx::query_as::<_, Member>(&format!(
            "UPDATE members
             SET name                = $2,
                 email               = $3,
                 role                = $4,
                 committee_id        = COALESCE($5, committee_id),
                 member_type         = COALESCE($6, member_type),
                 subscription_status = COALESCE($7, subscription_status),
                 password_hash       = COALESCE($8, password_hash),
                 updated_at          = NOW()
             WHERE cin = $1
             RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(cin)
        .bind(&update.name)
        .bind(&update.email)
        .bind(update.role.as_str())
        .bind(update.committee_id)
        .bind(&update.member_type)
        .bind(update.subscription_status)
        .bind(password_hash)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("العضو غير موجود"))
    }

    pub async fn delete(pool: &PgPool, cin: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM members WHERE cin = $1")
            .bind(cin)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("العضو غير موجود"));
        }
        Ok(())
    }

    /// Members of the given committees, grouped by the caller.
    pub async fn in_committees(pool: &PgPool, committee_ids: &[i32]) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members
             WHERE committee_id = ANY($1)
             ORDER BY role, name"
        ))
        .bind(committee_ids)
        .fetch_all(pool)
        .await?;
        Ok(members)
    }

    /// Teachers of one category (`ORPHANTEACHER`, `WIDOWTEACHER`) visible in a scope.
    pub async fn teachers(
        pool: &PgPool,
        committee_id: Option<i32>,
        category: &str,
    ) -> AppResult<Vec<TeacherOption>> {
        let teachers = sqlx::query_as::<_, TeacherOption>(
            "SELECT cin, name FROM members
             WHERE ($1::INT IS NULL OR committee_id = $1) AND member_type = $2
             ORDER BY name",
        )
        .bind(committee_id)
        .bind(category.to_uppercase())
        .fetch_all(pool)
        .await?;
        Ok(teachers)
    }
}
