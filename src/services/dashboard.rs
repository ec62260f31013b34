use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistic {
    pub count: i64,
    pub label: &'static str,
}

#[derive(Debug, Default, FromRow)]
pub struct Counts {
    pub families: i64,
    pub children: i64,
    pub projects: i64,
}

impl Counts {
    pub fn labelled(&self) -> Vec<Statistic> {
        vec![
            Statistic { count: self.families, label: "أسرة" },
            Statistic { count: self.children, label: "طفل" },
            Statistic { count: self.projects, label: "مشروع" },
        ]
    }
}

pub struct DashboardService;

impl DashboardService {
    pub async fn counts(pool: &PgPool, committee_id: Option<i32>) -> AppResult<Counts> {
        let counts = sqlx::query_as::<_, Counts>(
            "SELECT
                (SELECT COUNT(*) FROM families WHERE $1::INT IS NULL OR committee_id = $1) AS families,
                (SELECT COUNT(*) FROM children WHERE $1::INT IS NULL OR committee_id = $1) AS children,
                (SELECT COUNT(*) FROM projects WHERE $1::INT IS NULL OR committee_id = $1) AS projects",
        )
        .bind(committee_id)
        .fetch_one(pool)
        .await?;
        Ok(counts)
    }
}
