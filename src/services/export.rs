//! Spreadsheet report of projects. The workbook is written to a temporary
//! file and streamed back; the file is removed once the body is dropped.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use chrono::{Local, NaiveDate};
use futures_util::Stream;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};
use sqlx::{FromRow, PgPool};
use tempfile::TempPath;
use tokio::io::AsyncReadExt;

use crate::{
    error::{AppError, AppResult},
    models::project::ProjectFilter,
    services::committees::CommitteeService,
};

pub const SHEET_NAME: &str = "المشاريع";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const HEADERS: [&str; 7] = [
    "اسم المشروع",
    "التاريخ",
    "ميزانية اللجنة",
    "ميزانية خارجية",
    "الميزانية الإجمالية",
    "عدد المستفيدين",
    "اللجنة",
];
const COLUMN_WIDTHS: [f64; 9] = [20.0, 30.0, 12.0, 15.0, 15.0, 15.0, 10.0, 15.0, 15.0];
const CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, FromRow)]
pub struct ProjectReportRow {
    pub name: String,
    pub project_date: NaiveDate,
    pub committee_budget: f64,
    pub external_budget: f64,
    pub total_budget: f64,
    pub total_beneficiaries: i32,
    pub committee_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectReport {
    pub committee_name: String,
    pub period: String,
    pub exported_on: NaiveDate,
    pub rows: Vec<ProjectReportRow>,
}

/// `2024/01/01 - 2024/12/31`, or "every period" without a range.
pub fn period_label(range: Option<(NaiveDate, NaiveDate)>) -> String {
    match range {
        Some((start, end)) => format!("{} - {}", start.format("%Y/%m/%d"), end.format("%Y/%m/%d")),
        None => "كل الفترات".to_string(),
    }
}

pub fn build_workbook(report: &ProjectReport, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    sheet.set_right_to_left(true);
    sheet.set_tab_color(Color::RGB(0x4167B8));

    let title = Format::new().set_bold().set_font_size(16).set_align(FormatAlign::Center);
    let header = Format::new().set_bold().set_align(FormatAlign::Center);
    let centered = Format::new().set_align(FormatAlign::Center);

    sheet.merge_range(0, 0, 0, 8, "تقرير المشاريع", &title)?;
    sheet.write_string(1, 0, "اللجنة:")?;
    sheet.write_string(1, 1, &report.committee_name)?;
    sheet.write_string(2, 0, "الفترة:")?;
    sheet.write_string(2, 1, &report.period)?;
    sheet.write_string(3, 0, "تاريخ التصدير:")?;
    sheet.write_string(3, 1, report.exported_on.format("%Y/%m/%d").to_string())?;

    for (col, label) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(5, col as u16, *label, &header)?;
    }

    for (i, row) in report.rows.iter().enumerate() {
        let r = 6 + i as u32;
        sheet.write_string_with_format(r, 0, &row.name, &centered)?;
        sheet.write_string_with_format(r, 1, row.project_date.format("%d/%m/%Y").to_string(), &centered)?;
        sheet.write_number_with_format(r, 2, row.committee_budget, &centered)?;
        sheet.write_number_with_format(r, 3, row.external_budget, &centered)?;
        sheet.write_number_with_format(r, 4, row.total_budget, &centered)?;
        sheet.write_number_with_format(r, 5, row.total_beneficiaries, &centered)?;
        sheet.write_string_with_format(r, 6, row.committee_name.as_deref().unwrap_or(""), &centered)?;
    }

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }

    workbook.save(path)
}

/// Chunks of the file; the temp file is deleted when the stream ends or is
/// dropped early.
pub fn file_stream(file: tokio::fs::File, guard: TempPath) -> impl Stream<Item = std::io::Result<Bytes>> {
    futures_util::stream::try_unfold((file, guard), |(mut file, guard)| async move {
        let mut buf = BytesMut::with_capacity(CHUNK);
        if file.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some((buf.freeze(), (file, guard))))
    })
}

pub struct ExportService;

impl ExportService {
    pub async fn project_rows(pool: &PgPool, filter: &ProjectFilter) -> AppResult<Vec<ProjectReportRow>> {
        let (start, end) = filter.date_range.unzip();
        let rows = sqlx::query_as::<_, ProjectReportRow>(
            "SELECT p.name, p.project_date, p.committee_budget, p.external_budget, p.total_budget,
                    p.total_beneficiaries, c.name AS committee_name
             FROM projects p
             LEFT JOIN committees c ON c.id = p.committee_id
             WHERE ($1::INT IS NULL OR p.committee_id = $1)
               AND ($2::DATE IS NULL OR p.project_date BETWEEN $2 AND $3)
             ORDER BY p.project_date DESC, p.id DESC",
        )
        .bind(filter.committee_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn project_report(pool: &PgPool, filter: &ProjectFilter) -> AppResult<ProjectReport> {
        let committee_name = match filter.committee_id {
            Some(id) => CommitteeService::find(pool, id)
                .await?
                .map(|c| c.name)
                .unwrap_or_else(|| "كل اللجان".to_string()),
            None => "كل اللجان".to_string(),
        };
        Ok(ProjectReport {
            committee_name,
            period: period_label(filter.date_range),
            exported_on: Local::now().date_naive(),
            rows: Self::project_rows(pool, filter).await?,
        })
    }

    /// Writes the workbook off the async runtime and reopens it for streaming.
    pub async fn write_report(report: ProjectReport) -> AppResult<(tokio::fs::File, TempPath)> {
        let path = tokio::task::spawn_blocking(move || -> anyhow::Result<TempPath> {
            let path = tempfile::Builder::new()
                .prefix("projects_report_")
                .suffix(".xlsx")
                .tempfile()?
                .into_temp_path();
            build_workbook(&report, &path)?;
            Ok(path)
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| AppError::Internal(e.into()))?;
        tracing::debug!(path = %path.display(), "project report written");
        Ok((file, path))
    }

    pub fn file_name() -> String {
        format!("projects_report_{}.xlsx", Local::now().format("%d%m%Y_%H%M%S"))
    }
}
