//! 상장 종목 목록.
//!
//! 목록을 새로 조회해 거래소/증권 종류로 필터링한 뒤 스테이징하고,
//! 다른 카테고리는 캐시된 목록을 읽어 종목 코드를 얻습니다.

use std::time::Instant;

use serde_json::Value;
use stock_data::{cell_text, read_csv, write_csv, CompanyRef, Table};

use super::staging::{read_staged, stage_table};
use super::{JobReport, Pipeline};
use crate::collector::{BatchOutcome, Category};
use crate::{CollectionStats, Result};

/// 스테이징된 상장 목록 경로
pub const COMPANIES_PATH: &str = "raw/companies/companies.parquet";

/// 저장하지 않는 컬럼
const DROPPED_COLUMNS: [&str; 2] = ["organ_short_name", "organ_name"];

/// 거래소와 증권 종류가 일치하는 행만 남기고 불필요한 컬럼 제거
pub fn filter_listing(mut table: Table, exchange: &str, security_type: &str) -> Table {
    fn matches(columns: &[String], row: &[Value], column: &str, expected: &str) -> bool {
        columns
            .iter()
            .position(|c| c == column)
            .map(|i| cell_text(&row[i]).eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }

    table.retain_rows(|columns, row| {
        matches(columns, row, "exchange", exchange) && matches(columns, row, "type", security_type)
    });
    table.drop_columns(&DROPPED_COLUMNS);
    table
}

/// 상장 목록을 새로 조회해 기록.
///
/// 조회가 끝내 실패하면 빈 목록과 함께 실패 결과를 반환합니다.
pub async fn refresh_companies(pipeline: &Pipeline<'_>) -> Result<(Vec<CompanyRef>, JobReport)> {
    let started = Instant::now();
    let category = Category::Companies;
    let mut stats = CollectionStats::new();
    stats.total = 1;

    let listing = pipeline
        .retry
        .retry(&category.fetch_name(), pipeline.log, |_| pipeline.provider.listing())
        .await;

    let table = match listing {
        Ok(table) => filter_listing(
            table,
            &pipeline.config.collect.listing_exchange,
            &pipeline.config.collect.listing_type,
        ),
        Err(e) => {
            pipeline
                .log
                .record(&format!("Error fetching {}: {}", category, e));
            tracing::error!(error = %e, "상장 종목 목록 조회 실패");
            stats.errors = 1;
            stats.elapsed = started.elapsed();
            let report = JobReport::new(category.name(), BatchOutcome::AllFailed, stats);
            report.log_summary();
            return Ok((Vec::new(), report));
        }
    };

    let companies = if table.is_empty() {
        Vec::new()
    } else {
        CompanyRef::from_table(&table)?
    };

    let outcome = if table.is_empty() {
        stats.empty = 1;
        BatchOutcome::NoData
    } else {
        stats.success = 1;
        stats.total_rows = table.len();
        BatchOutcome::Produced
    };
    stats.elapsed = started.elapsed();
    let mut report = JobReport::new(category.name(), outcome, stats);

    if outcome == BatchOutcome::Produced {
        match pipeline.store {
            Some(store) => {
                if stage_table(store, &table, COMPANIES_PATH, pipeline.log).await {
                    report.written.push(COMPANIES_PATH.to_string());
                } else {
                    report.write_failures += 1;
                }
            }
            None => {
                let path = &pipeline.config.output.companies_file;
                match write_csv(&table, path) {
                    Ok(_) => report.written.push(path.display().to_string()),
                    Err(e) => {
                        pipeline.log.record(&format!(
                            "Error writing {}: {}",
                            path.display(),
                            e
                        ));
                        report.write_failures += 1;
                    }
                }
            }
        }
    }

    report.log_summary();
    Ok((companies, report))
}

/// 캐시된 상장 목록 읽기. 없거나 읽을 수 없으면 새로 조회합니다.
pub async fn load_companies(pipeline: &Pipeline<'_>) -> Result<Vec<CompanyRef>> {
    let cached = match pipeline.store {
        Some(store) => read_staged(store, COMPANIES_PATH).await,
        None => read_csv(&pipeline.config.output.companies_file),
    };

    match cached.and_then(|table| CompanyRef::from_table(&table)) {
        Ok(companies) if !companies.is_empty() => {
            tracing::info!(count = companies.len(), "캐시된 종목 목록 사용");
            return Ok(companies);
        }
        Ok(_) => tracing::info!("캐시된 종목 목록이 비어 있어 새로 조회합니다"),
        Err(e) => tracing::warn!(error = %e, "캐시된 종목 목록을 읽을 수 없어 새로 조회합니다"),
    }

    let (companies, _) = refresh_companies(pipeline).await?;
    if companies.is_empty() {
        tracing::warn!("수집할 종목이 없습니다");
    }
    Ok(companies)
}
