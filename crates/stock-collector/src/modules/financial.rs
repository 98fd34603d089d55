//! 재무제표 (손익계산서, 재무상태표, 현금흐름표, 재무비율).
//!
//! 종목마다 네 가지 재무제표를 동시에 조회하고, 종류별로 나누어
//! 보고 연도(`year_report`) 기준 (종목, 연도)별 스테이징합니다.

use stock_data::{write_or_append_csv, CompanyRef, ReportPeriod};

use super::staging::{stage_batch, symbols, StageTarget};
use super::{JobReport, Pipeline};
use crate::collector::{BatchOutcome, Category};
use crate::Result;

/// 재무제표 수집. `period`가 없으면 설정 값을 사용합니다.
pub async fn collect_financial(
    pipeline: &Pipeline<'_>,
    companies: &[CompanyRef],
    period: Option<ReportPeriod>,
) -> Result<Vec<JobReport>> {
    let period = period.unwrap_or(pipeline.config.collect.financial_period);
    let identifiers = symbols(companies);
    // 네 종류 모두 같은 종목 집합을 사용 (TEST_LIMIT_FINANCIAL)
    let limit = pipeline.limit(Category::Financial(stock_data::StatementKind::IncomeStatement));
    tracing::info!(period = %period, "재무제표 수집 시작");

    let provider = pipeline.provider;
    let collector = pipeline.collector();
    let batch = collector
        .collect_financials(
            &identifiers,
            limit,
            pipeline.config.collect.statement_workers,
            |symbol, kind| async move {
                provider.financial_statement(&symbol, period, kind).await
            },
        )
        .await;

    let mut reports = Vec::new();
    for result in batch.into_batches() {
        let mut report = JobReport::from_batch(&result);
        match pipeline.store {
            Some(store) => {
                let target = StageTarget::partitioned(result.category, "year_report");
                stage_batch(store, &result, &target, pipeline.log, &mut report).await;
            }
            None if report.outcome == BatchOutcome::Produced => {
                let path = pipeline.config.output.financial_file(result.category.name());
                match write_or_append_csv(&result.table, &path) {
                    Ok(_) => report.written.push(path.display().to_string()),
                    Err(e) => {
                        pipeline
                            .log
                            .record(&format!("Error writing {}: {}", path.display(), e));
                        report.write_failures += 1;
                    }
                }
            }
            None => {}
        }
        report.log_summary();
        reports.push(report);
    }
    Ok(reports)
}
