//! 일별 시세. 거래일(`time`) 기준으로 (종목, 연도)별 스테이징합니다.

use chrono::{Local, NaiveDate};
use stock_data::{CompanyRef, CsvAppendSink};

use super::staging::{collect_and_stage, StageTarget};
use super::{JobReport, Pipeline};
use crate::collector::Category;
use crate::config::CollectConfig;
use crate::error::CollectorError;
use crate::Result;

/// 조회 기간 결정.
///
/// 명령행 값 → 설정 값 → (종료일만) 실행일 순으로 사용합니다.
/// 종료일은 배치 시작 시 한 번만 계산되어 모든 종목에 같은 값이 쓰입니다.
pub fn determine_date_range(
    collect: &CollectConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate)> {
    let start = start.unwrap_or(collect.quote_start_date);
    let end = end
        .or(collect.quote_end_date)
        .unwrap_or_else(|| Local::now().date_naive());

    if end < start {
        return Err(CollectorError::Config(format!(
            "시세 종료일({})이 시작일({})보다 빠릅니다",
            end, start
        )));
    }
    Ok((start, end))
}

pub async fn collect_stock_quotes(
    pipeline: &Pipeline<'_>,
    companies: &[CompanyRef],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<JobReport> {
    let (start, end) = determine_date_range(&pipeline.config.collect, start, end)?;
    tracing::info!(start = %start, end = %end, "시세 조회 기간");

    let provider = pipeline.provider;
    Ok(collect_and_stage(
        pipeline,
        Category::StockQuote,
        companies,
        |symbol| async move { provider.quotes(&symbol, start, end).await },
        StageTarget::partitioned(Category::StockQuote, "time"),
        Box::new(CsvAppendSink::new(&pipeline.config.output.stock_quote_file)),
    )
    .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_log::MemoryErrorLog;
    use crate::modules::staging::read_staged;
    use crate::testing::{companies, config, FakeProvider};
    use stock_data::StagingStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_precedence() {
        let cfg = config(&[("OUTPUT_MODE", "local"), ("QUOTE_END_DATE", "2023-12-31")]);

        let (start, end) = determine_date_range(&cfg.collect, None, None).unwrap();
        assert_eq!(start, date(2020, 1, 1));
        assert_eq!(end, date(2023, 12, 31));

        let (start, end) =
            determine_date_range(&cfg.collect, Some(date(2022, 1, 1)), Some(date(2022, 6, 30)))
                .unwrap();
        assert_eq!((start, end), (date(2022, 1, 1), date(2022, 6, 30)));

        assert!(determine_date_range(&cfg.collect, Some(date(2024, 1, 1)), None).is_err());
    }

    #[test]
    fn test_end_date_defaults_to_today() {
        let cfg = config(&[("OUTPUT_MODE", "local")]);
        let (_, end) = determine_date_range(&cfg.collect, None, None).unwrap();
        assert_eq!(end, Local::now().date_naive());
    }

    #[tokio::test]
    async fn test_quotes_limited_and_partitioned() {
        let config = config(&[("GCS_BUCKET", "unused"), ("QUOTE_END_DATE", "2023-12-31")]);
        let provider = FakeProvider::new();
        let store = StagingStore::in_memory();
        let log = MemoryErrorLog::new();
        let pipeline = Pipeline::new(&config, &provider, Some(&store), &log);

        let report = collect_stock_quotes(
            &pipeline,
            &companies(&["ACB", "FPT", "HPG", "VNM", "VCB"]),
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.stats.skipped, 2);
        assert_eq!(provider.calls_for("quotes"), 3);
        // 2024년 시세는 종료일 밖이므로 조회되지 않음
        assert_eq!(
            store.list("raw/stock_quote").await.unwrap(),
            vec![
                "raw/stock_quote/ACB/stock_quote_2023.parquet",
                "raw/stock_quote/FPT/stock_quote_2023.parquet",
                "raw/stock_quote/HPG/stock_quote_2023.parquet",
            ]
        );

        let staged = read_staged(&store, "raw/stock_quote/FPT/stock_quote_2023.parquet")
            .await
            .unwrap();
        assert_eq!(staged.len(), 2);
    }
}
