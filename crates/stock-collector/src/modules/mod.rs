//! 카테고리별 수집/정제 작업 모듈.

pub mod cleaner;
pub mod companies;
pub mod company_info;
pub mod dividends;
pub mod financial;
pub mod officers;
pub mod shareholders;
pub mod staging;
pub mod stock_quote;

use stock_data::{MarketDataProvider, StagingStore};

use crate::collector::{BatchOutcome, BatchResult, Collector, Category};
use crate::error_log::ErrorLog;
use crate::retry::RetryPolicy;
use crate::{CollectionStats, CollectorConfig, Result};

pub use cleaner::{clean_all, clean_dividends, clean_officers, clean_shareholders, CleanReport};
pub use companies::{load_companies, refresh_companies};
pub use company_info::collect_company_info;
pub use dividends::collect_dividends;
pub use financial::collect_financial;
pub use officers::collect_officers;
pub use shareholders::collect_shareholders;
pub use staging::open_store;
pub use stock_quote::collect_stock_quotes;

/// 작업 실행에 필요한 공유 컨텍스트.
///
/// `store`가 있으면 Parquet을 스테이징하고, 없으면 로컬 파일에 기록합니다.
pub struct Pipeline<'a> {
    pub config: &'a CollectorConfig,
    pub provider: &'a dyn MarketDataProvider,
    pub store: Option<&'a StagingStore>,
    pub log: &'a dyn ErrorLog,
    pub retry: RetryPolicy,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a CollectorConfig,
        provider: &'a dyn MarketDataProvider,
        store: Option<&'a StagingStore>,
        log: &'a dyn ErrorLog,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            log,
            retry: config.retry.policy(),
        }
    }

    /// 재시도 정책 교체
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn collector(&self) -> Collector<'_> {
        Collector::new(&self.retry, self.log, self.config.collect.request_delay())
    }

    /// 카테고리의 테스트 모드 제한
    pub fn limit(&self, category: Category) -> Option<usize> {
        self.config.test_limit(category)
    }
}

/// 카테고리 작업 결과
#[derive(Debug, Clone)]
pub struct JobReport {
    pub category: String,
    pub outcome: BatchOutcome,
    pub stats: CollectionStats,
    /// 기록 대상: 스테이징 객체 경로, 로컬 파일 경로 또는 (로컬 싱크의 경우) 기록된 종목
    pub written: Vec<String>,
    /// 업로드/기록 실패 수
    pub write_failures: usize,
    /// 날짜를 해석할 수 없어 파티션에서 제외된 행 수
    pub dropped_rows: usize,
}

impl JobReport {
    pub fn new(category: impl Into<String>, outcome: BatchOutcome, stats: CollectionStats) -> Self {
        Self {
            category: category.into(),
            outcome,
            stats,
            written: Vec::new(),
            write_failures: 0,
            dropped_rows: 0,
        }
    }

    pub fn from_batch(batch: &BatchResult) -> Self {
        Self::new(batch.category.name(), batch.outcome(), batch.stats.clone())
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        self.stats.log_summary(&self.category);
        match self.outcome {
            BatchOutcome::Produced => tracing::info!(
                category = %self.category,
                written = self.written.len(),
                write_failures = self.write_failures,
                dropped_rows = self.dropped_rows,
                "기록 완료"
            ),
            BatchOutcome::NoData => {
                tracing::info!(category = %self.category, "조회 성공, 기록할 데이터 없음")
            }
            BatchOutcome::AllFailed => {
                tracing::warn!(category = %self.category, "모든 종목 조회 실패")
            }
            BatchOutcome::NoInput => {
                tracing::warn!(category = %self.category, "입력 종목 없음")
            }
        }
    }
}

/// 전체 워크플로우: 상장 목록 → 각 카테고리 → 재무제표
pub async fn run_all(pipeline: &Pipeline<'_>) -> Result<Vec<JobReport>> {
    let mut reports = Vec::new();

    tracing::info!("Step 1/7: 상장 종목 목록");
    let (companies, report) = refresh_companies(pipeline).await?;
    reports.push(report);

    tracing::info!("Step 2/7: 기업 정보");
    reports.push(collect_company_info(pipeline, &companies).await?);

    tracing::info!("Step 3/7: 임원");
    reports.push(collect_officers(pipeline, &companies).await?);

    tracing::info!("Step 4/7: 주주");
    reports.push(collect_shareholders(pipeline, &companies).await?);

    tracing::info!("Step 5/7: 배당");
    reports.push(collect_dividends(pipeline, &companies).await?);

    tracing::info!("Step 6/7: 시세");
    reports.push(collect_stock_quotes(pipeline, &companies, None, None).await?);

    tracing::info!("Step 7/7: 재무제표");
    reports.extend(collect_financial(pipeline, &companies, None).await?);

    Ok(reports)
}
