//! 스테이징된 Parquet 정제.
//!
//! `raw/` 객체를 읽어 중복 제거/필터를 적용한 뒤 같은 경로의 `cleaned/` 아래에 씁니다.
//! 객체 하나의 실패는 기록 후 건너뜁니다.

use polars::prelude::DataFrame;
use stock_data::{
    dedupe, decode_parquet, encode_frame, filter_officers, filter_shareholders, CleanCounts,
    StagingStore,
};

use crate::error_log::ErrorLog;
use crate::CollectorConfig;

const RAW_PREFIX: &str = "raw/";
const CLEANED_PREFIX: &str = "cleaned/";

/// 정제 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub source: String,
    pub target: String,
    pub counts: CleanCounts,
}

impl CleanReport {
    pub fn log_summary(&self) {
        tracing::info!(
            source = %self.source,
            target = %self.target,
            original = self.counts.original,
            cleaned = self.counts.cleaned,
            removed = self.counts.removed(),
            "정제 완료"
        );
    }
}

/// `raw/...` → `cleaned/...`
pub fn cleaned_path(raw: &str) -> String {
    match raw.strip_prefix(RAW_PREFIX) {
        Some(rest) => format!("{}{}", CLEANED_PREFIX, rest),
        None => format!("{}{}", CLEANED_PREFIX, raw),
    }
}

async fn clean_object<F>(
    store: &StagingStore,
    source: &str,
    transform: F,
) -> stock_data::Result<CleanReport>
where
    F: Fn(&DataFrame) -> stock_data::Result<DataFrame>,
{
    let bytes = store.download(source).await?;
    let before = decode_parquet(&bytes)?;
    let mut after = transform(&before)?;
    let counts = CleanCounts::between(&before, &after);

    let target = cleaned_path(source);
    store.upload(encode_frame(&mut after)?, &target).await?;

    Ok(CleanReport {
        source: source.to_string(),
        target,
        counts,
    })
}

async fn clean_one<F>(
    store: &StagingStore,
    source: &str,
    log: &dyn ErrorLog,
    transform: F,
) -> Option<CleanReport>
where
    F: Fn(&DataFrame) -> stock_data::Result<DataFrame>,
{
    match clean_object(store, source, transform).await {
        Ok(report) => {
            report.log_summary();
            Some(report)
        }
        Err(e) => {
            log.record(&format!("Error cleaning {}: {}", source, e));
            None
        }
    }
}

/// 파티션된 배당 객체 전체의 중복 행 제거. `limit`은 처리할 객체 수입니다.
pub async fn clean_dividends(
    store: &StagingStore,
    limit: Option<usize>,
    log: &dyn ErrorLog,
) -> Vec<CleanReport> {
    let mut objects = match store.list("raw/dividends").await {
        Ok(objects) => objects,
        Err(e) => {
            log.record(&format!("Error listing raw/dividends: {}", e));
            return Vec::new();
        }
    };
    if let Some(limit) = limit {
        objects.truncate(limit);
    }
    tracing::info!(objects = objects.len(), "배당 정제 시작");

    let mut reports = Vec::with_capacity(objects.len());
    for source in &objects {
        if let Some(report) = clean_one(store, source, log, dedupe).await {
            reports.push(report);
        }
    }
    reports
}

/// 보유 비율 0 또는 기타 주주 행 제거
pub async fn clean_shareholders(store: &StagingStore, log: &dyn ErrorLog) -> Option<CleanReport> {
    clean_one(
        store,
        "raw/shareholders/shareholders.parquet",
        log,
        filter_shareholders,
    )
    .await
}

/// 이름 없는 임원 행 제거
pub async fn clean_officers(store: &StagingStore, log: &dyn ErrorLog) -> Option<CleanReport> {
    clean_one(store, "raw/officers/officers.parquet", log, filter_officers).await
}

/// 전체 정제
pub async fn clean_all(
    store: &StagingStore,
    config: &CollectorConfig,
    log: &dyn ErrorLog,
) -> Vec<CleanReport> {
    let limit = config.is_test.then_some(config.collect.clean_test_limit);
    let mut reports = clean_dividends(store, limit, log).await;
    reports.extend(clean_shareholders(store, log).await);
    reports.extend(clean_officers(store, log).await);
    reports
}
