//! 배치 결과 스테이징 공통 로직.

use std::future::Future;

use stock_data::{
    decode_parquet, encode_parquet, frame_to_table, partition_by_year, CompanyRef, PartitionKey,
    RecordSink, StagingStore, Table,
};

use super::{JobReport, Pipeline};
use crate::collector::{BatchOutcome, BatchResult, Category};
use crate::config::StorageConfig;
use crate::error_log::ErrorLog;
use crate::Result;

/// 스테이징 대상
#[derive(Debug, Clone)]
pub enum StageTarget {
    /// 카테고리 전체를 하나의 객체로
    Single(String),
    /// (종목, 연도)별 객체로 분할
    Partitioned {
        name: String,
        date_column: &'static str,
    },
}

impl StageTarget {
    /// `raw/{name}/{name}.parquet`
    pub fn single(category: Category) -> Self {
        StageTarget::Single(format!("raw/{0}/{0}.parquet", category.name()))
    }

    pub fn partitioned(category: Category, date_column: &'static str) -> Self {
        StageTarget::Partitioned {
            name: category.name().to_string(),
            date_column,
        }
    }
}

/// 설정에 맞는 스테이징 스토어 생성. GCS 버킷이 로컬 디렉토리보다 우선하며,
/// 둘 다 없으면 `None`입니다.
pub fn open_store(storage: &StorageConfig) -> Result<Option<StagingStore>> {
    if let Some(bucket) = &storage.gcs_bucket {
        let store = StagingStore::google_cloud(bucket, storage.gcs_credentials.as_deref())?;
        return Ok(Some(store));
    }
    match &storage.local_dir {
        Some(dir) => Ok(Some(StagingStore::local(dir)?)),
        None => Ok(None),
    }
}

/// `raw/{name}/{symbol}/{name}_{year}.parquet`
pub fn partition_path(name: &str, key: &PartitionKey) -> String {
    format!("raw/{0}/{1}/{0}_{2}.parquet", name, key.symbol, key.year)
}

pub fn symbols(companies: &[CompanyRef]) -> Vec<String> {
    companies.iter().map(|c| c.symbol.clone()).collect()
}

/// 테이블 하나를 Parquet으로 업로드. 실패는 기록 후 false를 반환합니다.
pub async fn stage_table(
    store: &StagingStore,
    table: &Table,
    path: &str,
    log: &dyn ErrorLog,
) -> bool {
    let result = match encode_parquet(table) {
        Ok(bytes) => store.upload(bytes, path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            tracing::info!(path = %path, rows = table.len(), store = %store.name(), "스테이징 완료");
            true
        }
        Err(e) => {
            log.record(&format!("Error uploading {}: {}", path, e));
            false
        }
    }
}

/// 스테이징된 Parquet 객체를 테이블로 읽기
pub async fn read_staged(store: &StagingStore, path: &str) -> stock_data::Result<Table> {
    let bytes = store.download(path).await?;
    frame_to_table(&decode_parquet(&bytes)?)
}

/// 배치 결과를 대상 형태로 스테이징
pub async fn stage_batch(
    store: &StagingStore,
    batch: &BatchResult,
    target: &StageTarget,
    log: &dyn ErrorLog,
    report: &mut JobReport,
) {
    if batch.outcome() != BatchOutcome::Produced {
        return;
    }

    match target {
        StageTarget::Single(path) => {
            if stage_table(store, &batch.table, path, log).await {
                report.written.push(path.clone());
            } else {
                report.write_failures += 1;
            }
        }
        StageTarget::Partitioned { name, date_column } => {
            let partitioned = match partition_by_year(&batch.table, date_column) {
                Ok(partitioned) => partitioned,
                Err(e) => {
                    log.record(&format!("Error partitioning {}: {}", name, e));
                    report.write_failures += 1;
                    return;
                }
            };
            report.dropped_rows += partitioned.dropped;

            for (key, table) in &partitioned.partitions {
                let path = partition_path(name, key);
                if stage_table(store, table, &path, log).await {
                    report.written.push(path);
                } else {
                    report.write_failures += 1;
                }
            }
        }
    }
}

/// 카테고리 하나를 수집하고 출력 모드에 맞게 기록.
///
/// 스토리지 모드에서는 배치가 끝난 뒤 스테이징하고,
/// 로컬 모드에서는 `local_sink`에 종목별로 즉시 기록합니다.
pub async fn collect_and_stage<F, Fut>(
    pipeline: &Pipeline<'_>,
    category: Category,
    companies: &[CompanyRef],
    fetch: F,
    target: StageTarget,
    mut local_sink: Box<dyn RecordSink>,
) -> JobReport
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = stock_data::Result<Table>>,
{
    let identifiers = symbols(companies);
    let limit = pipeline.limit(category);
    let collector = pipeline.collector();

    let batch = match pipeline.store {
        Some(_) => {
            collector
                .collect(category, &identifiers, limit, fetch, None)
                .await
        }
        None => {
            collector
                .collect(category, &identifiers, limit, fetch, Some(local_sink.as_mut()))
                .await
        }
    };

    let mut report = JobReport::from_batch(&batch);
    match pipeline.store {
        Some(store) => stage_batch(store, &batch, &target, pipeline.log, &mut report).await,
        None => report.written.extend(batch.succeeded.iter().cloned()),
    }
    report.log_summary();
    report
}
