//! 범용 배치 수집기.
//!
//! 모든 카테고리가 같은 엔진을 사용합니다:
//! 종목 목록 → (테스트 모드 제한) → 종목별 재시도 조회 → 식별자 태깅 →
//! 싱크 기록 → 누적. 한 종목의 실패는 기록 후 건너뛰며 배치를 중단하지 않습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use stock_data::{RecordSink, StatementKind, Table};

use crate::error_log::ErrorLog;
use crate::retry::RetryPolicy;
use crate::CollectionStats;

/// 수집 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Companies,
    CompanyInfo,
    Officers,
    Shareholders,
    Dividends,
    StockQuote,
    Financial(StatementKind),
}

impl Category {
    /// 전체 카테고리 (재무제표는 종류별)
    pub fn all() -> Vec<Category> {
        let mut all = vec![
            Category::Companies,
            Category::CompanyInfo,
            Category::Officers,
            Category::Shareholders,
            Category::Dividends,
            Category::StockQuote,
        ];
        all.extend(StatementKind::ALL.into_iter().map(Category::Financial));
        all
    }

    /// 경로, 로그, 설정 키에 쓰이는 이름
    pub fn name(&self) -> &'static str {
        match self {
            Category::Companies => "companies",
            Category::CompanyInfo => "company_info",
            Category::Officers => "officers",
            Category::Shareholders => "shareholders",
            Category::Dividends => "dividends",
            Category::StockQuote => "stock_quote",
            Category::Financial(kind) => kind.as_str(),
        }
    }

    /// 테스트 모드 제한 설정 키. 재무제표 네 종류는 같은 종목 집합을 쓰므로 하나의 키를 공유합니다.
    pub fn limit_key(&self) -> &'static str {
        match self {
            Category::Financial(_) => "financial",
            other => other.name(),
        }
    }

    /// 테스트 모드 기본 종목 수 (시세 3, 나머지 10, 상장 목록은 제한 없음)
    pub fn default_test_limit(&self) -> Option<usize> {
        match self {
            Category::Companies => None,
            Category::StockQuote => Some(3),
            _ => Some(10),
        }
    }

    /// 재시도 로그에 쓰이는 조회 이름
    pub fn fetch_name(&self) -> String {
        format!("fetch_{}", self.name())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 배치 결과 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// 1개 이상 성공, 1행 이상
    Produced,
    /// 1개 이상 성공, 0행 (기록할 것 없음)
    NoData,
    /// 모든 종목 실패
    AllFailed,
    /// 입력 종목 없음
    NoInput,
}

/// 한 카테고리 배치의 결과
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub category: Category,
    /// 성공한 종목의 행 (입력 순서 유지)
    pub table: Table,
    /// 조회 성공 종목 (빈 결과 포함)
    pub succeeded: Vec<String>,
    /// 최종 실패 종목
    pub failed: Vec<String>,
    pub stats: CollectionStats,
}

impl BatchResult {
    fn empty(category: Category) -> Self {
        Self {
            category,
            table: Table::default(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            stats: CollectionStats::new(),
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.succeeded.is_empty() && self.failed.is_empty() {
            BatchOutcome::NoInput
        } else if self.succeeded.is_empty() {
            BatchOutcome::AllFailed
        } else if self.table.is_empty() {
            BatchOutcome::NoData
        } else {
            BatchOutcome::Produced
        }
    }
}

/// 재무제표 종류별 (종목, 결과) 목록. `None`은 실패한 조합입니다.
#[derive(Debug, Clone, Default)]
pub struct FinancialBatch {
    pub results: BTreeMap<StatementKind, Vec<(String, Option<Table>)>>,
    pub skipped: usize,
    pub elapsed: Duration,
}

impl FinancialBatch {
    /// 종류별 배치 결과로 변환
    pub fn into_batches(self) -> Vec<BatchResult> {
        let mut batches = Vec::with_capacity(self.results.len());
        for (kind, entries) in self.results {
            let mut batch = BatchResult::empty(Category::Financial(kind));
            batch.stats.skipped = self.skipped;
            batch.stats.elapsed = self.elapsed;
            for (symbol, table) in entries {
                batch.stats.total += 1;
                match table {
                    Some(table) if table.is_empty() => {
                        batch.stats.empty += 1;
                        batch.succeeded.push(symbol);
                    }
                    Some(table) => {
                        batch.stats.success += 1;
                        batch.stats.total_rows += table.len();
                        batch.table.append(table);
                        batch.succeeded.push(symbol);
                    }
                    None => {
                        batch.stats.errors += 1;
                        batch.failed.push(symbol);
                    }
                }
            }
            batches.push(batch);
        }
        batches
    }
}

/// 테스트 모드 제한 적용
fn truncate(identifiers: &[String], limit: Option<usize>) -> (&[String], usize) {
    match limit {
        Some(limit) if limit < identifiers.len() => {
            (&identifiers[..limit], identifiers.len() - limit)
        }
        _ => (identifiers, 0),
    }
}

/// 배치 수집기
pub struct Collector<'a> {
    retry: &'a RetryPolicy,
    log: &'a dyn ErrorLog,
    throttle: Duration,
}

impl<'a> Collector<'a> {
    pub fn new(retry: &'a RetryPolicy, log: &'a dyn ErrorLog, throttle: Duration) -> Self {
        Self {
            retry,
            log,
            throttle,
        }
    }

    /// 종목 목록을 순서대로 수집.
    ///
    /// `limit`은 반복 전에 적용됩니다. 싱크가 있으면 성공한 종목마다 즉시 기록하고
    /// 반복이 끝나면 `finish`를 호출합니다. 싱크 오류는 해당 종목의 실패로 처리합니다.
    pub async fn collect<F, Fut>(
        &self,
        category: Category,
        identifiers: &[String],
        limit: Option<usize>,
        fetch: F,
        mut sink: Option<&mut dyn RecordSink>,
    ) -> BatchResult
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = stock_data::Result<Table>>,
    {
        let started = Instant::now();
        let mut batch = BatchResult::empty(category);
        let (targets, skipped) = truncate(identifiers, limit);
        batch.stats.skipped = skipped;

        if targets.is_empty() {
            tracing::warn!(category = %category, "수집할 종목이 없습니다");
            return batch;
        }

        tracing::info!(
            category = %category,
            symbols = targets.len(),
            skipped = skipped,
            "수집 시작"
        );

        let label = category.fetch_name();
        for (idx, symbol) in targets.iter().enumerate() {
            batch.stats.total += 1;
            let is_last = idx + 1 == targets.len();
            let progress = format!("{}/{}", idx + 1, targets.len());

            let fetched = self
                .retry
                .retry(&label, self.log, |_| fetch(symbol.clone()))
                .await;

            match fetched {
                Ok(rows) if rows.is_empty() => {
                    batch.stats.empty += 1;
                    batch.succeeded.push(symbol.clone());
                    tracing::info!(category = %category, symbol = %symbol, progress = %progress, "데이터 없음");
                }
                Ok(mut rows) => {
                    rows.tag_identifier(symbol);
                    let written = match sink.as_mut() {
                        Some(sink) => sink.accept(symbol, &rows, is_last),
                        None => Ok(()),
                    };
                    match written {
                        Ok(()) => {
                            batch.stats.success += 1;
                            batch.stats.total_rows += rows.len();
                            tracing::info!(
                                category = %category,
                                symbol = %symbol,
                                progress = %progress,
                                rows = rows.len(),
                                "수집 완료"
                            );
                            batch.table.append(rows);
                            batch.succeeded.push(symbol.clone());
                        }
                        Err(e) => {
                            batch.stats.errors += 1;
                            self.log.record(&format!(
                                "Error writing {} for {}: {}",
                                category, symbol, e
                            ));
                            batch.failed.push(symbol.clone());
                        }
                    }
                }
                Err(e) => {
                    batch.stats.errors += 1;
                    self.log
                        .record(&format!("Error fetching {} for {}: {}", category, symbol, e));
                    tracing::error!(
                        category = %category,
                        symbol = %symbol,
                        progress = %progress,
                        error = %e,
                        "조회 실패"
                    );
                    batch.failed.push(symbol.clone());
                }
            }

            if !is_last && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
        }

        if let Some(sink) = sink.as_mut() {
            if let Err(e) = sink.finish() {
                self.log
                    .record(&format!("Error finishing {} output: {}", category, e));
            }
        }

        batch.stats.elapsed = started.elapsed();
        batch
    }

    /// 재무제표 수집.
    ///
    /// 종목은 순서대로, 한 종목의 네 가지 재무제표는 최대 `workers`개까지 동시에 조회합니다.
    /// 각 조합은 개별적으로 재시도되며 실패해도 다른 조합에 영향을 주지 않습니다.
    pub async fn collect_financials<F, Fut>(
        &self,
        identifiers: &[String],
        limit: Option<usize>,
        workers: usize,
        fetch: F,
    ) -> FinancialBatch
    where
        F: Fn(String, StatementKind) -> Fut,
        Fut: Future<Output = stock_data::Result<Table>>,
    {
        let started = Instant::now();
        let (targets, skipped) = truncate(identifiers, limit);
        let mut batch = FinancialBatch {
            skipped,
            ..Default::default()
        };
        for kind in StatementKind::ALL {
            batch.results.insert(kind, Vec::new());
        }

        if targets.is_empty() {
            tracing::warn!("재무제표를 수집할 종목이 없습니다");
            return batch;
        }

        let fetch = &fetch;
        for (idx, symbol) in targets.iter().enumerate() {
            let results: Vec<(StatementKind, stock_data::Result<Table>)> =
                stream::iter(StatementKind::ALL)
                    .map(|kind| {
                        let label = Category::Financial(kind).fetch_name();
                        async move {
                            let result = self
                                .retry
                                .retry(&label, self.log, |_| fetch(symbol.clone(), kind))
                                .await;
                            (kind, result)
                        }
                    })
                    .buffered(workers.max(1))
                    .collect()
                    .await;

            for (kind, result) in results {
                let entry = match result {
                    Ok(mut table) => {
                        if !table.is_empty() {
                            table.tag_identifier(symbol);
                        }
                        Some(table)
                    }
                    Err(e) => {
                        self.log
                            .record(&format!("Error fetching {} for {}: {}", kind, symbol, e));
                        tracing::error!(symbol = %symbol, kind = %kind, error = %e, "재무제표 조회 실패");
                        None
                    }
                };
                batch
                    .results
                    .entry(kind)
                    .or_default()
                    .push((symbol.clone(), entry));
            }

            tracing::info!(
                symbol = %symbol,
                progress = format!("{}/{}", idx + 1, targets.len()),
                "재무제표 수집 완료"
            );

            if idx + 1 < targets.len() && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }
        }

        batch.elapsed = started.elapsed();
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_log::MemoryErrorLog;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use stock_data::{DataError, JsonArraySink, Result as DataResult};

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn rows(n: usize) -> Table {
        Table::from_value(serde_json::Value::Array(
            (0..n).map(|i| json!({"officer_name": format!("person {}", i)})).collect(),
        ))
        .unwrap()
    }

    async fn scripted(symbol: String) -> DataResult<Table> {
        match symbol.as_str() {
            "BAD" => Err(DataError::ApiError {
                status: 500,
                message: "internal".into(),
            }),
            "EMPTY" => Ok(Table::default()),
            "TWO" => Ok(rows(2)),
            _ => Ok(rows(1)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_are_isolated() {
        let retry = RetryPolicy::default();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::ZERO);

        let batch = collector
            .collect(
                Category::Officers,
                &symbols(&["ACB", "BAD", "TWO", "EMPTY"]),
                None,
                scripted,
                None,
            )
            .await;

        assert_eq!(batch.outcome(), BatchOutcome::Produced);
        assert_eq!(batch.table.len(), 3);
        let tagged: Vec<_> = batch.table.column_values("symbol").unwrap().cloned().collect();
        assert_eq!(tagged, vec![json!("ACB"), json!("TWO"), json!("TWO")]);
        assert_eq!(batch.succeeded, symbols(&["ACB", "TWO", "EMPTY"]));
        assert_eq!(batch.failed, symbols(&["BAD"]));
        assert_eq!(batch.stats.errors, 1);
        assert_eq!(batch.stats.empty, 1);

        let messages = log.messages();
        // 재시도 3회 + 최종 실패 1회
        assert_eq!(messages.len(), 4);
        assert_eq!(
            messages.iter().filter(|m| m.starts_with("Error fetching")).count(),
            1
        );
        assert_eq!(
            messages.last().unwrap(),
            "Error fetching officers for BAD: API error (500): internal"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_mode_limits_fetch_calls() {
        let retry = RetryPolicy::default();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::from_millis(500));
        let calls = AtomicUsize::new(0);
        let identifiers: Vec<String> = (0..50).map(|i| format!("S{:02}", i)).collect();

        let batch = collector
            .collect(
                Category::StockQuote,
                &identifiers,
                Category::StockQuote.default_test_limit(),
                |symbol| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    scripted(symbol)
                },
                None,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(batch.stats.skipped, 47);
        assert_eq!(batch.succeeded, symbols(&["S00", "S01", "S02"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_between_identifiers_only() {
        let retry = RetryPolicy::none();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::from_secs(2));
        let started = tokio::time::Instant::now();

        collector
            .collect(Category::Officers, &symbols(&["A", "B", "C"]), None, scripted, None)
            .await;

        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes() {
        let retry = RetryPolicy::none();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::ZERO);

        let none = collector
            .collect(Category::Dividends, &[], None, scripted, None)
            .await;
        assert_eq!(none.outcome(), BatchOutcome::NoInput);

        let failed = collector
            .collect(Category::Dividends, &symbols(&["BAD"]), None, scripted, None)
            .await;
        assert_eq!(failed.outcome(), BatchOutcome::AllFailed);

        let empty = collector
            .collect(Category::Dividends, &symbols(&["EMPTY", "BAD"]), None, scripted, None)
            .await;
        assert_eq!(empty.outcome(), BatchOutcome::NoData);
    }

    /// 기록 시점과 is_last를 기록하는 싱크
    #[derive(Default)]
    struct RecordingSink {
        accepted: Mutex<Vec<(String, usize, bool)>>,
        finished: bool,
        fail_on: Option<&'static str>,
    }

    impl RecordSink for RecordingSink {
        fn accept(&mut self, identifier: &str, rows: &Table, is_last: bool) -> DataResult<()> {
            if self.fail_on == Some(identifier) {
                return Err(DataError::InvalidData("disk full".into()));
            }
            self.accepted
                .lock()
                .unwrap()
                .push((identifier.to_string(), rows.len(), is_last));
            Ok(())
        }

        fn finish(&mut self) -> DataResult<()> {
            self.finished = true;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_receives_rows_per_identifier() {
        let retry = RetryPolicy::none();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::ZERO);
        let mut sink = RecordingSink {
            fail_on: Some("ACB"),
            ..Default::default()
        };

        let batch = collector
            .collect(
                Category::Shareholders,
                &symbols(&["ACB", "TWO", "VNM"]),
                None,
                scripted,
                Some(&mut sink),
            )
            .await;

        assert!(sink.finished);
        assert_eq!(
            *sink.accepted.lock().unwrap(),
            vec![("TWO".to_string(), 2, false), ("VNM".to_string(), 1, true)]
        );
        assert_eq!(batch.failed, symbols(&["ACB"]));
        assert_eq!(
            log.messages(),
            vec!["Error writing shareholders for ACB: Invalid data: disk full"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_sink_closed_when_last_identifier_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company_info.json");
        let retry = RetryPolicy::none();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::ZERO);
        let mut sink = JsonArraySink::new(&path);

        collector
            .collect(
                Category::CompanyInfo,
                &symbols(&["ACB", "BAD"]),
                None,
                scripted,
                Some(&mut sink),
            )
            .await;

        let text = std::fs::read_to_string(&path).unwrap();
        let items: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["symbol"], "ACB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_sink_untouched_when_every_identifier_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company_info.json");
        let retry = RetryPolicy::none();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::ZERO);
        let mut sink = JsonArraySink::new(&path);

        let batch = collector
            .collect(
                Category::CompanyInfo,
                &symbols(&["BAD", "BAD"]),
                None,
                scripted,
                Some(&mut sink),
            )
            .await;

        assert_eq!(batch.outcome(), BatchOutcome::AllFailed);
        assert!(!path.exists());
        assert_eq!(sink.objects_written(), 0);

        // 이전 실행이 열어 둔 파일은 닫힘
        std::fs::write(&path, "[{\"symbol\": \"ACB\"},\n").unwrap();
        collector
            .collect(
                Category::CompanyInfo,
                &symbols(&["BAD"]),
                None,
                scripted,
                Some(&mut sink),
            )
            .await;
        let text = std::fs::read_to_string(&path).unwrap();
        let items: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_financial_fan_out_isolates_failures() {
        let retry = RetryPolicy::none();
        let log = MemoryErrorLog::new();
        let collector = Collector::new(&retry, &log, Duration::ZERO);

        let batch = collector
            .collect_financials(&symbols(&["ACB", "VNM"]), None, 2, |symbol, kind| async move {
                if symbol == "VNM" && kind == StatementKind::CashFlow {
                    Err(DataError::NotFound("cash flow".into()))
                } else {
                    Table::from_value(json!([{"year_report": 2023, "kind": kind.as_str()}]))
                }
            })
            .await;

        let cash_flow = &batch.results[&StatementKind::CashFlow];
        assert_eq!(cash_flow.len(), 2);
        assert!(cash_flow[0].1.is_some());
        assert!(cash_flow[1].1.is_none());
        assert_eq!(log.len(), 1);

        let batches = batch.into_batches();
        assert_eq!(batches.len(), 4);
        for result in &batches {
            let symbols: Vec<_> = result.table.column_values("symbol").unwrap().cloned().collect();
            if result.category == Category::Financial(StatementKind::CashFlow) {
                assert_eq!(symbols, vec![json!("ACB")]);
                assert_eq!(result.failed, vec!["VNM".to_string()]);
            } else {
                assert_eq!(symbols, vec![json!("ACB"), json!("VNM")]);
            }
        }
    }
}
