//! Vietnamese stock market data collector.
//!
//! 상장 종목 목록을 기준으로 카테고리별 데이터를 수집해
//! 오브젝트 스토리지(Parquet) 또는 로컬 파일(CSV/JSON)에 기록합니다.
//!
//! # 모듈
//! - `collector`: 재시도, 종목별 실패 격리, 테스트 모드 제한을 갖춘 범용 배치 수집기
//! - `modules`: 카테고리별 작업과 정제 작업
//! - `retry`: 고정 스케줄 + 쿨다운 힌트 기반 재시도 정책
//! - `error_log`: 재시도/실패 기록

pub mod collector;
pub mod config;
pub mod error;
pub mod error_log;
pub mod modules;
pub mod retry;
pub mod stats;

#[cfg(test)]
mod testing;

pub use collector::{BatchOutcome, BatchResult, Category, Collector, FinancialBatch};
pub use config::{CollectorConfig, OutputMode};
pub use error::{CollectorError, Result};
pub use error_log::{ErrorLog, FileErrorLog, MemoryErrorLog};
pub use modules::{JobReport, Pipeline};
pub use retry::RetryPolicy;
pub use stats::CollectionStats;
