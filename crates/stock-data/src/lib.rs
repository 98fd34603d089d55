//! 베트남 주식 시장 데이터 수집용 데이터 계층.
//!
//! 이 crate는 다음을 제공합니다:
//! - 제공자 응답을 담는 범용 `Table` 모델
//! - 시장 데이터 제공자 추상화 (`MarketDataProvider`) 및 VCI HTTP 클라이언트
//! - (심볼, 연도) 기준 파티셔닝
//! - 싱크: CSV append, JSON 배열 파일, 메모리 내 Parquet 버퍼
//! - 오브젝트 스토리지 래퍼 (GCS / 로컬 디렉토리)
//! - 스테이징된 Parquet 정제 (중복 제거, 필터)

pub mod clean;
pub mod error;
pub mod partition;
pub mod provider;
pub mod sink;
pub mod storage;
pub mod table;

pub use clean::{dedupe, filter_officers, filter_shareholders, CleanCounts, OTHER_SHAREHOLDER};
pub use error::{DataError, Result};
pub use partition::{partition_by_year, PartitionKey, Partitioned};
pub use provider::{
    fetch_company_info, CompanyRef, MarketDataProvider, ReportPeriod, StatementKind, VciClient,
    VciConfig,
};
pub use sink::{
    csv::{read_csv, write_csv, write_or_append_csv, CsvAppendSink},
    json_array::{JsonArrayFile, JsonArraySink, TailState},
    parquet::{decode_parquet, encode_frame, encode_parquet, frame_to_table, table_to_frame},
    RecordSink,
};
pub use storage::StagingStore;
pub use table::{cell_text, cell_text_opt, Table, IDENTIFIER_COLUMN};
