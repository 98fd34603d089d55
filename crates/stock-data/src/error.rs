//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// HTTP 요청 오류
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// 제공자 서버 쿨다운 (HTTP 429)
    ///
    /// 메시지에 대기 시간이 포함되어 재시도 정책이 이를 해석합니다.
    #[error("Rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// 제공자 API 응답 오류
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// 데이터 없음
    #[error("No data: {0}")]
    NotFound(String),

    /// 파싱 오류
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 잘못된 데이터 형식
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 필수 컬럼 누락
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 파일 IO 오류
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV 읽기/쓰기 오류
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Parquet 인코딩/디코딩 오류
    #[error("Parquet error: {0}")]
    ParquetError(String),

    /// 오브젝트 스토리지 오류
    #[error("Storage error: {0}")]
    StorageError(#[from] object_store::Error),
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<polars::prelude::PolarsError> for DataError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        DataError::ParquetError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
