//! 수집 결과를 영속화하는 싱크.
//!
//! - `csv`: 헤더 한 번 + 이후 append
//! - `json_array`: 여러 실행에 걸쳐 유지되는 JSON 배열 파일
//! - `parquet`: 업로드용 메모리 내 Parquet 버퍼

pub mod csv;
pub mod json_array;
pub mod parquet;

use crate::{Result, Table};

/// 식별자 단위로 결과를 즉시 기록하는 싱크.
///
/// 배치 수집기가 식별자 하나를 성공적으로 가져올 때마다 `accept`를 호출하고,
/// 반복이 끝나면 `finish`를 한 번 호출합니다.
pub trait RecordSink: Send {
    /// 한 식별자의 행 기록. `is_last`는 배치의 마지막 식별자 여부입니다.
    fn accept(&mut self, identifier: &str, rows: &Table, is_last: bool) -> Result<()>;

    /// 배치 종료 처리
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
