//! (심볼, 연도) 기준 파티셔닝.
//!
//! 배당, 시세, 재무제표처럼 날짜가 있는 카테고리는 하나의 거대한 테이블 대신
//! 종목/연도별 하위 테이블로 나누어 스테이징합니다.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::table::{cell_text_opt, Table, IDENTIFIER_COLUMN};
use crate::{DataError, Result};

/// 파티션 키 (식별자, 연도)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub symbol: String,
    pub year: i32,
}

impl PartitionKey {
    pub fn new(symbol: impl Into<String>, year: i32) -> Self {
        Self {
            symbol: symbol.into(),
            year,
        }
    }
}

/// 파티셔닝 결과
#[derive(Debug, Clone, Default)]
pub struct Partitioned {
    /// 키별 하위 테이블 (각 테이블 내 행 순서는 원본 순서 유지)
    pub partitions: BTreeMap<PartitionKey, Table>,
    /// 날짜를 해석할 수 없어 제외된 행 수
    pub dropped: usize,
}

/// 날짜 컬럼에서 연도를 도출해 (식별자, 연도)별로 분할.
///
/// 날짜가 없거나 해석할 수 없는 행은 어떤 파티션에도 포함되지 않습니다.
pub fn partition_by_year(table: &Table, date_column: &str) -> Result<Partitioned> {
    if table.is_empty() {
        return Ok(Partitioned::default());
    }

    let symbol_idx = table
        .column_index(IDENTIFIER_COLUMN)
        .ok_or_else(|| DataError::MissingColumn(IDENTIFIER_COLUMN.to_string()))?;
    let date_idx = table
        .column_index(date_column)
        .ok_or_else(|| DataError::MissingColumn(date_column.to_string()))?;

    let mut groups: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
    let mut dropped = 0;

    for (i, row) in table.rows().iter().enumerate() {
        let Some(symbol) = cell_text_opt(&row[symbol_idx]) else {
            dropped += 1;
            continue;
        };
        match derive_year(&row[date_idx]) {
            Some(year) => groups.entry(PartitionKey::new(symbol, year)).or_default().push(i),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, column = date_column, "날짜 해석 불가 행 제외");
    }

    let partitions = groups
        .into_iter()
        .map(|(key, indices)| (key, table.select_rows(&indices)))
        .collect();

    Ok(Partitioned {
        partitions,
        dropped,
    })
}

/// 셀 값에서 연도 도출.
///
/// 지원 형식:
/// - "2021-05-12", "2021-05-12 09:15:00", "2021-05-12T09:15:00(.fff)", RFC 3339
/// - "12/05/2021" (일/월/연), "20210512"
/// - 연도 정수 (1900~2100)
/// - epoch 초 또는 밀리초
pub fn derive_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                year_from_integer(i)
            } else {
                n.as_f64().and_then(|f| year_from_integer(f as i64))
            }
        }
        Value::String(s) => year_from_text(s.trim()),
        _ => None,
    }
}

fn year_from_integer(value: i64) -> Option<i32> {
    if (1900..=2100).contains(&value) {
        return Some(value as i32);
    }
    // 1e11 이상이면 밀리초로 간주
    let secs = if value.abs() >= 100_000_000_000 {
        value / 1000
    } else {
        value
    };
    DateTime::from_timestamp(secs, 0).map(|dt| dt.year())
}

fn year_from_text(text: &str) -> Option<i32> {
    if text.is_empty() {
        return None;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        if text.len() == 8 {
            if let Ok(date) = NaiveDate::parse_from_str(text, "%Y%m%d") {
                return Some(date.year());
            }
        }
        return text.parse::<i64>().ok().and_then(year_from_integer);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.year());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.year());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.year());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%d/%m/%Y") {
        return Some(date.year());
    }
    None
}
