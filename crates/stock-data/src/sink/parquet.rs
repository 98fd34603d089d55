//! 메모리 내 Parquet 버퍼.
//!
//! 테이블을 컬럼 타입을 추론한 `DataFrame`으로 변환한 뒤 바이트 버퍼로 직렬화합니다.
//! 업로드는 `StagingStore`가 담당합니다.

use std::io::Cursor;

use polars::prelude::*;
use serde_json::{Number, Value};

use crate::table::Table;
use crate::{DataError, Result};

/// 추론된 컬럼 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
}

/// null이 아닌 값들만 보고 컬럼 타입을 결정 (모두 null이면 문자열)
fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values {
        let current = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Number(n) if n.is_i64() => ColumnKind::Int,
            Value::Number(_) => ColumnKind::Float,
            _ => return ColumnKind::Text,
        };
        kind = Some(match (kind, current) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn text_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// 테이블 → DataFrame
pub fn table_to_frame(table: &Table) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(table.columns().len());

    for (idx, name) in table.columns().iter().enumerate() {
        let values = table.rows().iter().map(|row| &row[idx]);
        let column = match infer_kind(values.clone()) {
            ColumnKind::Bool => {
                let data: Vec<Option<bool>> = values.map(Value::as_bool).collect();
                Column::new(name.as_str().into(), data)
            }
            ColumnKind::Int => {
                let data: Vec<Option<i64>> = values.map(Value::as_i64).collect();
                Column::new(name.as_str().into(), data)
            }
            ColumnKind::Float => {
                let data: Vec<Option<f64>> = values.map(Value::as_f64).collect();
                Column::new(name.as_str().into(), data)
            }
            ColumnKind::Text => {
                let data: Vec<Option<String>> = values.map(text_cell).collect();
                Column::new(name.as_str().into(), data)
            }
        };
        columns.push(column);
    }

    DataFrame::new(columns)
        .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

/// 테이블을 Parquet 바이트로 직렬화
pub fn encode_parquet(table: &Table) -> Result<Vec<u8>> {
    let mut df = table_to_frame(table)?;
    encode_frame(&mut df)
}

/// DataFrame을 Parquet 바이트로 직렬화
pub fn encode_frame(df: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(buf)
}

/// Parquet 바이트 → DataFrame
pub fn decode_parquet(bytes: &[u8]) -> Result<DataFrame> {
    ParquetReader::new(Cursor::new(bytes.to_vec()))
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read parquet: {e}")))
}

/// DataFrame → 테이블 (CSV 출력, 검증용)
pub fn frame_to_table(df: &DataFrame) -> Result<Table> {
    let columns: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut cells: Vec<Vec<Value>> = Vec::with_capacity(columns.len());
    for column in df.get_columns() {
        cells.push(series_values(column.as_materialized_series())?);
    }

    let mut table = Table::new(columns);
    for row in 0..df.height() {
        table.push_row(cells.iter().map(|col| col[row].clone()).collect());
    }
    Ok(table)
}

fn series_values(series: &Series) -> Result<Vec<Value>> {
    let dtype = series.dtype();
    let values = if matches!(dtype, DataType::Boolean) {
        series
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .collect()
    } else if dtype.is_integer() {
        series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map(|i| Value::Number(i.into())).unwrap_or(Value::Null))
            .collect()
    } else if dtype.is_float() {
        series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null))
            .collect()
    } else {
        let text = if matches!(dtype, DataType::String) {
            series.clone()
        } else {
            series.cast(&DataType::String)?
        };
        text.str()?
            .into_iter()
            .map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
            .collect()
    };
    Ok(values)
}
