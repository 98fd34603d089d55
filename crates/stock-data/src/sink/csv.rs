//! CSV 싱크.
//!
//! 파일이 없으면 헤더와 함께 생성하고, 있으면 헤더 없이 행만 이어 씁니다.
//! 새 파일의 컬럼 순서는 테이블 순서(식별자 우선)를 따르고, 기존 파일에 이어 쓸 때는
//! 기존 헤더 순서에 맞춥니다. 헤더에 없는 컬럼은 버리고 빠진 컬럼은 빈 셀로 둡니다.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::RecordSink;
use crate::table::cell_text;
use crate::{Result, Table};

/// 테이블을 CSV 파일에 기록 (없으면 생성 + 헤더, 있으면 append).
///
/// 기록한 행 수를 반환합니다.
pub fn write_or_append_csv(table: &Table, path: &Path) -> Result<usize> {
    ensure_parent(path)?;

    let header = existing_header(path)?;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut wtr = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    match header {
        None => {
            wtr.write_record(table.columns())?;
            for row in table.rows() {
                wtr.write_record(row.iter().map(cell_text))?;
            }
        }
        Some(header) if header.as_slice() == table.columns() => {
            for row in table.rows() {
                wtr.write_record(row.iter().map(cell_text))?;
            }
        }
        Some(header) => {
            let dropped: Vec<&String> = table
                .columns()
                .iter()
                .filter(|c| !header.contains(*c))
                .collect();
            if !dropped.is_empty() {
                tracing::warn!(
                    path = %path.display(),
                    dropped = ?dropped,
                    "기존 CSV 헤더에 없는 컬럼 제외"
                );
            }
            let index: Vec<Option<usize>> =
                header.iter().map(|c| table.column_index(c)).collect();
            for row in table.rows() {
                wtr.write_record(index.iter().map(|idx| match idx {
                    Some(i) => cell_text(&row[*i]),
                    None => String::new(),
                }))?;
            }
        }
    }
    wtr.flush()?;

    Ok(table.len())
}

/// 기존 파일의 헤더. 파일이 없거나 비어 있으면 `None`
fn existing_header(path: &Path) -> Result<Option<Vec<String>>> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => return Ok(None),
    }
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    match rdr.records().next() {
        Some(record) => Ok(Some(record?.iter().map(str::to_string).collect())),
        None => Ok(None),
    }
}

/// 테이블을 CSV 파일로 덮어쓰기
pub fn write_csv(table: &Table, path: &Path) -> Result<usize> {
    ensure_parent(path)?;

    let mut wtr = ::csv::Writer::from_path(path)?;
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(cell_text))?;
    }
    wtr.flush()?;

    Ok(table.len())
}

/// CSV 파일을 테이블로 읽기. 빈 셀은 null, 나머지는 문자열 값입니다.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut rdr = ::csv::Reader::from_path(path)?;
    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(columns);

    for record in rdr.records() {
        let record = record?;
        table.push_row(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(table)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// 식별자마다 CSV 파일에 즉시 append 하는 싱크
#[derive(Debug, Clone)]
pub struct CsvAppendSink {
    path: PathBuf,
    rows_written: usize,
}

impl CsvAppendSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows_written: 0,
        }
    }

    /// 이번 배치에서 기록한 행 수
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

impl RecordSink for CsvAppendSink {
    fn accept(&mut self, identifier: &str, rows: &Table, _is_last: bool) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let written = write_or_append_csv(rows, &self.path)?;
        self.rows_written += written;
        tracing::info!(
            symbol = identifier,
            rows = written,
            path = %self.path.display(),
            "CSV 기록 완료"
        );
        Ok(())
    }
}
