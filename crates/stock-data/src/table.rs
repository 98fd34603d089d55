//! 제공자 응답을 담는 범용 테이블.
//!
//! 카테고리마다 컬럼 구성이 다르므로 고정 스키마 대신
//! 순서가 있는 컬럼 이름 + JSON 스칼라 값 행으로 표현합니다.

use serde_json::{Map, Value};

use crate::{DataError, Result};

/// 식별자(종목 코드) 컬럼 이름. 태깅 후 항상 첫 번째 컬럼입니다.
pub const IDENTIFIER_COLUMN: &str = "symbol";

/// 컬럼 순서를 보존하는 행 기반 테이블.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// 빈 테이블 생성
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// JSON 객체 목록에서 테이블 생성.
    ///
    /// 컬럼은 처음 등장한 순서대로 합집합을 이룹니다.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let mut table = Self::default();
        for record in records {
            table.push_record(record);
        }
        table
    }

    /// JSON 값에서 테이블 생성 (객체 배열, 단일 객체, null 허용)
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(record) => Ok(Self::from_records([record])),
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(record) => records.push(record),
                        other => {
                            return Err(DataError::InvalidData(format!(
                                "expected JSON object row, got {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Self::from_records(records))
            }
            other => Err(DataError::InvalidData(format!(
                "expected JSON array of objects, got {}",
                other
            ))),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// 행 수
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 컬럼 위치 조회
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// 필수 컬럼 존재 확인
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        for name in names {
            if self.column_index(name).is_none() {
                return Err(DataError::MissingColumn((*name).to_string()));
            }
        }
        Ok(())
    }

    /// 특정 행의 컬럼 값
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// 컬럼 값 순회 (없는 컬럼이면 None)
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |r| &r[idx]))
    }

    /// 행 추가. 길이가 다르면 null로 채우거나 잘라냅니다.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// JSON 객체를 행으로 추가. 새 키는 컬럼으로 추가됩니다.
    pub fn push_record(&mut self, record: Map<String, Value>) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (key, value) in record {
            match self.column_index(&key) {
                Some(idx) => row[idx] = value,
                None => {
                    self.add_column(key);
                    row.push(value);
                }
            }
        }
        self.rows.push(row);
    }

    fn add_column(&mut self, name: String) {
        self.columns.push(name);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
    }

    /// 모든 행에 식별자를 첫 번째 컬럼으로 기록.
    ///
    /// 기존 `symbol` 컬럼이 있으면 덮어쓰고 맨 앞으로 이동합니다.
    pub fn tag_identifier(&mut self, identifier: &str) {
        if let Some(idx) = self.column_index(IDENTIFIER_COLUMN) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
        self.columns.insert(0, IDENTIFIER_COLUMN.to_string());
        for row in &mut self.rows {
            row.insert(0, Value::String(identifier.to_string()));
        }
    }

    /// 다른 테이블의 행을 컬럼 이름 기준으로 정렬하여 이어 붙임
    pub fn append(&mut self, other: Table) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }

        let mapping: Vec<usize> = other
            .columns
            .into_iter()
            .map(|name| match self.column_index(&name) {
                Some(idx) => idx,
                None => {
                    self.add_column(name);
                    self.columns.len() - 1
                }
            })
            .collect();

        let width = self.columns.len();
        for source in other.rows {
            let mut row = vec![Value::Null; width];
            for (value, &target) in source.into_iter().zip(&mapping) {
                row[target] = value;
            }
            self.rows.push(row);
        }
    }

    /// 컬럼 삭제 (없는 컬럼은 무시)
    pub fn drop_columns(&mut self, names: &[&str]) {
        let mut keep = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            keep.push(!names.contains(&column.as_str()));
        }
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut flags = keep.iter();
            row.retain(|_| *flags.next().unwrap_or(&true));
        }
    }

    /// 컬럼 이름 변경. 대상 이름이 이미 있으면 변경하지 않습니다.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if self.column_index(to).is_some() {
            return false;
        }
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// 조건을 만족하는 행만 유지
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String], &[Value]) -> bool,
    {
        let columns = &self.columns;
        self.rows.retain(|row| keep(columns, row));
    }

    /// 행을 JSON 객체로 변환
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect::<Map<String, Value>>()
            })
            .collect()
    }

    /// 특정 행만 담은 새 테이블 (partition 용)
    pub(crate) fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}

/// JSON 값을 텍스트 셀로 변환 (CSV, 필터 비교용)
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 비어 있지 않은 텍스트 값 (null, 빈 문자열은 None)
pub fn cell_text_opt(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(cell_text(other)),
    }
}
