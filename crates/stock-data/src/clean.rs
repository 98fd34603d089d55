//! 스테이징된 데이터 정제.
//!
//! 단일 패스 중복 제거/필터만 수행합니다.

use polars::prelude::*;

use crate::{DataError, Result};

/// 주주 필터에서 제외할 기타 주주 표기
pub const OTHER_SHAREHOLDER: &str = "Khác";

/// 정제 결과 요약
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanCounts {
    pub original: usize,
    pub cleaned: usize,
}

impl CleanCounts {
    pub fn between(before: &DataFrame, after: &DataFrame) -> Self {
        Self {
            original: before.height(),
            cleaned: after.height(),
        }
    }

    pub fn removed(&self) -> usize {
        self.original.saturating_sub(self.cleaned)
    }
}

fn require_columns(df: &DataFrame, names: &[&str]) -> Result<()> {
    for name in names {
        if df.column(name).is_err() {
            return Err(DataError::MissingColumn((*name).to_string()));
        }
    }
    Ok(())
}

/// 완전히 같은 행 제거 (처음 등장한 행 유지, 순서 보존)
pub fn dedupe(df: &DataFrame) -> Result<DataFrame> {
    let out = df
        .clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    Ok(out)
}

/// 보유 비율이 0이거나 기타 주주("Khác")인 행 제거
pub fn filter_shareholders(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &["share_own_percent", "share_holder"])?;

    let out = df
        .clone()
        .lazy()
        .filter(
            col("share_own_percent")
                .cast(DataType::Float64)
                .neq(lit(0.0))
                .and(col("share_holder").neq(lit(OTHER_SHAREHOLDER))),
        )
        .collect()?;
    Ok(out)
}

/// 임원 이름이 비어 있거나 "None"인 행 제거
pub fn filter_officers(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &["officer_name"])?;

    let out = df
        .clone()
        .lazy()
        .filter(
            col("officer_name")
                .is_not_null()
                .and(col("officer_name").neq(lit("None"))),
        )
        .collect()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::parquet::{frame_to_table, table_to_frame};
    use crate::Table;
    use serde_json::json;

    fn frame(rows: serde_json::Value) -> DataFrame {
        table_to_frame(&Table::from_value(rows).unwrap()).unwrap()
    }

    #[test]
    fn test_dedupe_keeps_first_in_order() {
        let df = frame(json!([
            {"symbol": "VNM", "exercise_date": "2021-06-01", "cash_dividend": 1500},
            {"symbol": "VNM", "exercise_date": "2020-06-01", "cash_dividend": 1400},
            {"symbol": "VNM", "exercise_date": "2021-06-01", "cash_dividend": 1500},
        ]));
        let out = dedupe(&df).unwrap();
        let counts = CleanCounts::between(&df, &out);

        assert_eq!(counts, CleanCounts { original: 3, cleaned: 2 });
        assert_eq!(counts.removed(), 1);
        let table = frame_to_table(&out).unwrap();
        assert_eq!(table.value(0, "exercise_date"), Some(&json!("2021-06-01")));
        assert_eq!(table.value(1, "exercise_date"), Some(&json!("2020-06-01")));
    }

    #[test]
    fn test_filter_shareholders() {
        let df = frame(json!([
            {"symbol": "ACB", "share_holder": "Nguyễn Văn A", "share_own_percent": 0.05},
            {"symbol": "ACB", "share_holder": "Khác", "share_own_percent": 0.6},
            {"symbol": "ACB", "share_holder": "Công ty B", "share_own_percent": 0.0},
            {"symbol": "ACB", "share_holder": "Công ty C", "share_own_percent": 0.12},
        ]));
        let out = filter_shareholders(&df).unwrap();
        let table = frame_to_table(&out).unwrap();

        let holders: Vec<_> = table.column_values("share_holder").unwrap().cloned().collect();
        assert_eq!(holders, vec![json!("Nguyễn Văn A"), json!("Công ty C")]);
    }

    #[test]
    fn test_filter_officers_drops_none_names() {
        let df = frame(json!([
            {"symbol": "FPT", "officer_name": "Trương Gia Bình"},
            {"symbol": "FPT", "officer_name": "None"},
            {"symbol": "FPT", "officer_name": null},
        ]));
        let out = filter_officers(&df).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn test_missing_columns_are_reported() {
        let df = frame(json!([{"symbol": "FPT", "name": "x"}]));
        assert!(matches!(
            filter_officers(&df),
            Err(DataError::MissingColumn(c)) if c == "officer_name"
        ));
        assert!(matches!(
            filter_shareholders(&df),
            Err(DataError::MissingColumn(c)) if c == "share_own_percent"
        ));
    }
}
