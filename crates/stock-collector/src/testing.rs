//! 테스트용 Provider와 설정 헬퍼.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use stock_data::{
    CompanyRef, DataError, MarketDataProvider, ReportPeriod, Result, StatementKind, Table,
};

use crate::CollectorConfig;

/// 항상 실패하는 종목
pub const FAILING_SYMBOL: &str = "BAD";

/// 키-값 목록으로 설정 구성. 종목 간 딜레이는 기본 0입니다.
pub fn config(pairs: &[(&str, &str)]) -> CollectorConfig {
    let mut map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("REQUEST_DELAY_MS".to_string())
        .or_insert_with(|| "0".to_string());
    CollectorConfig::from_lookup(move |key| map.get(key).cloned()).unwrap()
}

pub fn companies(symbols: &[&str]) -> Vec<CompanyRef> {
    symbols
        .iter()
        .map(|s| CompanyRef {
            symbol: s.to_string(),
            exchange: "HSX".to_string(),
            security_type: "STOCK".to_string(),
        })
        .collect()
}

/// HSX 주식 목록 + 필터에 걸러지는 HNX 종목과 채권
pub fn listing(symbols: &[&str]) -> Table {
    let mut rows: Vec<Value> = symbols
        .iter()
        .map(|s| {
            json!({
                "symbol": s,
                "organ_short_name": format!("{} short", s),
                "organ_name": format!("{} Corporation", s),
                "exchange": "HSX",
                "type": "STOCK",
            })
        })
        .collect();
    rows.push(json!({"symbol": "HNX1", "organ_short_name": "h", "organ_name": "h", "exchange": "HNX", "type": "STOCK"}));
    rows.push(json!({"symbol": "BOND1", "organ_short_name": "b", "organ_name": "b", "exchange": "HSX", "type": "BOND"}));
    Table::from_value(Value::Array(rows)).unwrap()
}

/// 스크립트된 응답을 돌려주는 Provider.
///
/// `BAD` 종목은 모든 메서드에서 500 오류를 반환합니다.
pub struct FakeProvider {
    listing: Table,
    pub fail_listing: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::with_listing(&[])
    }

    pub fn with_listing(symbols: &[&str]) -> Self {
        Self {
            listing: listing(symbols),
            fail_listing: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 메서드별 호출 횟수
    pub fn calls_for(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    fn call(&self, method: &str, symbol: &str) -> Result<()> {
        self.calls.lock().unwrap().push(method.to_string());
        if symbol == FAILING_SYMBOL {
            return Err(DataError::ApiError {
                status: 500,
                message: format!("{} unavailable", symbol),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn listing(&self) -> Result<Table> {
        self.calls.lock().unwrap().push("listing".to_string());
        if self.fail_listing {
            return Err(DataError::ApiError {
                status: 503,
                message: "listing unavailable".into(),
            });
        }
        Ok(self.listing.clone())
    }

    async fn overview(&self, symbol: &str) -> Result<Table> {
        self.call("overview", symbol)?;
        Table::from_value(json!({"exchange": "HSX", "industry": "Banking", "short_name": symbol}))
    }

    async fn profile(&self, symbol: &str) -> Result<Table> {
        self.call("profile", symbol)?;
        Table::from_value(json!({"company_name": format!("{} Corporation", symbol)}))
    }

    async fn officers(&self, symbol: &str) -> Result<Table> {
        self.call("officers", symbol)?;
        Table::from_value(json!([
            {"officer_name": "Nguyễn Văn A", "officer_position": "CEO"},
            {"officer_name": "Trần Thị B", "officer_position": "CFO"},
            {"officer_name": "None", "officer_position": "Board"},
        ]))
    }

    async fn shareholders(&self, symbol: &str) -> Result<Table> {
        self.call("shareholders", symbol)?;
        Table::from_value(json!([
            {"share_holder": "Công ty A", "share_own_percent": 0.2},
            {"share_holder": "Khác", "share_own_percent": 0.7},
            {"share_holder": "Công ty B", "share_own_percent": 0.0},
        ]))
    }

    async fn dividends(&self, symbol: &str) -> Result<Table> {
        self.call("dividends", symbol)?;
        Table::from_value(json!([
            {"exercise_date": "2021-05-01", "cash_dividend": 1000},
            {"exercise_date": "2022-06-01", "cash_dividend": 1200},
            {"exercise_date": null, "cash_dividend": 800},
        ]))
    }

    async fn quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Table> {
        self.call("quotes", symbol)?;
        let rows = [("2023-01-03", 10.0), ("2023-01-04", 10.5), ("2024-01-02", 12.0)]
            .into_iter()
            .filter(|(day, _)| {
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map(|d| d >= start && d <= end)
                    .unwrap_or(false)
            })
            .map(|(day, close)| json!({"time": day, "close": close}))
            .collect();
        Table::from_value(Value::Array(rows))
    }

    async fn financial_statement(
        &self,
        symbol: &str,
        period: ReportPeriod,
        kind: StatementKind,
    ) -> Result<Table> {
        self.call("financial_statement", symbol)?;
        Table::from_value(json!([{
            "year_report": 2023,
            "length_report": 4,
            "period": period.as_str(),
            "kind": kind.as_str(),
        }]))
    }
}
