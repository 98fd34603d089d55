//! 시장 데이터 Provider 모듈.
//!
//! 종목 단위로 데이터를 가져오는 Provider 추상화를 정의합니다.
//! 재시도/속도 제한은 상위 수집기의 책임이며 Provider는 한 번만 요청합니다.
//!
//! ## VCI (Vietcap)
//! - `VciClient`: 상장 종목 목록, 기업 개요/프로필, 임원, 주주, 배당,
//!   일별 시세, 재무제표

pub mod vci;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::table::{cell_text_opt, Table, IDENTIFIER_COLUMN};
use crate::{DataError, Result};

pub use vci::{VciClient, VciConfig};

/// 종목 참조 정보 (상장 목록의 한 행)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRef {
    pub symbol: String,
    pub exchange: String,
    pub security_type: String,
}

impl CompanyRef {
    /// 상장 목록 테이블에서 종목 참조 목록 생성.
    ///
    /// 심볼 기준으로 중복을 제거하며 처음 등장한 순서를 유지합니다.
    pub fn from_table(table: &Table) -> Result<Vec<CompanyRef>> {
        table.require_columns(&[IDENTIFIER_COLUMN])?;

        let mut seen = std::collections::HashSet::new();
        let mut companies = Vec::new();
        for row in 0..table.len() {
            let Some(symbol) = table.value(row, IDENTIFIER_COLUMN).and_then(cell_text_opt) else {
                continue;
            };
            if !seen.insert(symbol.clone()) {
                continue;
            }
            let text = |column: &str| {
                table
                    .value(row, column)
                    .and_then(cell_text_opt)
                    .unwrap_or_default()
            };
            companies.push(CompanyRef {
                exchange: text("exchange"),
                security_type: text("type"),
                symbol,
            });
        }
        Ok(companies)
    }
}

/// 재무제표 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    Ratio,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::IncomeStatement,
        StatementKind::BalanceSheet,
        StatementKind::CashFlow,
        StatementKind::Ratio,
    ];

    /// 경로/파일명에 쓰이는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::IncomeStatement => "income_statement",
            StatementKind::BalanceSheet => "balance_sheet",
            StatementKind::CashFlow => "cash_flow",
            StatementKind::Ratio => "ratio",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 재무제표 보고 주기
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportPeriod {
    #[default]
    Quarter,
    Year,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Quarter => "quarter",
            ReportPeriod::Year => "year",
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "quarter" | "q" => Ok(ReportPeriod::Quarter),
            "year" | "annual" | "y" => Ok(ReportPeriod::Year),
            other => Err(DataError::ParseError(format!(
                "unknown report period: {}",
                other
            ))),
        }
    }
}

/// 시장 데이터 Provider trait.
///
/// 모든 메서드는 한 번의 요청 결과를 테이블로 반환합니다.
/// 빈 테이블은 "데이터 없음"이며 오류가 아닙니다.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider 이름
    fn name(&self) -> &str;

    /// 전체 상장 종목 목록 (symbol, exchange, type, ...)
    async fn listing(&self) -> Result<Table>;

    /// 기업 개요
    async fn overview(&self, symbol: &str) -> Result<Table>;

    /// 기업 프로필 (소개, 연혁, 전략 등)
    async fn profile(&self, symbol: &str) -> Result<Table>;

    /// 임원 목록
    async fn officers(&self, symbol: &str) -> Result<Table>;

    /// 주요 주주
    async fn shareholders(&self, symbol: &str) -> Result<Table>;

    /// 배당 이력
    async fn dividends(&self, symbol: &str) -> Result<Table>;

    /// 일별 시세 (start ~ end, 양 끝 포함)
    async fn quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Table>;

    /// 재무제표
    async fn financial_statement(
        &self,
        symbol: &str,
        period: ReportPeriod,
        kind: StatementKind,
    ) -> Result<Table>;
}

/// 개요에서 가져오는 필드
const OVERVIEW_FIELDS: [&str; 7] = [
    "exchange",
    "industry",
    "company_type",
    "established_year",
    "stock_rating",
    "short_name",
    "website",
];

/// 프로필에서 가져오는 필드
const PROFILE_FIELDS: [&str; 7] = [
    "company_name",
    "company_profile",
    "history_dev",
    "company_promise",
    "business_risk",
    "key_developments",
    "business_strategies",
];

/// 개요 + 프로필을 하나의 행으로 합친 기업 정보.
///
/// 각 테이블의 첫 행만 사용하며, 없는 필드는 null입니다.
/// 두 응답이 모두 비어 있으면 빈 테이블을 반환합니다.
pub async fn fetch_company_info(provider: &dyn MarketDataProvider, symbol: &str) -> Result<Table> {
    let overview = provider.overview(symbol).await?;
    let profile = provider.profile(symbol).await?;

    if overview.is_empty() && profile.is_empty() {
        return Ok(Table::default());
    }

    let mut record = Map::new();
    record.insert(
        IDENTIFIER_COLUMN.to_string(),
        Value::String(symbol.to_string()),
    );
    for field in OVERVIEW_FIELDS {
        record.insert(field.to_string(), first_value(&overview, field));
    }
    for field in PROFILE_FIELDS {
        record.insert(field.to_string(), first_value(&profile, field));
    }

    Ok(Table::from_records([record]))
}

fn first_value(table: &Table, column: &str) -> Value {
    table.value(0, column).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticProvider;

    #[async_trait]
    impl MarketDataProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn listing(&self) -> Result<Table> {
            Ok(Table::default())
        }

        async fn overview(&self, symbol: &str) -> Result<Table> {
            if symbol == "NONE" {
                return Ok(Table::default());
            }
            Table::from_value(json!([{
                "symbol": symbol,
                "exchange": "HSX",
                "industry": "Ngân hàng",
                "established_year": 1993,
                "short_name": "ACB",
                "charter_capital": 1000
            }]))
        }

        async fn profile(&self, symbol: &str) -> Result<Table> {
            if symbol == "NONE" {
                return Ok(Table::default());
            }
            Table::from_value(json!([
                {"company_name": "Ngân hàng TMCP Á Châu", "history_dev": "..."},
                {"company_name": "ignored"}
            ]))
        }

        async fn officers(&self, _symbol: &str) -> Result<Table> {
            Ok(Table::default())
        }

        async fn shareholders(&self, _symbol: &str) -> Result<Table> {
            Ok(Table::default())
        }

        async fn dividends(&self, _symbol: &str) -> Result<Table> {
            Ok(Table::default())
        }

        async fn quotes(&self, _symbol: &str, _start: NaiveDate, _end: NaiveDate) -> Result<Table> {
            Ok(Table::default())
        }

        async fn financial_statement(
            &self,
            _symbol: &str,
            _period: ReportPeriod,
            _kind: StatementKind,
        ) -> Result<Table> {
            Ok(Table::default())
        }
    }

    #[tokio::test]
    async fn test_company_info_has_fixed_fields() {
        let info = fetch_company_info(&StaticProvider, "ACB").await.unwrap();

        assert_eq!(info.len(), 1);
        assert_eq!(info.columns().len(), 15);
        assert_eq!(info.columns()[0], "symbol");
        assert_eq!(info.value(0, "industry"), Some(&json!("Ngân hàng")));
        assert_eq!(info.value(0, "company_name"), Some(&json!("Ngân hàng TMCP Á Châu")));
        assert_eq!(info.value(0, "stock_rating"), Some(&Value::Null));
        assert!(info.column_index("charter_capital").is_none());

        let empty = fetch_company_info(&StaticProvider, "NONE").await.unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_company_refs_dedupe_by_symbol() {
        let table = Table::from_value(json!([
            {"symbol": "ACB", "exchange": "HSX", "type": "STOCK"},
            {"symbol": "VNM", "exchange": "HSX", "type": "STOCK"},
            {"symbol": "ACB", "exchange": "HNX", "type": "STOCK"},
            {"symbol": null, "exchange": "HSX", "type": "STOCK"},
        ]))
        .unwrap();

        let refs = CompanyRef::from_table(&table).unwrap();
        let symbols: Vec<_> = refs.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ACB", "VNM"]);
        assert_eq!(refs[0].exchange, "HSX");
        assert_eq!(refs[0].security_type, "STOCK");
    }

    #[test]
    fn test_report_period_parse() {
        assert_eq!("quarter".parse::<ReportPeriod>().unwrap(), ReportPeriod::Quarter);
        assert_eq!("YEAR".parse::<ReportPeriod>().unwrap(), ReportPeriod::Year);
        assert!("month".parse::<ReportPeriod>().is_err());
        assert_eq!(StatementKind::CashFlow.to_string(), "cash_flow");
    }
}
