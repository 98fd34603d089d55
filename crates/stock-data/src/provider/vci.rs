//! VCI (Vietcap) 시장 데이터 클라이언트.
//!
//! - 상장 종목: `GET /api/price/symbols/getAll`
//! - 기업 정보 (개요/프로필/임원/주주/배당): `POST /data-mt/graphql`
//! - 일별 시세: `POST /api/chart/OHLCChart/gap-chart`
//! - 재무제표: IQ Insight 서비스
//!
//! 응답의 camelCase 키는 snake_case 컬럼으로 변환하고, 수집 파이프라인이
//! 기대하는 컬럼 이름으로 일부를 바꿉니다. 재시도는 하지 않습니다.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};

use super::{MarketDataProvider, ReportPeriod, StatementKind};
use crate::table::{cell_text_opt, Table};
use crate::{DataError, Result};

/// `Retry-After` 헤더가 없을 때의 대기 시간 (초)
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 베트남 표준시 (UTC+7)
const VN_OFFSET_SECS: i32 = 7 * 3600;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const OVERVIEW_QUERY: &str = r#"query Query($ticker: String!, $lang: String!) {
  CompanyListingInfo(ticker: $ticker) {
    ticker organShortName icbName2 icbName3 icbName4 issueShare foundingDate website companyType
  }
  TickerPriceInfo(ticker: $ticker) { exchange }
}"#;

const PROFILE_QUERY: &str = r#"query Query($ticker: String!, $lang: String!) {
  CompanyListingInfo(ticker: $ticker) {
    organName companyProfile history keyDevelopments businessStrategies businessRisk companyPromise
  }
}"#;

const OFFICERS_QUERY: &str = r#"query Query($ticker: String!, $lang: String!) {
  OrganizationManagers(ticker: $ticker) {
    id fullName positionName positionShortName quantity percentage updateDate
  }
}"#;

const SHAREHOLDERS_QUERY: &str = r#"query Query($ticker: String!, $lang: String!) {
  OrganizationShareHolders(ticker: $ticker) {
    id ownerFullName quantity percentage updateDate
  }
}"#;

const DIVIDENDS_QUERY: &str = r#"query Query($ticker: String!, $lang: String!) {
  OrganizationEvents(ticker: $ticker) {
    id eventTitle eventListCode ratio value recordDate exrightDate issueDate publicDate
  }
}"#;

/// VCI 엔드포인트 설정
#[derive(Debug, Clone)]
pub struct VciConfig {
    pub base_url: String,
    pub iq_base_url: String,
    pub timeout: Duration,
}

impl Default for VciConfig {
    fn default() -> Self {
        Self {
            base_url: "https://trading.vietcap.com.vn".to_string(),
            iq_base_url: "https://iq.vietcap.com.vn".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// VCI HTTP 클라이언트
#[derive(Clone)]
pub struct VciClient {
    client: Client,
    config: VciConfig,
}

impl VciClient {
    pub fn new(config: VciConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    /// 상태 코드 확인 (429는 대기 시간을 담은 RateLimited로 변환)
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(DataError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::ApiError {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }
        Ok(response)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        tracing::debug!(url = %url, "VCI 요청");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("Referer", &self.config.base_url)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        tracing::debug!(url = %url, "VCI 요청");
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .header("Referer", &self.config.base_url)
            .json(body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// GraphQL 질의. `data` 객체를 반환합니다.
    async fn graphql(&self, query: &str, symbol: &str) -> Result<Map<String, Value>> {
        let url = format!("{}/data-mt/graphql", self.config.base_url);
        let body = json!({
            "query": query,
            "variables": {"ticker": symbol, "lang": "vi"},
        });
        let payload = self.post_json(&url, &body).await?;
        graphql_data(payload)
    }

    /// 한 섹션의 객체 목록을 테이블로
    async fn graphql_section(&self, query: &str, symbol: &str, section: &str) -> Result<Table> {
        let mut data = self.graphql(query, symbol).await?;
        records_table(data.remove(section).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl MarketDataProvider for VciClient {
    fn name(&self) -> &str {
        "VCI"
    }

    async fn listing(&self) -> Result<Table> {
        let url = format!("{}/api/price/symbols/getAll", self.config.base_url);
        let mut table = records_table(self.get_json(&url).await?)?;
        table.rename_column("board", "exchange");
        tracing::info!(count = table.len(), "상장 종목 조회 완료");
        Ok(table)
    }

    async fn overview(&self, symbol: &str) -> Result<Table> {
        let data = self.graphql(OVERVIEW_QUERY, symbol).await?;
        let mut table = merge_sections(&data, &["CompanyListingInfo", "TickerPriceInfo"])?;
        rename_all(
            &mut table,
            &[
                ("icb_name3", "industry"),
                ("organ_short_name", "short_name"),
                ("founding_date", "established_year"),
            ],
        );
        Ok(table)
    }

    async fn profile(&self, symbol: &str) -> Result<Table> {
        let data = self.graphql(PROFILE_QUERY, symbol).await?;
        let mut table = merge_sections(&data, &["CompanyListingInfo"])?;
        rename_all(
            &mut table,
            &[("organ_name", "company_name"), ("history", "history_dev")],
        );
        Ok(table)
    }

    async fn officers(&self, symbol: &str) -> Result<Table> {
        let mut table = self
            .graphql_section(OFFICERS_QUERY, symbol, "OrganizationManagers")
            .await?;
        rename_all(
            &mut table,
            &[
                ("full_name", "officer_name"),
                ("position_name", "officer_position"),
                ("percentage", "officer_own_percent"),
            ],
        );
        Ok(table)
    }

    async fn shareholders(&self, symbol: &str) -> Result<Table> {
        let mut table = self
            .graphql_section(SHAREHOLDERS_QUERY, symbol, "OrganizationShareHolders")
            .await?;
        rename_all(
            &mut table,
            &[
                ("owner_full_name", "share_holder"),
                ("percentage", "share_own_percent"),
            ],
        );
        Ok(table)
    }

    async fn dividends(&self, symbol: &str) -> Result<Table> {
        let mut table = self
            .graphql_section(DIVIDENDS_QUERY, symbol, "OrganizationEvents")
            .await?;
        if let Some(idx) = table.column_index("event_list_code") {
            table.retain_rows(|_, row| cell_text_opt(&row[idx]).as_deref() == Some("DIV"));
        }
        rename_all(
            &mut table,
            &[
                ("exright_date", "exercise_date"),
                ("value", "cash_dividend"),
                ("ratio", "cash_dividend_percentage"),
                ("event_title", "issue_method"),
            ],
        );
        Ok(table)
    }

    async fn quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Table> {
        if end < start {
            return Err(DataError::InvalidData(format!(
                "quote range end {} is before start {}",
                end, start
            )));
        }
        let url = format!("{}/api/chart/OHLCChart/gap-chart", self.config.base_url);
        let body = json!({
            "timeFrame": "ONE_DAY",
            "symbols": [symbol],
            "from": day_start_epoch(start),
            "to": day_start_epoch(end) + 86_400,
        });
        let payload = self.post_json(&url, &body).await?;
        quotes_table(&payload, start, end)
    }

    async fn financial_statement(
        &self,
        symbol: &str,
        period: ReportPeriod,
        kind: StatementKind,
    ) -> Result<Table> {
        let url = match kind {
            StatementKind::Ratio => format!(
                "{}/api/iq-insight-service/v1/company/{}/statistics-financial",
                self.config.iq_base_url, symbol
            ),
            _ => format!(
                "{}/api/iq-insight-service/v1/company/{}/financial-statement?section={}",
                self.config.iq_base_url,
                symbol,
                kind.as_str().to_uppercase()
            ),
        };
        let payload = self.get_json(&url).await?;
        financial_table(payload, period)
    }
}

/// camelCase → snake_case ("icbName3" → "icb_name3")
pub(crate) fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            if matches!(prev, Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

fn snake_record(record: Map<String, Value>) -> Map<String, Value> {
    record
        .into_iter()
        .map(|(key, value)| (snake_case(&key), value))
        .collect()
}

/// 객체 배열 (또는 단일 객체) → snake_case 테이블
fn records_table(value: Value) -> Result<Table> {
    let value = match value {
        Value::Object(record) => Value::Object(snake_record(record)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Value::Object(snake_record(record)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    };
    Table::from_value(value)
}

fn rename_all(table: &mut Table, pairs: &[(&str, &str)]) {
    for (from, to) in pairs {
        table.rename_column(from, to);
    }
}

/// GraphQL 응답에서 `data` 추출 (`errors`가 있으면 오류)
fn graphql_data(payload: Value) -> Result<Map<String, Value>> {
    let Value::Object(mut body) = payload else {
        return Err(DataError::ParseError("GraphQL response is not an object".into()));
    };
    if let Some(Value::Array(errors)) = body.get("errors") {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DataError::ApiError {
                status: 200,
                message,
            });
        }
    }
    match body.remove("data") {
        Some(Value::Object(data)) => Ok(data),
        Some(Value::Null) | None => Ok(Map::new()),
        Some(other) => Err(DataError::ParseError(format!(
            "unexpected GraphQL data: {}",
            other
        ))),
    }
}

/// 여러 단일 객체 섹션을 한 행으로 병합 (빈 섹션은 무시)
fn merge_sections(data: &Map<String, Value>, sections: &[&str]) -> Result<Table> {
    let mut record = Map::new();
    for section in sections {
        let object = match data.get(*section) {
            Some(Value::Object(object)) => Some(object.clone()),
            Some(Value::Array(items)) => items.first().and_then(Value::as_object).cloned(),
            _ => None,
        };
        if let Some(object) = object {
            for (key, value) in snake_record(object) {
                record.entry(key).or_insert(value);
            }
        }
    }
    if record.is_empty() {
        return Ok(Table::default());
    }
    Ok(Table::from_records([record]))
}

/// 베트남 기준 자정의 epoch 초
fn day_start_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() - i64::from(VN_OFFSET_SECS)
}

fn number_at(values: Option<&Value>, idx: usize) -> Value {
    match values.and_then(|v| v.get(idx)) {
        Some(Value::String(s)) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(v @ Value::Number(_)) => v.clone(),
        _ => Value::Null,
    }
}

/// 시세 응답 (`[{o:[], h:[], l:[], c:[], v:[], t:[]}]`) → 일별 행.
///
/// `time`은 베트남 기준 날짜("YYYY-MM-DD")이며 [start, end] 밖의 행은 제외합니다.
pub(crate) fn quotes_table(payload: &Value, start: NaiveDate, end: NaiveDate) -> Result<Table> {
    let series = match payload {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(payload),
        Value::Null => None,
        other => {
            return Err(DataError::ParseError(format!(
                "unexpected quote payload: {}",
                other
            )))
        }
    };
    let Some(series) = series else {
        return Ok(Table::default());
    };

    let times = series.get("t").and_then(Value::as_array).cloned().unwrap_or_default();
    let offset = FixedOffset::east_opt(VN_OFFSET_SECS)
        .ok_or_else(|| DataError::InvalidData("invalid UTC offset".into()))?;

    let mut records = Vec::with_capacity(times.len());
    for (i, t) in times.iter().enumerate() {
        let epoch = match t {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        let Some(date) = epoch
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.with_timezone(&offset).date_naive())
        else {
            continue;
        };
        if date < start || date > end {
            continue;
        }

        let mut record = Map::new();
        record.insert("time".into(), Value::String(date.format("%Y-%m-%d").to_string()));
        record.insert("open".into(), number_at(series.get("o"), i));
        record.insert("high".into(), number_at(series.get("h"), i));
        record.insert("low".into(), number_at(series.get("l"), i));
        record.insert("close".into(), number_at(series.get("c"), i));
        record.insert("volume".into(), number_at(series.get("v"), i));
        records.push(record);
    }

    Ok(Table::from_records(records))
}

/// 재무제표 응답 → 테이블.
///
/// `data.quarters` / `data.years` 중 주기에 맞는 목록을 사용하고,
/// 목록 형태의 `data`는 그대로 사용합니다. `year_report`가 없으면 `year`에서 채웁니다.
pub(crate) fn financial_table(payload: Value, period: ReportPeriod) -> Result<Table> {
    let data = match payload {
        Value::Object(mut body) => body.remove("data").unwrap_or(Value::Null),
        other => other,
    };
    let rows = match data {
        Value::Object(mut sections) => {
            let key = match period {
                ReportPeriod::Quarter => "quarters",
                ReportPeriod::Year => "years",
            };
            sections.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    };

    let mut table = records_table(rows)?;
    if table.column_index("year_report").is_none() {
        table.rename_column("year", "year_report");
    }
    if period == ReportPeriod::Year {
        if let Some(idx) = table.column_index("length_report") {
            // 연간 행은 length_report가 5이거나 비어 있음
            table.retain_rows(|_, row| match &row[idx] {
                Value::Number(n) => n.as_i64().map(|v| v == 5 || v == 0).unwrap_or(true),
                _ => true,
            });
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("icbName3"), "icb_name3");
        assert_eq!(snake_case("organShortName"), "organ_short_name");
        assert_eq!(snake_case("yearReport"), "year_report");
        assert_eq!(snake_case("ISA1"), "isa1");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_listing_records_renamed() {
        let payload = json!([
            {"symbol": "ACB", "board": "HSX", "type": "STOCK", "organShortName": "ACB"},
            {"symbol": "SHS", "board": "HNX", "type": "STOCK", "organShortName": "SHS"},
        ]);
        let mut table = records_table(payload).unwrap();
        table.rename_column("board", "exchange");

        assert_eq!(
            table.columns(),
            &["symbol", "exchange", "type", "organ_short_name"]
        );
    }

    #[test]
    fn test_quotes_payload() {
        // 2024-01-02, 2024-01-03, 2024-01-04 (UTC+7 자정)
        let payload = json!([{
            "symbol": "ACB",
            "o": [24.1, 24.5, 24.0],
            "h": [24.8, 24.9, 24.3],
            "l": [23.9, 24.2, 23.8],
            "c": [24.5, 24.3, 24.1],
            "v": [1000, 2000, 1500],
            "t": ["1704128400", 1704214800, "1704301200"]
        }]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let table = quotes_table(&payload, start, end).unwrap();

        assert_eq!(table.columns(), &["time", "open", "high", "low", "close", "volume"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.value(0, "time"), Some(&json!("2024-01-02")));
        assert_eq!(table.value(1, "close"), Some(&json!(24.3)));
        assert_eq!(table.value(1, "volume"), Some(&json!(2000)));

        assert!(quotes_table(&json!([]), start, end).unwrap().is_empty());
    }

    #[test]
    fn test_financial_payload() {
        let payload = json!({
            "data": {
                "years": [{"yearReport": 2023, "lengthReport": 5, "isa1": 100}],
                "quarters": [
                    {"yearReport": 2023, "lengthReport": 4, "isa1": 30},
                    {"yearReport": 2024, "lengthReport": 1, "isa1": 25}
                ]
            }
        });
        let quarters = financial_table(payload.clone(), ReportPeriod::Quarter).unwrap();
        assert_eq!(quarters.len(), 2);
        assert_eq!(quarters.columns()[0], "year_report");

        let years = financial_table(payload, ReportPeriod::Year).unwrap();
        assert_eq!(years.len(), 1);

        let ratio = financial_table(
            json!({"data": [{"year": 2022, "quarter": 4, "pe": 7.5}]}),
            ReportPeriod::Quarter,
        )
        .unwrap();
        assert_eq!(ratio.value(0, "year_report"), Some(&json!(2022)));
    }

    #[test]
    fn test_graphql_errors_surface() {
        let err = graphql_data(json!({"errors": [{"message": "ticker not found"}]})).unwrap_err();
        assert!(err.to_string().contains("ticker not found"));

        let data = graphql_data(json!({"data": {"OrganizationManagers": []}})).unwrap();
        assert!(data.contains_key("OrganizationManagers"));
    }

    #[test]
    fn test_merge_sections_prefers_first() {
        let data = graphql_data(json!({"data": {
            "CompanyListingInfo": {"organShortName": "ACB", "icbName3": "Ngân hàng"},
            "TickerPriceInfo": {"exchange": "HSX", "organShortName": "other"}
        }}))
        .unwrap();
        let table = merge_sections(&data, &["CompanyListingInfo", "TickerPriceInfo"]).unwrap();
        assert_eq!(table.value(0, "organ_short_name"), Some(&json!("ACB")));
        assert_eq!(table.value(0, "exchange"), Some(&json!("HSX")));
    }

    #[tokio::test]
    #[ignore] // 실제 네트워크 테스트는 ignore
    async fn test_fetch_listing_live() {
        let client = VciClient::new(VciConfig::default()).unwrap();
        let listing = client.listing().await.unwrap();
        println!("상장 종목 수: {}", listing.len());
        assert!(listing.column_index("exchange").is_some());
    }
}
