//! 환경변수 기반 설정 모듈.
//!
//! `main`에서 한 번 로드한 뒤 값으로 전달합니다. 라이브러리 코드는 환경변수를 읽지 않습니다.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use stock_data::{ReportPeriod, VciConfig};

use crate::collector::Category;
use crate::error::CollectorError;
use crate::retry::RetryPolicy;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 테스트 모드 (카테고리별 종목 수 제한)
    pub is_test: bool,
    /// 출력 설정
    pub output: OutputConfig,
    /// 오브젝트 스토리지 설정
    pub storage: StorageConfig,
    /// 재시도 설정
    pub retry: RetryConfig,
    /// 수집 설정
    pub collect: CollectConfig,
    /// Provider 설정
    pub provider: ProviderConfig,
    /// 에러 로그 파일
    pub error_log_file: PathBuf,
}

/// 출력 대상
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// 오브젝트 스토리지에 Parquet 스테이징
    Storage,
    /// 로컬 CSV/JSON 파일
    Local,
}

impl FromStr for OutputMode {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "storage" | "gcs" => Ok(OutputMode::Storage),
            "local" | "file" => Ok(OutputMode::Local),
            other => Err(CollectorError::Config(format!(
                "OUTPUT_MODE은 storage 또는 local 이어야 합니다: {}",
                other
            ))),
        }
    }
}

/// 출력 파일 설정 (로컬 모드)
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub data_dir: PathBuf,
    pub companies_file: PathBuf,
    pub company_info_file: PathBuf,
    pub officers_file: PathBuf,
    pub shareholders_file: PathBuf,
    pub dividends_file: PathBuf,
    pub stock_quote_file: PathBuf,
}

impl OutputConfig {
    /// 재무제표 종류별 CSV 파일
    pub fn financial_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", name))
    }
}

/// 오브젝트 스토리지 설정
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// GCS 버킷
    pub gcs_bucket: Option<String>,
    /// GCS 서비스 계정 키 파일
    pub gcs_credentials: Option<PathBuf>,
    /// 로컬 스테이징 디렉토리 (버킷 대신)
    pub local_dir: Option<PathBuf>,
}

/// 재시도 설정
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 재시도 대기 시간 (초)
    pub delays_secs: Vec<u64>,
    /// 쿨다운 힌트에 더하는 여유 시간 (초)
    pub rate_limit_buffer_secs: u64,
}

/// 수집 설정
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// 종목 간 요청 딜레이 (밀리초)
    pub request_delay_ms: u64,
    /// 시세 수집 시작일
    pub quote_start_date: NaiveDate,
    /// 시세 수집 종료일 (없으면 실행일)
    pub quote_end_date: Option<NaiveDate>,
    /// 재무제표 주기
    pub financial_period: ReportPeriod,
    /// 재무제표 동시 요청 수
    pub statement_workers: usize,
    /// 상장 목록 필터: 거래소
    pub listing_exchange: String,
    /// 상장 목록 필터: 증권 종류
    pub listing_type: String,
    /// 카테고리별 테스트 모드 제한 재정의 (`TEST_LIMIT_<CATEGORY>`, 재무제표는 `TEST_LIMIT_FINANCIAL`)
    pub test_limits: BTreeMap<String, usize>,
    /// 테스트 모드 정제 객체 수 제한
    pub clean_test_limit: usize,
}

/// Provider 설정
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub vci_base_url: String,
    pub vci_iq_base_url: String,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정 구성
    pub fn from_lookup<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode: OutputMode = env("OUTPUT_MODE")
            .map(|v| v.parse::<OutputMode>())
            .transpose()?
            .unwrap_or(OutputMode::Storage);

        let data_dir = PathBuf::from(env("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let file = |key: &str, default: &str| data_dir.join(env(key).unwrap_or_else(|| default.to_string()));

        let output = OutputConfig {
            mode,
            companies_file: file("COMPANIES_FILE", "companies.csv"),
            company_info_file: file("COMPANY_INFO_FILE", "company_info.json"),
            officers_file: file("COMPANY_OFFICERS_FILE", "officers.csv"),
            shareholders_file: file("SHAREHOLDERS_FILE", "shareholders.csv"),
            dividends_file: file("DIVIDENDS_FILE", "dividends.csv"),
            stock_quote_file: file("STOCK_QUOTE_FILE", "stock_quote.csv"),
            data_dir: data_dir.clone(),
        };

        let storage = StorageConfig {
            gcs_bucket: env("GCS_BUCKET").filter(|v| !v.is_empty()),
            gcs_credentials: env("GCS_CREDENTIALS").filter(|v| !v.is_empty()).map(PathBuf::from),
            local_dir: env("STORAGE_DIR").filter(|v| !v.is_empty()).map(PathBuf::from),
        };
        if mode == OutputMode::Storage && storage.gcs_bucket.is_none() && storage.local_dir.is_none() {
            return Err(CollectorError::Config(
                "스토리지 모드에는 GCS_BUCKET 또는 STORAGE_DIR 환경변수가 필요합니다".to_string(),
            ));
        }

        let retry = RetryConfig {
            delays_secs: match env("RETRY_DELAYS_SECS") {
                Some(v) => parse_delays(&v)?,
                None => vec![10, 30, 60],
            },
            rate_limit_buffer_secs: env_var_parse(&env, "RATE_LIMIT_BUFFER_SECS", 5),
        };

        let mut test_limits = BTreeMap::new();
        let limit_keys: BTreeSet<&str> = Category::all().iter().map(|c| c.limit_key()).collect();
        for name in limit_keys {
            let key = format!("TEST_LIMIT_{}", name.to_uppercase());
            if let Some(limit) = env(&key).and_then(|v| v.parse().ok()) {
                test_limits.insert(name.to_string(), limit);
            }
        }

        let collect = CollectConfig {
            request_delay_ms: env_var_parse(&env, "REQUEST_DELAY_MS", 500),
            quote_start_date: match env("QUOTE_START_DATE") {
                Some(v) => parse_date("QUOTE_START_DATE", &v)?,
                None => NaiveDate::from_ymd_opt(2020, 1, 1)
                    .ok_or_else(|| CollectorError::Config("invalid default start date".into()))?,
            },
            quote_end_date: env("QUOTE_END_DATE")
                .map(|v| parse_date("QUOTE_END_DATE", &v))
                .transpose()?,
            financial_period: match env("FINANCIAL_PERIOD") {
                Some(v) => v.parse().map_err(|e: stock_data::DataError| {
                    CollectorError::Config(format!("FINANCIAL_PERIOD: {}", e))
                })?,
                None => ReportPeriod::Quarter,
            },
            statement_workers: env_var_parse(&env, "STATEMENT_WORKERS", 4usize).max(1),
            listing_exchange: env("LISTING_EXCHANGE").unwrap_or_else(|| "HSX".to_string()),
            listing_type: env("LISTING_TYPE").unwrap_or_else(|| "STOCK".to_string()),
            test_limits,
            clean_test_limit: env_var_parse(&env, "CLEAN_TEST_LIMIT", 50),
        };

        let defaults = VciConfig::default();
        let provider = ProviderConfig {
            vci_base_url: env("VCI_BASE_URL").unwrap_or(defaults.base_url),
            vci_iq_base_url: env("VCI_IQ_BASE_URL").unwrap_or(defaults.iq_base_url),
        };

        Ok(Self {
            is_test: env_var_bool(&env, "IS_TEST", true),
            output,
            storage,
            retry,
            collect,
            provider,
            error_log_file: PathBuf::from(
                env("ERROR_LOG_FILE").unwrap_or_else(|| "error_log.txt".to_string()),
            ),
        })
    }

    /// 명령행 `--test` 값으로 테스트 모드 재정의
    pub fn with_test_mode(mut self, is_test: Option<bool>) -> Self {
        if let Some(is_test) = is_test {
            self.is_test = is_test;
        }
        self
    }

    /// 카테고리의 테스트 모드 제한 (테스트 모드가 아니면 None)
    pub fn test_limit(&self, category: Category) -> Option<usize> {
        if !self.is_test {
            return None;
        }
        self.collect
            .test_limits
            .get(category.limit_key())
            .copied()
            .or_else(|| category.default_test_limit())
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs(&self.delays_secs, self.rate_limit_buffer_secs)
    }
}

impl CollectConfig {
    /// 종목 간 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl ProviderConfig {
    pub fn vci_config(&self) -> VciConfig {
        VciConfig {
            base_url: self.vci_base_url.clone(),
            iq_base_url: self.vci_iq_base_url.clone(),
            ..VciConfig::default()
        }
    }
}

/// "10,30,60" 형식의 대기 시간 목록
fn parse_delays(value: &str) -> Result<Vec<u64>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|_| {
                CollectorError::Config(format!("RETRY_DELAYS_SECS 값이 올바르지 않습니다: {}", value))
            })
        })
        .collect()
}

/// "YYYY-MM-DD" 날짜 파싱
pub fn parse_date(key: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| CollectorError::Config(format!("{} 날짜 형식 오류 ({}): {}", key, value, e)))
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<F, T>(env: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    env(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool<F>(env: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stock_data::StatementKind;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::from_lookup(lookup(&[("GCS_BUCKET", "vn-stock")])).unwrap();

        assert!(config.is_test);
        assert_eq!(config.output.mode, OutputMode::Storage);
        assert_eq!(config.output.officers_file, PathBuf::from("data/officers.csv"));
        assert_eq!(config.retry.delays_secs, vec![10, 30, 60]);
        assert_eq!(config.retry.rate_limit_buffer_secs, 5);
        assert_eq!(
            config.collect.quote_start_date,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
        );
        assert_eq!(config.collect.quote_end_date, None);
        assert_eq!(config.collect.statement_workers, 4);
        assert_eq!(config.error_log_file, PathBuf::from("error_log.txt"));
    }

    #[test]
    fn test_storage_mode_requires_target() {
        let err = CollectorConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));

        let local = CollectorConfig::from_lookup(lookup(&[("OUTPUT_MODE", "local")])).unwrap();
        assert_eq!(local.output.mode, OutputMode::Local);
    }

    #[test]
    fn test_invalid_dates_abort() {
        let err = CollectorConfig::from_lookup(lookup(&[
            ("OUTPUT_MODE", "local"),
            ("QUOTE_END_DATE", "31/12/2024"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("QUOTE_END_DATE"));
    }

    #[test]
    fn test_limits_per_category() {
        let config = CollectorConfig::from_lookup(lookup(&[
            ("OUTPUT_MODE", "local"),
            ("IS_TEST", "True"),
            ("TEST_LIMIT_OFFICERS", "2"),
            ("TEST_LIMIT_FINANCIAL", "4"),
            ("TEST_LIMIT_RATIO", "1"),
            ("RETRY_DELAYS_SECS", "1, 2"),
        ]))
        .unwrap();

        assert_eq!(config.test_limit(Category::StockQuote), Some(3));
        assert_eq!(config.test_limit(Category::Dividends), Some(10));
        assert_eq!(config.test_limit(Category::Officers), Some(2));
        // 재무제표 네 종류는 하나의 키를 공유
        for kind in StatementKind::ALL {
            assert_eq!(config.test_limit(Category::Financial(kind)), Some(4));
        }
        assert_eq!(config.test_limit(Category::Companies), None);
        assert_eq!(config.retry.delays_secs, vec![1, 2]);

        let full = config.with_test_mode(Some(false));
        assert_eq!(full.test_limit(Category::StockQuote), None);
    }
}
