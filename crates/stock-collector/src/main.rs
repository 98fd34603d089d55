//! Standalone stock data collector CLI.

use clap::{Parser, Subcommand, ValueEnum};
use stock_collector::config::parse_date;
use stock_collector::{modules, CollectorConfig, CollectorError, FileErrorLog, OutputMode, Pipeline};
use stock_data::{ReportPeriod, VciClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stock-collector")]
#[command(about = "Vietnamese Stock Market Data Collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 테스트 모드 재정의 (IS_TEST 대신 사용, 예: --test false)
    #[arg(long, global = true, value_parser = clap::builder::BoolishValueParser::new())]
    test: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// 상장 종목 목록 갱신
    Companies,

    /// 기업 정보 (개요 + 프로필) 수집
    CompanyInfo,

    /// 임원 목록 수집
    Officers,

    /// 주요 주주 수집
    Shareholders,

    /// 배당 이력 수집
    Dividends,

    /// 일별 시세 수집
    StockQuote {
        /// 시작일 (YYYY-MM-DD, 기본: QUOTE_START_DATE)
        #[arg(long)]
        start: Option<String>,

        /// 종료일 (YYYY-MM-DD, 기본: QUOTE_END_DATE 또는 오늘)
        #[arg(long)]
        end: Option<String>,
    },

    /// 재무제표 수집
    Financial {
        /// 보고 주기 (quarter, year)
        #[arg(long)]
        period: Option<String>,
    },

    /// 스테이징된 데이터 정제
    Clean {
        #[arg(value_enum)]
        target: CleanTarget,
    },

    /// 전체 워크플로우 실행 (상장 목록 → 각 카테고리 → 재무제표)
    RunAll,
}

#[derive(Clone, Copy, ValueEnum)]
enum CleanTarget {
    Dividends,
    Shareholders,
    Officers,
    All,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "stock_collector={0},stock_data={0}",
                    cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Stock Data Collector 시작");

    // 설정 로드
    let config = CollectorConfig::from_env()?.with_test_mode(cli.test);
    tracing::debug!(
        mode = ?config.output.mode,
        is_test = config.is_test,
        "설정 로드 완료"
    );

    let log = FileErrorLog::new(&config.error_log_file);
    let provider = VciClient::new(config.provider.vci_config())?;
    let store = modules::open_store(&config.storage)?;
    if let Some(store) = &store {
        tracing::info!(store = %store.name(), "스테이징 스토어 연결");
    }

    let staging = match config.output.mode {
        OutputMode::Storage => store.as_ref(),
        OutputMode::Local => None,
    };
    let pipeline = Pipeline::new(&config, &provider, staging, &log);

    // 명령 실행
    match cli.command {
        Commands::Companies => {
            modules::refresh_companies(&pipeline).await?;
        }
        Commands::CompanyInfo => {
            let companies = modules::load_companies(&pipeline).await?;
            modules::collect_company_info(&pipeline, &companies).await?;
        }
        Commands::Officers => {
            let companies = modules::load_companies(&pipeline).await?;
            modules::collect_officers(&pipeline, &companies).await?;
        }
        Commands::Shareholders => {
            let companies = modules::load_companies(&pipeline).await?;
            modules::collect_shareholders(&pipeline, &companies).await?;
        }
        Commands::Dividends => {
            let companies = modules::load_companies(&pipeline).await?;
            modules::collect_dividends(&pipeline, &companies).await?;
        }
        Commands::StockQuote { start, end } => {
            let start = start.map(|v| parse_date("--start", &v)).transpose()?;
            let end = end.map(|v| parse_date("--end", &v)).transpose()?;
            let companies = modules::load_companies(&pipeline).await?;
            modules::collect_stock_quotes(&pipeline, &companies, start, end).await?;
        }
        Commands::Financial { period } => {
            let period = period.map(|v| v.parse::<ReportPeriod>()).transpose()?;
            let companies = modules::load_companies(&pipeline).await?;
            modules::collect_financial(&pipeline, &companies, period).await?;
        }
        Commands::Clean { target } => {
            let store = store.as_ref().ok_or_else(|| {
                CollectorError::Config(
                    "정제에는 GCS_BUCKET 또는 STORAGE_DIR 환경변수가 필요합니다".to_string(),
                )
            })?;
            let reports = match target {
                CleanTarget::Dividends => {
                    let limit = config.is_test.then_some(config.collect.clean_test_limit);
                    modules::clean_dividends(store, limit, &log).await
                }
                CleanTarget::Shareholders => modules::clean_shareholders(store, &log)
                    .await
                    .into_iter()
                    .collect(),
                CleanTarget::Officers => modules::clean_officers(store, &log)
                    .await
                    .into_iter()
                    .collect(),
                CleanTarget::All => modules::clean_all(store, &config, &log).await,
            };
            tracing::info!(objects = reports.len(), "정제 작업 완료");
        }
        Commands::RunAll => {
            tracing::info!("=== 전체 워크플로우 시작 ===");
            let reports = modules::run_all(&pipeline).await?;
            let failed = reports.iter().filter(|r| r.stats.errors > 0).count();
            tracing::info!(
                jobs = reports.len(),
                jobs_with_errors = failed,
                "=== 전체 워크플로우 완료 ==="
            );
        }
    }

    tracing::info!("Stock Data Collector 종료");

    Ok(())
}
