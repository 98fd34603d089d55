//! 기업 정보 (개요 + 프로필).

use stock_data::{fetch_company_info, CompanyRef, JsonArraySink};

use super::staging::{collect_and_stage, StageTarget};
use super::{JobReport, Pipeline};
use crate::collector::Category;
use crate::Result;

/// 종목별 기업 정보 수집.
///
/// 로컬 모드에서는 JSON 배열 파일에 종목마다 한 객체씩 추가합니다.
pub async fn collect_company_info(
    pipeline: &Pipeline<'_>,
    companies: &[CompanyRef],
) -> Result<JobReport> {
    let provider = pipeline.provider;
    let sink = JsonArraySink::new(&pipeline.config.output.company_info_file);

    Ok(collect_and_stage(
        pipeline,
        Category::CompanyInfo,
        companies,
        |symbol| async move { fetch_company_info(provider, &symbol).await },
        StageTarget::single(Category::CompanyInfo),
        Box::new(sink),
    )
    .await)
}
