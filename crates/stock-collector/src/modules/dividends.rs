//! 배당 이력. 권리락일(`exercise_date`) 기준으로 (종목, 연도)별 스테이징합니다.

use stock_data::{CompanyRef, CsvAppendSink};

use super::staging::{collect_and_stage, StageTarget};
use super::{JobReport, Pipeline};
use crate::collector::Category;
use crate::Result;

pub async fn collect_dividends(pipeline: &Pipeline<'_>, companies: &[CompanyRef]) -> Result<JobReport> {
    let provider = pipeline.provider;

    Ok(collect_and_stage(
        pipeline,
        Category::Dividends,
        companies,
        |symbol| async move { provider.dividends(&symbol).await },
        StageTarget::partitioned(Category::Dividends, "exercise_date"),
        Box::new(CsvAppendSink::new(&pipeline.config.output.dividends_file)),
    )
    .await)
}
