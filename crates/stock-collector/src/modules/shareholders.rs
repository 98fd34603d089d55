//! 주요 주주.

use stock_data::{CompanyRef, CsvAppendSink};

use super::staging::{collect_and_stage, StageTarget};
use super::{JobReport, Pipeline};
use crate::collector::Category;
use crate::Result;

pub async fn collect_shareholders(
    pipeline: &Pipeline<'_>,
    companies: &[CompanyRef],
) -> Result<JobReport> {
    let provider = pipeline.provider;

    Ok(collect_and_stage(
        pipeline,
        Category::Shareholders,
        companies,
        |symbol| async move { provider.shareholders(&symbol).await },
        StageTarget::single(Category::Shareholders),
        Box::new(CsvAppendSink::new(&pipeline.config.output.shareholders_file)),
    )
    .await)
}
