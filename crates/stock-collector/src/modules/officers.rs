//! 임원 목록.

use stock_data::{CompanyRef, CsvAppendSink};

use super::staging::{collect_and_stage, StageTarget};
use super::{JobReport, Pipeline};
use crate::collector::Category;
use crate::Result;

pub async fn collect_officers(pipeline: &Pipeline<'_>, companies: &[CompanyRef]) -> Result<JobReport> {
    let provider = pipeline.provider;

    Ok(collect_and_stage(
        pipeline,
        Category::Officers,
        companies,
        |symbol| async move { provider.officers(&symbol).await },
        StageTarget::single(Category::Officers),
        Box::new(CsvAppendSink::new(&pipeline.config.output.officers_file)),
    )
    .await)
}
