use async_trait::async_trait;

use super::context::{ExecutionContext, Response};

/// Turns an error raised anywhere in the pipeline into a response.
///
/// A filter that itself fails aborts the request with
/// [`PipelineError::FilterFailure`](crate::errors::PipelineError::FilterFailure).
#[async_trait]
pub trait ExceptionFilter: Send + Sync {
    async fn catch(&self, error: anyhow::Error, ctx: &mut ExecutionContext)
        -> anyhow::Result<Response>;
}
