use http::StatusCode;
use serde_json::json;
use wirekit::{async_trait, ExceptionFilter, ExecutionContext, HttpException, Response};

use crate::domain::error::CatsError;

/// Maps [`CatsError`] to HTTP responses. Bound with
/// `FilterBinding::catching::<CatsError, _>`.
pub struct CatsErrorFilter;

fn status_of(err: &CatsError) -> StatusCode {
    match err {
        CatsError::NotFound { .. } => StatusCode::NOT_FOUND,
        CatsError::Conflict { .. } => StatusCode::CONFLICT,
        CatsError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

#[async_trait]
impl ExceptionFilter for CatsErrorFilter {
    async fn catch(
        &self,
        error: anyhow::Error,
        ctx: &mut ExecutionContext,
    ) -> anyhow::Result<Response> {
        let Some(err) = error.chain().find_map(|e| e.downcast_ref::<CatsError>()) else {
            // Bound as catching::<CatsError>, so this only happens on misuse.
            anyhow::bail!("CatsErrorFilter received a foreign error: {error}");
        };
        let status = status_of(err);
        let body = json!({
            "statusCode": status.as_u16(),
            "message": err.to_string(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "path": ctx.request().path,
        });
        Ok(HttpException::new(status, err.to_string())
            .with_body(body)
            .response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(status_of(&CatsError::NotFound { id: 1 }), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(&CatsError::Conflict { name: "Tom".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(&CatsError::validation("bad")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
