use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use super::context::{ExecutionContext, Response};
use super::filter::ExceptionFilter;

/// An error carrying an HTTP status. The default filter renders it as
/// `{statusCode, message, error}` unless a custom body is set.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpException {
    pub status: StatusCode,
    pub message: String,
    pub body: Option<Value>,
}

impl HttpException {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Replace the rendered body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn response(&self) -> Response {
        let body = self.body.clone().unwrap_or_else(|| {
            json!({
                "statusCode": self.status.as_u16(),
                "message": self.message,
                "error": self.status.canonical_reason().unwrap_or("Error"),
            })
        });
        Response::new(self.status, body)
    }
}

/// Finds an [`HttpException`] anywhere in the error chain.
pub fn find_http_exception(error: &anyhow::Error) -> Option<&HttpException> {
    error.chain().find_map(|e| e.downcast_ref::<HttpException>())
}

/// Renders whatever no registered filter claimed. Errors without a status
/// become a 500 carrying the error message and are logged.
pub fn default_response(error: &anyhow::Error) -> Response {
    match find_http_exception(error) {
        Some(exception) => exception.response(),
        None => {
            tracing::error!(error = ?error, "Unhandled exception");
            Response::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "statusCode": 500,
                    "message": error.to_string(),
                    "error": "Internal Server Error",
                }),
            )
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionFilter;

#[async_trait]
impl ExceptionFilter for DefaultExceptionFilter {
    async fn catch(
        &self,
        error: anyhow::Error,
        _ctx: &mut ExecutionContext,
    ) -> anyhow::Result<Response> {
        Ok(default_response(&error))
    }
}
