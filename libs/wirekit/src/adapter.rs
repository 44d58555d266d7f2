//! Transport adapter contract and an in-process implementation.

use std::collections::HashMap;

use http::{Method, StatusCode};
use serde_json::json;

use crate::errors::PipelineError;
use crate::pipeline::{Request, Response, RoutePipeline};

/// Receives the application's routes. A real transport builds a
/// [`Request`] per inbound call, runs [`RoutePipeline::handle`] and encodes
/// the returned [`Response`].
pub trait HttpAdapter {
    fn attach(&mut self, method: Method, path: &str, pipeline: RoutePipeline);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn parse_pattern(path: &str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

fn match_pattern(pattern: &[Segment], path: &str) -> Option<HashMap<String, String>> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.len() != pattern.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (segment, part) in pattern.iter().zip(parts) {
        match segment {
            Segment::Literal(lit) if lit == part => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                params.insert(name.clone(), part.to_string());
            }
        }
    }
    Some(params)
}

struct Entry {
    method: Method,
    pattern: Vec<Segment>,
    path: String,
    pipeline: RoutePipeline,
}

/// Dispatches requests in process, matching `:param` path segments. Routes
/// are tried in attach order; the first match wins.
#[derive(Default)]
pub struct InMemoryAdapter {
    routes: Vec<Entry>,
}

impl std::fmt::Debug for InMemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.routes.iter().map(|e| format!("{} {}", e.method, e.path)))
            .finish()
    }
}

impl HttpAdapter for InMemoryAdapter {
    fn attach(&mut self, method: Method, path: &str, pipeline: RoutePipeline) {
        self.routes.push(Entry {
            method,
            pattern: parse_pattern(path),
            path: path.to_string(),
            pipeline,
        });
    }
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(method, path)` of every attached route, in attach order.
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.routes
            .iter()
            .map(|e| (e.method.clone(), e.path.clone()))
            .collect()
    }

    /// Routes the request; unknown paths yield 404 without touching any
    /// pipeline.
    pub async fn dispatch(&self, mut request: Request) -> Result<Response, PipelineError> {
        let path = request.path.split('?').next().unwrap_or_default().to_string();
        for entry in &self.routes {
            if entry.method != request.method {
                continue;
            }
            if let Some(params) = match_pattern(&entry.pattern, &path) {
                request.params.extend(params);
                return entry.pipeline.handle(request).await;
            }
        }

        tracing::debug!(method = %request.method, path = %path, "No route matched");
        Ok(Response::new(
            StatusCode::NOT_FOUND,
            json!({
                "statusCode": 404,
                "message": format!("Cannot {} {}", request.method, path),
                "error": "Not Found",
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_captures_params() {
        let pattern = parse_pattern("/cats/:id/toys/:toy");
        let params = match_pattern(&pattern, "/cats/7/toys/ball").unwrap();
        assert_eq!(params["id"], "7");
        assert_eq!(params["toy"], "ball");
    }

    #[test]
    fn pattern_requires_exact_segment_count_and_literals() {
        let pattern = parse_pattern("/cats/:id");
        assert!(match_pattern(&pattern, "/cats").is_none());
        assert!(match_pattern(&pattern, "/cats/1/2").is_none());
        assert!(match_pattern(&pattern, "/dogs/1").is_none());
        assert!(match_pattern(&parse_pattern("/"), "/").is_some());
    }
}
