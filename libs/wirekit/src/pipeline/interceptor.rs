use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::context::ExecutionContext;

/// Wraps handler execution. Code before `next.run(ctx)` runs on the way in,
/// code after it on the way out; not calling `next` short-circuits the
/// handler and the remaining interceptors.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> anyhow::Result<Value>;
}

/// The innermost step of the interceptor chain.
#[async_trait]
pub(crate) trait Endpoint: Send + Sync {
    async fn call(&self, ctx: &mut ExecutionContext) -> anyhow::Result<Value>;
}

/// Continuation handed to an interceptor: the rest of the chain plus the
/// handler.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Interceptor>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    pub async fn run(self, ctx: &mut ExecutionContext) -> anyhow::Result<Value> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                head.intercept(ctx, Next::new(rest, self.endpoint)).await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}
