use serde_json::Value;
use wirekit::{async_trait, ExecutionContext, Interceptor, Next};

/// Logs every cats request with its latency and outcome.
pub struct TimingInterceptor;

#[async_trait]
impl Interceptor for TimingInterceptor {
    async fn intercept(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> anyhow::Result<Value> {
        let result = next.run(ctx).await;
        let request = ctx.request();
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            handler = ctx.handler().method,
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "cats request"
        );
        result
    }
}
