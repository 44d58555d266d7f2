use async_trait::async_trait;

use super::context::ExecutionContext;

/// Decides whether a request may reach its handler.
///
/// Guards run sequentially (global, then controller, then handler). The first
/// `Ok(false)` rejects the request with 403 Forbidden; an `Err` propagates to
/// the exception filters with its own status.
#[async_trait]
pub trait Guard: Send + Sync {
    async fn can_activate(&self, ctx: &mut ExecutionContext) -> anyhow::Result<bool>;
}

/// Guard built from a synchronous predicate.
pub struct FnGuard<F>(pub F);

#[async_trait]
impl<F> Guard for FnGuard<F>
where
    F: Fn(&ExecutionContext) -> bool + Send + Sync,
{
    async fn can_activate(&self, ctx: &mut ExecutionContext) -> anyhow::Result<bool> {
        Ok((self.0)(ctx))
    }
}
