//! Handler parameter extractors.
//!
//! Each handler parameter position has its own extractor, run against the
//! execution context before the handler is called. Values reach the handler
//! through [`Params`] in declaration order.

use std::any::Any;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::context::ExecutionContext;
use super::exception::HttpException;
use crate::token::Token;

pub type Extracted = Box<dyn Any + Send>;

#[async_trait]
pub trait ParamExtractor: Send + Sync {
    async fn extract(&self, ctx: &ExecutionContext) -> anyhow::Result<Extracted>;
}

/// Extracted handler arguments.
pub struct Params {
    values: Vec<Option<Extracted>>,
}

impl Params {
    pub(crate) fn new(values: Vec<Extracted>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Take the argument at `index`. Each position can be taken once.
    pub fn take<T: Any + Send>(&mut self, index: usize) -> anyhow::Result<T> {
        let value = self
            .values
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| anyhow::anyhow!("handler parameter {index} is missing"))?;
        value.downcast::<T>().map(|v| *v).map_err(|_| {
            anyhow::anyhow!(
                "handler parameter {index} is not a {}",
                std::any::type_name::<T>()
            )
        })
    }
}

struct FnExtractor<F>(F);

#[async_trait]
impl<F, T> ParamExtractor for FnExtractor<F>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<T> + Send + Sync,
    T: Any + Send,
{
    async fn extract(&self, ctx: &ExecutionContext) -> anyhow::Result<Extracted> {
        (self.0)(ctx).map(|v| Box::new(v) as Extracted)
    }
}

/// Extractor from a synchronous function of the context.
pub fn from_fn<F, T>(f: F) -> Arc<dyn ParamExtractor>
where
    F: Fn(&ExecutionContext) -> anyhow::Result<T> + Send + Sync + 'static,
    T: Any + Send,
{
    Arc::new(FnExtractor(f))
}

/// Request body deserialized into `T`; 400 on mismatch.
pub fn body<T: DeserializeOwned + Send + 'static>() -> Arc<dyn ParamExtractor> {
    from_fn(|ctx: &ExecutionContext| {
        serde_json::from_value::<T>(ctx.request().body.clone())
            .map_err(|e| HttpException::bad_request(format!("invalid request body: {e}")).into())
    })
}

/// Path parameter as a string; 400 if absent.
pub fn path(name: &'static str) -> Arc<dyn ParamExtractor> {
    from_fn(move |ctx: &ExecutionContext| {
        ctx.request()
            .param(name)
            .map(str::to_owned)
            .ok_or_else(|| {
                HttpException::bad_request(format!("missing path parameter '{name}'")).into()
            })
    })
}

/// Path parameter parsed with `FromStr`; 400 if absent or malformed.
pub fn path_as<T>(name: &'static str) -> Arc<dyn ParamExtractor>
where
    T: FromStr + Send + 'static,
{
    from_fn(move |ctx: &ExecutionContext| {
        let raw = ctx.request().param(name).ok_or_else(|| {
            HttpException::bad_request(format!("missing path parameter '{name}'"))
        })?;
        raw.parse::<T>().map_err(|_| {
            HttpException::bad_request(format!("invalid path parameter '{name}': {raw}")).into()
        })
    })
}

/// Query parameter, if present.
pub fn query(name: &'static str) -> Arc<dyn ParamExtractor> {
    from_fn(move |ctx: &ExecutionContext| Ok(ctx.request().query.get(name).cloned()))
}

/// Header value, if present and valid UTF-8.
pub fn header(name: &'static str) -> Arc<dyn ParamExtractor> {
    from_fn(move |ctx: &ExecutionContext| Ok(ctx.request().header(name).map(str::to_owned)))
}

/// A clone of a value put into the context state by a guard or interceptor.
pub fn state<T: Clone + Send + Sync + 'static>() -> Arc<dyn ParamExtractor> {
    from_fn(|ctx: &ExecutionContext| Ok(ctx.state().get::<T>().cloned()))
}

/// The whole request, as `Arc<Request>`.
pub fn request() -> Arc<dyn ParamExtractor> {
    from_fn(|ctx: &ExecutionContext| Ok(ctx.scope().request().clone()))
}

/// Resolve a provider visible to the controller, within the request scope.
pub fn inject<T: Any + Send + Sync>(token: impl Into<Token>) -> Arc<dyn ParamExtractor> {
    Arc::new(InjectExtractor::<T> {
        token: token.into(),
        _marker: std::marker::PhantomData,
    })
}

struct InjectExtractor<T> {
    token: Token,
    _marker: std::marker::PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Any + Send + Sync> ParamExtractor for InjectExtractor<T> {
    async fn extract(&self, ctx: &ExecutionContext) -> anyhow::Result<Extracted> {
        let value = ctx.resolve::<T>(self.token.clone()).await?;
        Ok(Box::new(value) as Extracted)
    }
}
