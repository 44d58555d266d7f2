//! Request pipeline: `guards -> interceptors (before) -> handler ->
//! interceptors (after, reverse) -> filters on error -> response`.

mod context;
mod enhancer;
mod exception;
mod executor;
pub mod extract;
mod filter;
mod guard;
mod interceptor;
pub(crate) mod route;

pub use context::{ExecutionContext, HandlerInfo, Reflector, Request, Response};
pub use enhancer::{Binding, FilterBinding, GuardBinding, InterceptorBinding};
pub use exception::{default_response, find_http_exception, DefaultExceptionFilter, HttpException};
pub use executor::RoutePipeline;
pub use extract::{ParamExtractor, Params};
pub use filter::ExceptionFilter;
pub use guard::{FnGuard, Guard};
pub use interceptor::{Interceptor, Next};
pub use route::{Controller, Route};

pub(crate) use executor::GlobalEnhancers;
pub(crate) use route::join_paths;
