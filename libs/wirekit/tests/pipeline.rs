//! Request pipeline: guards, interceptors, handlers and exception filters.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wirekit::pipeline::extract;
use wirekit::{
    async_trait, Application, ApplicationBuilder, Args, Controller, Dependency, DynamicModule,
    ExceptionFilter, ExecutionContext, FilterBinding, FnGuard, Guard, GuardBinding, HttpException,
    InMemoryAdapter, Injectable, Interceptor, InterceptorBinding, ModuleDescriptor,
    Next, Params, PipelineError, Provider, Request, Response, Route, Scope, Token, REQUEST,
};

use common::CallLog;

const ROLES: &str = "roles";

// ---------- Controller ----------

static SERIAL: AtomicUsize = AtomicUsize::new(0);

struct CatsController {
    log: Arc<CallLog>,
    serial: usize,
}

impl Injectable for CatsController {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::token("LOG")]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self {
            log: args.next()?,
            serial: SERIAL.fetch_add(1, Ordering::SeqCst),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CreateCat {
    name: String,
    age: u8,
}

#[derive(Debug, thiserror::Error)]
#[error("cat {0} not found")]
struct CatNotFound(u32);

#[derive(Debug, Clone, Serialize)]
struct User {
    name: String,
}

/// Resolves to the path of the current request.
struct RequestEcho(String);

impl Injectable for RequestEcho {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::Required(REQUEST)]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self(args.next::<Request>()?.path.clone()))
    }
}

fn cats_controller() -> Controller {
    Controller::new::<CatsController>("cats")
        .route(Route::get("/", "find_all", |c: Arc<CatsController>, _| async move {
            c.log.push("handler");
            Ok(json!(["Tom", "Garfield"]))
        }))
        .route(
            Route::post("/", "create", |c: Arc<CatsController>, mut p: Params| async move {
                let cat: CreateCat = p.take(0)?;
                let trace: Option<String> = p.take(1)?;
                c.log.push(format!("create:{}:{}", cat.name, trace.unwrap_or_default()));
                Ok::<_, anyhow::Error>(cat)
            })
            .param(extract::body::<CreateCat>())
            .param(extract::header("x-trace"))
            .metadata(ROLES, vec!["admin"]),
        )
        .route(
            Route::get("/:id", "find_one", |_: Arc<CatsController>, mut p: Params| async move {
                let id: u32 = p.take(0)?;
                let fields: Option<String> = p.take(1)?;
                if id != 1 {
                    return Err(CatNotFound(id).into());
                }
                Ok::<_, anyhow::Error>(json!({"id": id, "name": "Tom", "fields": fields}))
            })
            .param(extract::path_as::<u32>("id"))
            .param(extract::query("fields")),
        )
        .route(
            Route::get("/strict/:id", "find_strict", |_: Arc<CatsController>, mut p: Params| async move {
                let id: u32 = p.take(0)?;
                Err::<Value, anyhow::Error>(CatNotFound(id).into())
            })
            .param(extract::path_as::<u32>("id"))
            .filter(FilterBinding::catching::<CatNotFound, _>(TagFilter("handler"))),
        )
        .route(Route::get("/errors/boom", "boom", |_: Arc<CatsController>, _| async move {
            Err::<Value, _>(anyhow::anyhow!("kaboom"))
        }))
        .route(
            Route::get("/whoami/me", "whoami", |_: Arc<CatsController>, mut p: Params| async move {
                let user: Option<User> = p.take(0)?;
                Ok::<_, anyhow::Error>(user)
            })
            .param(extract::state::<User>()),
        )
        .route(Route::get("/serial/now", "serial", |c: Arc<CatsController>, _| async move {
            Ok(c.serial)
        }))
        .route(
            Route::get("/echo/path", "echo", |_: Arc<CatsController>, mut p: Params| async move {
                let echo: Arc<RequestEcho> = p.take(0)?;
                Ok::<_, anyhow::Error>(echo.0.clone())
            })
            .param(extract::inject::<RequestEcho>(Token::of::<RequestEcho>())),
        )
}

fn cats_module(log: &CallLog, customize: fn(Controller) -> Controller) -> DynamicModule {
    DynamicModule::register("CatsModule", (log.clone(), customize), |(log, customize)| {
        ModuleDescriptor::new()
            .provider(Provider::value("LOG", log))
            .class::<RequestEcho>()
            .controller(customize(cats_controller()))
    })
}

async fn boot(
    log: &CallLog,
    customize: fn(Controller) -> Controller,
    configure: impl FnOnce(ApplicationBuilder) -> ApplicationBuilder,
) -> (Application, InMemoryAdapter) {
    let builder = Application::builder(cats_module(log, customize));
    let app = configure(builder).build().await.unwrap();
    let mut adapter = InMemoryAdapter::new();
    app.attach_routes(&mut adapter);
    (app, adapter)
}

fn unchanged(c: Controller) -> Controller {
    c
}

// ---------- Enhancers ----------

struct Trace {
    name: &'static str,
    log: CallLog,
}

#[async_trait]
impl Interceptor for Trace {
    async fn intercept(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> anyhow::Result<Value> {
        self.log.push(format!("{}-before", self.name));
        let value = next.run(ctx).await?;
        self.log.push(format!("{}-after", self.name));
        Ok(value)
    }
}

/// Injected through the container; logs as `Y`.
struct InjectedTrace {
    log: Arc<CallLog>,
}

impl Injectable for InjectedTrace {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::token("LOG")]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self { log: args.next()? })
    }
}

#[async_trait]
impl Interceptor for InjectedTrace {
    async fn intercept(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> anyhow::Result<Value> {
        self.log.push("Y-before");
        let value = next.run(ctx).await?;
        self.log.push("Y-after");
        Ok(value)
    }
}

struct Envelope;

#[async_trait]
impl Interceptor for Envelope {
    async fn intercept(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> anyhow::Result<Value> {
        let value = next.run(ctx).await?;
        Ok(json!({ "data": value }))
    }
}

struct Cached;

#[async_trait]
impl Interceptor for Cached {
    async fn intercept(&self, _ctx: &mut ExecutionContext, _next: Next<'_>) -> anyhow::Result<Value> {
        Ok(json!("cached"))
    }
}

/// Allows a request when its `x-role` header is one of the roles declared
/// on the handler or controller.
struct RolesGuard;

impl Injectable for RolesGuard {
    fn construct(_: &mut Args) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl Guard for RolesGuard {
    async fn can_activate(&self, ctx: &mut ExecutionContext) -> anyhow::Result<bool> {
        let Some(required) = ctx
            .reflector()
            .get_all_and_override::<Vec<&'static str>>(ROLES)
        else {
            return Ok(true);
        };
        let role = ctx.request().header("x-role").unwrap_or_default();
        Ok(required.iter().any(|r| *r == role))
    }
}

/// Puts the caller into the context state.
struct AuthGuard;

#[async_trait]
impl Guard for AuthGuard {
    async fn can_activate(&self, ctx: &mut ExecutionContext) -> anyhow::Result<bool> {
        let Some(name) = ctx.request().header("x-user").map(str::to_owned) else {
            return Err(HttpException::unauthorized("token required").into());
        };
        ctx.state_mut().insert(User { name });
        Ok(true)
    }
}

struct TagFilter(&'static str);

#[async_trait]
impl ExceptionFilter for TagFilter {
    async fn catch(
        &self,
        error: anyhow::Error,
        _ctx: &mut ExecutionContext,
    ) -> anyhow::Result<Response> {
        Ok(Response::new(
            StatusCode::IM_A_TEAPOT,
            json!({ "filter": self.0, "message": error.to_string() }),
        ))
    }
}

struct FailingFilter;

#[async_trait]
impl ExceptionFilter for FailingFilter {
    async fn catch(
        &self,
        _error: anyhow::Error,
        _ctx: &mut ExecutionContext,
    ) -> anyhow::Result<Response> {
        anyhow::bail!("filter broke")
    }
}

// ---------- Routing ----------

#[tokio::test]
async fn routes_are_mapped_with_prefixes() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| b.global_prefix("api")).await;

    let paths: Vec<String> = adapter.routes().into_iter().map(|(_, p)| p).collect();
    assert!(paths.contains(&"/api/cats".to_string()));
    assert!(paths.contains(&"/api/cats/:id".to_string()));

    let response = adapter.dispatch(Request::get("/api/cats")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!(["Tom", "Garfield"]));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| b).await;

    let response = adapter.dispatch(Request::get("/dogs")).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.body,
        json!({"statusCode": 404, "message": "Cannot GET /dogs", "error": "Not Found"})
    );
}

// ---------- Guards ----------

#[tokio::test]
async fn rejecting_guard_short_circuits_with_403() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| {
        b.global_guard(GuardBinding::guard(FnGuard(|_: &ExecutionContext| false)))
    })
    .await;

    let response = adapter.dispatch(Request::get("/cats")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.body,
        json!({"statusCode": 403, "message": "Forbidden resource", "error": "Forbidden"})
    );
    assert!(log.is_empty(), "handler must not run");
}

#[tokio::test]
async fn roles_guard_reads_handler_metadata() {
    fn with_roles(c: Controller) -> Controller {
        c.guard(GuardBinding::injected_guard::<RolesGuard>())
    }
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, with_roles, |b| b).await;
    let body = json!({"name": "Tom", "age": 3});

    let denied = adapter
        .dispatch(Request::post("/cats", body.clone()).with_header("x-role", "reader"))
        .await
        .unwrap();
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert!(log.is_empty());

    let created = adapter
        .dispatch(
            Request::post("/cats", body.clone())
                .with_header("x-role", "admin")
                .with_header("x-trace", "t-1"),
        )
        .await
        .unwrap();
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body, body);
    assert_eq!(log.entries(), vec!["create:Tom:t-1"]);

    // no roles declared on find_all
    let listed = adapter.dispatch(Request::get("/cats")).await.unwrap();
    assert_eq!(listed.status, StatusCode::OK);
}

#[tokio::test]
async fn guard_error_keeps_its_status_and_guard_state_reaches_handler() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| b.global_guard(GuardBinding::guard(AuthGuard))).await;

    let anonymous = adapter.dispatch(Request::get("/cats/whoami/me")).await.unwrap();
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["message"], "token required");

    let known = adapter
        .dispatch(Request::get("/cats/whoami/me").with_header("x-user", "alice"))
        .await
        .unwrap();
    assert_eq!(known.body, json!({"name": "alice"}));
}

// ---------- Interceptors ----------

#[tokio::test]
async fn interceptors_wrap_the_handler_like_an_onion() {
    fn with_y(c: Controller) -> Controller {
        c.interceptor(InterceptorBinding::injected_interceptor::<InjectedTrace>())
    }
    let log = CallLog::new();
    let x = Trace {
        name: "X",
        log: log.clone(),
    };
    let (_app, adapter) = boot(&log, with_y, |b| {
        b.global_interceptor(InterceptorBinding::interceptor(x))
    })
    .await;

    adapter.dispatch(Request::get("/cats")).await.unwrap();
    assert_eq!(
        log.entries(),
        vec!["X-before", "Y-before", "handler", "Y-after", "X-after"]
    );
}

#[tokio::test]
async fn interceptor_can_transform_the_result() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| {
        b.global_interceptor(InterceptorBinding::interceptor(Envelope))
    })
    .await;

    let response = adapter.dispatch(Request::get("/cats")).await.unwrap();
    assert_eq!(response.body, json!({"data": ["Tom", "Garfield"]}));
}

#[tokio::test]
async fn interceptor_can_short_circuit_the_handler() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| {
        b.global_interceptor(InterceptorBinding::interceptor(Cached))
    })
    .await;

    let response = adapter.dispatch(Request::get("/cats")).await.unwrap();
    assert_eq!(response.body, json!("cached"));
    assert!(log.is_empty());
}

// ---------- Exception filters ----------

#[tokio::test]
async fn typed_filter_wins_over_less_specific_catch_all() {
    fn with_catch_all(c: Controller) -> Controller {
        c.filter(FilterBinding::catch_all(TagFilter("controller")))
    }
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, with_catch_all, |b| {
        b.global_filter(FilterBinding::catching::<CatNotFound, _>(TagFilter("global")))
    })
    .await;

    let typed = adapter.dispatch(Request::get("/cats/7")).await.unwrap();
    assert_eq!(typed.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(typed.body["filter"], "global");
    assert_eq!(typed.body["message"], "cat 7 not found");

    let handler_level = adapter.dispatch(Request::get("/cats/strict/7")).await.unwrap();
    assert_eq!(handler_level.body["filter"], "handler");

    let untyped = adapter.dispatch(Request::get("/cats/errors/boom")).await.unwrap();
    assert_eq!(untyped.body["filter"], "controller");
}

#[tokio::test]
async fn unhandled_error_becomes_500_with_its_message() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| b).await;

    let response = adapter.dispatch(Request::get("/cats/errors/boom")).await.unwrap();
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body,
        json!({"statusCode": 500, "message": "kaboom", "error": "Internal Server Error"})
    );
}

#[tokio::test]
async fn failing_filter_surfaces_to_the_adapter() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| {
        b.global_filter(FilterBinding::catch_all(FailingFilter))
    })
    .await;

    match adapter.dispatch(Request::get("/cats/errors/boom")).await {
        Err(PipelineError::FilterFailure { original, source }) => {
            assert_eq!(original, "kaboom");
            assert_eq!(source.to_string(), "filter broke");
        }
        other => panic!("expected FilterFailure, got {other:?}"),
    }
}

// ---------- Parameters and scopes ----------

#[tokio::test]
async fn handler_parameters_are_extracted() {
    let log = CallLog::new();
    let (_app, adapter) = boot(&log, unchanged, |b| b).await;

    let found = adapter
        .dispatch(Request::get("/cats/1").with_query("fields", "name"))
        .await
        .unwrap();
    assert_eq!(found.body, json!({"id": 1, "name": "Tom", "fields": "name"}));

    let malformed = adapter.dispatch(Request::get("/cats/tom")).await.unwrap();
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let bad_body = adapter
        .dispatch(Request::post("/cats", json!({"name": 5})))
        .await
        .unwrap();
    assert_eq!(bad_body.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_provider_sees_the_current_request() {
    let log = CallLog::new();
    let (app, adapter) = boot(&log, unchanged, |b| b).await;

    let response = adapter.dispatch(Request::get("/cats/echo/path")).await.unwrap();
    assert_eq!(response.body, json!("/cats/echo/path"));

    let module = app.graph().find("CatsModule").unwrap();
    assert_eq!(module.scope_of(&Token::of::<RequestEcho>()), Some(Scope::Request));
}

#[tokio::test]
async fn controller_scope_decides_instance_sharing() {
    fn per_request(c: Controller) -> Controller {
        c.scope(Scope::Request)
    }

    let log = CallLog::new();
    let (_app, singleton) = boot(&log, unchanged, |b| b).await;
    let a = singleton.dispatch(Request::get("/cats/serial/now")).await.unwrap();
    let b = singleton.dispatch(Request::get("/cats/serial/now")).await.unwrap();
    assert_eq!(a.body, b.body);

    let (_app, scoped) = boot(&log, per_request, |b| b).await;
    let a = scoped.dispatch(Request::get("/cats/serial/now")).await.unwrap();
    let b = scoped.dispatch(Request::get("/cats/serial/now")).await.unwrap();
    assert_ne!(a.body, b.body);
}
