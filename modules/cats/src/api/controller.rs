use std::sync::Arc;

use http::{Method, StatusCode};
use wirekit::pipeline::extract;
use wirekit::{
    Args, Controller, Dependency, FilterBinding, GuardBinding, Injectable, InterceptorBinding,
    Params, Route,
};

use super::filter::CatsErrorFilter;
use super::guard::{Principal, Role, RolesGuard, ROLES};
use super::interceptor::TimingInterceptor;
use crate::domain::error::CatsError;
use crate::domain::model::NewCat;
use crate::domain::service::CatsService;

pub struct CatsController {
    service: Arc<CatsService>,
}

impl Injectable for CatsController {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<CatsService>()]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self {
            service: args.next()?,
        })
    }
}

/// `/cats`: reads need `read`, writes need `write`.
pub fn cats_controller() -> Controller {
    Controller::new::<CatsController>("cats")
        .guard(GuardBinding::injected_guard::<RolesGuard>())
        .interceptor(InterceptorBinding::interceptor(TimingInterceptor))
        .filter(FilterBinding::catching::<CatsError, _>(CatsErrorFilter))
        .metadata(ROLES, vec![Role::Read, Role::Write])
        .route(
            Route::get("/", "find_all", |c: Arc<CatsController>, mut p: Params| async move {
                let limit: Option<String> = p.take(0)?;
                let limit = match limit {
                    Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
                        wirekit::HttpException::bad_request(format!("invalid limit: {raw}"))
                    })?),
                    None => None,
                };
                c.service.list(limit).await
            })
            .param(extract::query("limit")),
        )
        .route(
            Route::get("/:id", "find_one", |c: Arc<CatsController>, mut p: Params| async move {
                c.service.get(p.take(0)?).await
            })
            .param(extract::path_as::<u32>("id")),
        )
        .route(
            Route::post("/", "create", |c: Arc<CatsController>, mut p: Params| async move {
                let cat: NewCat = p.take(0)?;
                c.service.create(cat).await
            })
            .param(extract::body::<NewCat>())
            .metadata(ROLES, vec![Role::Write]),
        )
        .route(
            Route::new(Method::DELETE, "/:id", "remove", |c: Arc<CatsController>, mut p: Params| async move {
                c.service.remove(p.take(0)?).await
            })
            .param(extract::path_as::<u32>("id"))
            .status(StatusCode::NO_CONTENT)
            .metadata(ROLES, vec![Role::Write]),
        )
        .route(
            Route::get("/me/roles", "whoami", |_: Arc<CatsController>, mut p: Params| async move {
                let principal: Option<Principal> = p.take(0)?;
                Ok::<_, anyhow::Error>(principal)
            })
            .param(extract::state::<Principal>()),
        )
}
