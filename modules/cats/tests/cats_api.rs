//! The cats module booted inside an application and driven through the
//! in-memory adapter.

use std::collections::HashMap;
use std::sync::Arc;

use cats::domain::model::NewCat;
use cats::domain::service::CatsService;
use cats::{CatsModule, StorageOptions};
use http::{Method, StatusCode};
use serde_json::{json, Value};
use wirekit::{
    Application, BootstrapError, ConfigModule, ConfigProvider, DynamicModule, GraphError,
    InMemoryAdapter, ModuleDescriptor, Request, Response, Token,
};

struct MapProvider(HashMap<String, Value>);

impl ConfigProvider for MapProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&Value> {
        self.0.get(module_name)
    }
}

fn app_module(config: Value, storage: StorageOptions) -> DynamicModule {
    let mut modules = HashMap::new();
    if !config.is_null() {
        modules.insert("cats".to_string(), json!({ "config": config }));
    }
    let provider: Arc<dyn ConfigProvider> = Arc::new(MapProvider(modules));
    DynamicModule::register("AppModule", (provider, storage), |(provider, storage)| {
        ModuleDescriptor::new()
            .import(ConfigModule::for_root(provider))
            .import(CatsModule::register(storage))
    })
}

fn seed() -> StorageOptions {
    StorageOptions::seeded([
        NewCat::new("Tom", 3).with_breed("Tabby"),
        NewCat::new("Garfield", 7),
        NewCat::new("Felix", 2),
    ])
}

async fn boot(config: Value) -> (Application, InMemoryAdapter) {
    let app = Application::builder(app_module(config, seed()))
        .global_prefix("api")
        .build()
        .await
        .unwrap();
    let mut adapter = InMemoryAdapter::new();
    app.attach_routes(&mut adapter);
    (app, adapter)
}

async fn call(adapter: &InMemoryAdapter, request: Request, roles: &str) -> Response {
    adapter
        .dispatch(request.with_header("x-roles", roles))
        .await
        .unwrap()
}

fn names(body: &Value) -> Vec<&str> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect()
}

// ---------- Reads ----------

#[tokio::test]
async fn readers_list_seeded_cats() {
    let (_app, adapter) = boot(Value::Null).await;

    let response = call(&adapter, Request::get("/api/cats"), "read").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(names(&response.body), vec!["Tom", "Garfield", "Felix"]);
    assert_eq!(response.body[0]["breed"], "Tabby");
    assert!(response.body[1].get("breed").is_none());
}

#[tokio::test]
async fn listing_honours_configured_page_size() {
    let (_app, adapter) = boot(json!({ "page_size": 2 })).await;

    let response = call(&adapter, Request::get("/api/cats"), "read").await;
    assert_eq!(names(&response.body), vec!["Tom", "Garfield"]);

    let response = call(&adapter, Request::get("/api/cats").with_query("limit", "1"), "read").await;
    assert_eq!(names(&response.body), vec!["Tom"]);

    let response = call(&adapter, Request::get("/api/cats").with_query("limit", "lots"), "read").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn anonymous_callers_are_forbidden() {
    let (_app, adapter) = boot(Value::Null).await;

    let response = adapter.dispatch(Request::get("/api/cats")).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_cat_is_rendered_by_the_cats_filter() {
    let (_app, adapter) = boot(Value::Null).await;

    let response = call(&adapter, Request::get("/api/cats/99"), "read").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.body,
        json!({
            "statusCode": 404,
            "message": "cat 99 not found",
            "error": "Not Found",
            "path": "/api/cats/99",
        })
    );

    let response = call(&adapter, Request::get("/api/cats/abc"), "read").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn guard_exposes_the_principal_to_handlers() {
    let (_app, adapter) = boot(Value::Null).await;

    let response = call(&adapter, Request::get("/api/cats/me/roles"), "write,read").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({ "roles": ["write", "read"] }));
}

// ---------- Writes ----------

#[tokio::test]
async fn readers_cannot_create() {
    let (app, adapter) = boot(Value::Null).await;

    let body = json!({ "name": "Kitty", "age": 1 });
    let response = call(&adapter, Request::post("/api/cats", body), "read").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let service = app
        .get::<CatsService>(Token::of::<CatsService>())
        .await
        .unwrap();
    assert_eq!(service.list(None).await.unwrap().len(), 3, "nothing was stored");
}

#[tokio::test]
async fn writers_create_and_remove() {
    let (_app, adapter) = boot(Value::Null).await;

    let body = json!({ "name": "Kitty", "age": 1 });
    let response = call(&adapter, Request::post("/api/cats", body), "write").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body, json!({ "id": 4, "name": "Kitty", "age": 1 }));

    let delete = Request::new(Method::DELETE, "/api/cats/4");
    let response = call(&adapter, delete, "write").await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = call(&adapter, Request::get("/api/cats/4"), "read").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_and_duplicate_cats_are_rejected() {
    let (_app, adapter) = boot(json!({ "max_age": 20 })).await;

    let too_old = json!({ "name": "Old", "age": 25 });
    let response = call(&adapter, Request::post("/api/cats", too_old), "write").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);

    let duplicate = json!({ "name": "tom", "age": 2 });
    let response = call(&adapter, Request::post("/api/cats", duplicate), "write").await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["message"], "a cat named 'tom' already exists");

    let malformed = json!({ "name": "NoAge" });
    let response = call(&adapter, Request::post("/api/cats", malformed), "write").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ---------- Bootstrap ----------

#[tokio::test]
async fn duplicate_seed_aborts_startup() {
    let storage = StorageOptions::seeded([NewCat::new("Tom", 1), NewCat::new("TOM", 2)]);
    let err = Application::create(app_module(Value::Null, storage))
        .await
        .unwrap_err();
    match err {
        BootstrapError::Graph(GraphError::DynamicModule { module, source }) => {
            assert_eq!(module, "StorageModule");
            assert!(source.to_string().contains("TOM"));
        }
        other => panic!("expected DynamicModule error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_module_config_aborts_startup() {
    let err = Application::create(app_module(json!({ "page_size": "many" }), seed()))
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Resolution(_)), "got {err:?}");
}

#[tokio::test]
async fn storage_is_materialized_once_and_closes_cleanly() {
    let (app, _adapter) = boot(Value::Null).await;
    let storage_nodes = app
        .graph()
        .modules()
        .iter()
        .filter(|m| m.name() == "StorageModule")
        .count();
    assert_eq!(storage_nodes, 1);

    app.close(Some("SIGTERM")).await;
    assert!(app.is_closed());
}
