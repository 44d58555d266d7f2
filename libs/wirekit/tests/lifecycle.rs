//! Startup and shutdown hook ordering.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use wirekit::runtime::{run, RunOptions, ShutdownOptions};
use wirekit::{
    async_trait, Application, BootstrapError, DynamicModule, Lifecycle, ModuleDescriptor, Provider,
    Scope,
};

use common::CallLog;

// ---------- Test modules ----------

struct Tracked {
    name: &'static str,
    log: CallLog,
    fail_on: Option<&'static str>,
}

impl Tracked {
    fn record(&self, hook: &'static str, signal: Option<&str>) -> anyhow::Result<()> {
        match signal {
            Some(signal) => self.log.push(format!("{}:{hook}({signal})", self.name)),
            None => self.log.push(format!("{}:{hook}", self.name)),
        }
        if self.fail_on == Some(hook) {
            anyhow::bail!("{} failed in {hook}", self.name);
        }
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for Tracked {
    async fn on_module_init(&self) -> anyhow::Result<()> {
        self.record("init", None)
    }

    async fn on_application_bootstrap(&self) -> anyhow::Result<()> {
        self.record("bootstrap", None)
    }

    async fn before_application_shutdown(&self, signal: Option<&str>) -> anyhow::Result<()> {
        self.record("before", signal)
    }

    async fn on_module_destroy(&self) -> anyhow::Result<()> {
        self.record("destroy", None)
    }

    async fn on_application_shutdown(&self, signal: Option<&str>) -> anyhow::Result<()> {
        self.record("shutdown", signal)
    }
}

#[derive(Clone)]
struct Options {
    log: CallLog,
    fail_on: Option<&'static str>,
    imports: Vec<DynamicModule>,
}

/// A module owning one hooked singleton registered under its own name.
fn tracked(name: &'static str, options: Options) -> DynamicModule {
    DynamicModule::register(name, options, move |options| {
        let Options {
            log,
            fail_on,
            imports,
        } = options;
        let mut descriptor = ModuleDescriptor::new().provider(
            Provider::factory(name, [], move |_| {
                let log = log.clone();
                async move { Ok::<_, anyhow::Error>(Tracked { name, log, fail_on }) }
            })
            .with_lifecycle::<Tracked>(),
        );
        for import in imports {
            descriptor = descriptor.import(import);
        }
        descriptor
    })
}

fn opts(log: &CallLog, imports: Vec<DynamicModule>) -> Options {
    Options {
        log: log.clone(),
        fail_on: None,
        imports,
    }
}

/// Root -> A -> B
fn chain(log: &CallLog, fail: Option<(&'static str, &'static str)>) -> DynamicModule {
    let with_failure = |name: &'static str, mut o: Options| {
        if let Some((module, hook)) = fail {
            if module == name {
                o.fail_on = Some(hook);
            }
        }
        o
    };
    let b = tracked("B", with_failure("B", opts(log, vec![])));
    let a = tracked("A", with_failure("A", opts(log, vec![b])));
    tracked("Root", with_failure("Root", opts(log, vec![a])))
}

// ---------- Tests ----------

#[tokio::test]
async fn startup_runs_init_then_bootstrap_in_initialization_order() {
    let log = CallLog::new();
    let app = Application::create(chain(&log, None)).await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "B:init",
            "A:init",
            "Root:init",
            "B:bootstrap",
            "A:bootstrap",
            "Root:bootstrap",
        ]
    );

    let names: Vec<&str> = app.graph().modules().iter().map(|m| m.name()).collect();
    assert_eq!(names, vec!["B", "A", "Root"]);
}

#[tokio::test]
async fn global_module_initializes_before_its_consumers() {
    let log = CallLog::new();

    let db_log = log.clone();
    let db = DynamicModule::register("Db", (), move |_| {
        let log = db_log.clone();
        ModuleDescriptor::new()
            .provider(
                Provider::factory("CONN", [], move |_| {
                    let log = log.clone();
                    async move {
                        Ok::<_, anyhow::Error>(Tracked {
                            name: "Db",
                            log,
                            fail_on: None,
                        })
                    }
                })
                .with_lifecycle::<Tracked>(),
            )
            .export("CONN")
            .global()
    });

    let feature_log = log.clone();
    let feature = DynamicModule::register("Feature", (), move |_| {
        let log = feature_log.clone();
        ModuleDescriptor::new().provider(
            Provider::factory("Feature", ["CONN".into()], move |_| {
                let log = log.clone();
                async move {
                    Ok::<_, anyhow::Error>(Tracked {
                        name: "Feature",
                        log,
                        fail_on: None,
                    })
                }
            })
            .with_lifecycle::<Tracked>(),
        )
    });

    let root = DynamicModule::register("Root", (feature, db), |(feature, db)| {
        ModuleDescriptor::new().import(feature).import(db)
    });

    let app = Application::create(root).await.unwrap();
    assert_eq!(
        log.entries(),
        vec!["Db:init", "Feature:init", "Db:bootstrap", "Feature:bootstrap"]
    );

    log.clear();
    app.close(None).await;
    let destroyed: Vec<String> = log
        .entries()
        .into_iter()
        .filter(|e| e.ends_with(":destroy"))
        .collect();
    assert_eq!(destroyed, vec!["Feature:destroy", "Db:destroy"]);
}

#[tokio::test]
async fn shutdown_runs_in_reverse_order_with_signal() {
    let log = CallLog::new();
    let app = Application::create(chain(&log, None)).await.unwrap();
    log.clear();

    app.close(Some("SIGTERM")).await;

    assert_eq!(
        log.entries(),
        vec![
            "Root:before(SIGTERM)",
            "A:before(SIGTERM)",
            "B:before(SIGTERM)",
            "Root:destroy",
            "A:destroy",
            "B:destroy",
            "Root:shutdown(SIGTERM)",
            "A:shutdown(SIGTERM)",
            "B:shutdown(SIGTERM)",
        ]
    );
}

#[tokio::test]
async fn failing_shutdown_hook_does_not_stop_the_rest() {
    let log = CallLog::new();
    let app = Application::create(chain(&log, Some(("A", "destroy"))))
        .await
        .unwrap();
    log.clear();

    app.close(None).await;

    let entries = log.entries();
    assert!(entries.contains(&"B:destroy".to_string()));
    assert!(entries.contains(&"B:shutdown".to_string()));
    assert_eq!(entries.len(), 9);
    assert!(app.is_closed());
}

#[tokio::test]
async fn close_is_idempotent() {
    let log = CallLog::new();
    let app = Application::create(chain(&log, None)).await.unwrap();
    log.clear();

    app.close(None).await;
    let first = log.entries().len();
    app.close(Some("SIGINT")).await;
    assert_eq!(log.entries().len(), first);
}

#[tokio::test]
async fn failing_init_hook_aborts_startup() {
    let log = CallLog::new();
    match Application::create(chain(&log, Some(("A", "init")))).await {
        Err(BootstrapError::Hook {
            module,
            hook,
            source,
        }) => {
            assert_eq!(module, "A");
            assert_eq!(hook, "on_module_init");
            assert_eq!(source.to_string(), "A failed in init");
        }
        other => panic!("expected Hook error, got {:?}", other.err()),
    }
    assert_eq!(log.entries(), vec!["B:init", "A:init"]);
}

// ---------- Module-level hooks and scopes ----------

struct ModuleHooks {
    log: CallLog,
}

#[async_trait]
impl Lifecycle for ModuleHooks {
    async fn on_module_init(&self) -> anyhow::Result<()> {
        self.log.push("module:init");
        Ok(())
    }

    async fn on_module_destroy(&self) -> anyhow::Result<()> {
        self.log.push("module:destroy");
        Ok(())
    }
}

#[tokio::test]
async fn module_hooks_run_after_provider_hooks_and_only_singletons_are_hooked() {
    let log = CallLog::new();
    let module = DynamicModule::register("Hooked", log.clone(), |log| {
        let transient_log = log.clone();
        let singleton_log = log.clone();
        ModuleDescriptor::new()
            .provider(
                Provider::factory("TRANSIENT", [], move |_| {
                    let log = transient_log.clone();
                    async move {
                        Ok::<_, anyhow::Error>(Tracked {
                            name: "transient",
                            log,
                            fail_on: None,
                        })
                    }
                })
                .scope(Scope::Transient)
                .with_lifecycle::<Tracked>(),
            )
            .provider(
                Provider::factory("SINGLETON", [], move |_| {
                    let log = singleton_log.clone();
                    async move {
                        Ok::<_, anyhow::Error>(Tracked {
                            name: "singleton",
                            log,
                            fail_on: None,
                        })
                    }
                })
                .with_lifecycle::<Tracked>(),
            )
            .lifecycle(Arc::new(ModuleHooks { log }))
    });

    let app = Application::create(module).await.unwrap();
    // A transient resolved before startup finished would still not be hooked.
    let _ = app.resolve("TRANSIENT").await.unwrap();

    assert_eq!(
        log.entries(),
        vec!["singleton:init", "module:init", "singleton:bootstrap"]
    );

    log.clear();
    app.close(None).await;
    assert_eq!(
        log.entries(),
        vec![
            "singleton:before",
            "module:destroy",
            "singleton:destroy",
            "singleton:shutdown",
        ]
    );
}

// ---------- Runner ----------

#[tokio::test]
async fn runner_closes_when_token_is_cancelled() {
    let log = CallLog::new();
    let app = Application::create(chain(&log, None)).await.unwrap();
    log.clear();

    let token = CancellationToken::new();
    token.cancel();
    run(
        &app,
        RunOptions {
            shutdown: ShutdownOptions::Token(token),
        },
    )
    .await
    .unwrap();

    assert!(app.is_closed());
    assert_eq!(log.entries().first().map(String::as_str), Some("Root:before"));
}

#[tokio::test]
async fn runner_closes_when_future_completes() {
    let log = CallLog::new();
    let app = Application::create(chain(&log, None)).await.unwrap();

    run(
        &app,
        RunOptions {
            shutdown: ShutdownOptions::Future(Box::pin(async {})),
        },
    )
    .await
    .unwrap();

    assert!(app.is_closed());
}
