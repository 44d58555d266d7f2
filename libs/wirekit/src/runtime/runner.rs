//! Application runner.
//!
//! Keeps a booted [`Application`] alive until shutdown is requested, then
//! runs its shutdown hooks with the name of the signal that stopped it.
//! Shutdown can be driven by OS signals, an external `CancellationToken`, or
//! an arbitrary future.

use std::{future::Future, pin::Pin, sync::Arc};

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;

use crate::application::Application;
use crate::runtime::shutdown;

/// How the runner should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

pub struct RunOptions {
    pub shutdown: ShutdownOptions,
}

/// Wait → close. The application is expected to be fully started.
pub async fn run(app: &Application, opts: RunOptions) -> anyhow::Result<()> {
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };
    let signal: Arc<ArcSwapOption<String>> = Arc::new(ArcSwapOption::empty());

    match opts.shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            let s = signal.clone();
            tokio::spawn(async move {
                match shutdown::wait_for_shutdown().await {
                    Ok(name) => s.store(Some(Arc::new(name.to_string()))),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "shutdown: primary waiter failed; falling back to ctrl_c()"
                        );
                        let _ = tokio::signal::ctrl_c().await;
                        s.store(Some(Arc::new("SIGINT".to_string())));
                    }
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    cancel.cancelled().await;

    let name = signal.load_full();
    app.close(name.as_deref().map(String::as_str)).await;
    Ok(())
}
