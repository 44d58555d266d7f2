use anyhow::Result;
use cats::domain::model::NewCat;
use cats::{CatsModule, StorageOptions};
use clap::{Parser, Subcommand};
use wirekit::runtime::{run, RunOptions, ShutdownOptions};
use wirekit::{
    Application, ConfigModule, ConfigProvider, DynamicModule, InMemoryAdapter, ModuleDescriptor,
    Request,
};
use wirekit_bootstrap::{AppConfig, AppConfigProvider, CliArgs};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Wirekit demo - the cats application on the in-process adapter
#[derive(Parser)]
#[command(name = "wirekit-demo")]
#[command(about = "Wirekit demo - the cats application on the in-process adapter")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot the application and serve until a shutdown signal
    Run,
    /// Validate configuration and the module graph, then exit
    Check,
    /// Print the route table and exit
    Routes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    wirekit_bootstrap::init_logging_unified(&logging_config, Path::new(&config.server.home_dir));

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_app(config).await,
        Commands::Check => check_config(config).await,
        Commands::Routes => print_routes(config).await,
    }
}

/// Root module: configuration plus the cats feature with a small seed.
fn app_module(config: &AppConfig) -> DynamicModule {
    let provider: Arc<dyn ConfigProvider> = Arc::new(AppConfigProvider::new(config.clone()));
    let storage = StorageOptions::seeded([
        NewCat::new("Tom", 3).with_breed("Tabby"),
        NewCat::new("Garfield", 7).with_breed("Persian"),
    ]);
    DynamicModule::register("AppModule", (provider, storage), |(provider, storage)| {
        ModuleDescriptor::new()
            .import(ConfigModule::for_root(provider))
            .import(CatsModule::register(storage))
    })
}

async fn boot(config: &AppConfig) -> Result<(Application, InMemoryAdapter)> {
    let app = Application::builder(app_module(config))
        .global_prefix(config.server.global_prefix.clone())
        .build()
        .await?;
    let mut adapter = InMemoryAdapter::new();
    app.attach_routes(&mut adapter);
    Ok((app, adapter))
}

async fn run_app(config: AppConfig) -> Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Wirekit demo starting"
    );
    let (app, adapter) = boot(&config).await?;

    // Smoke request through the full pipeline.
    let path = match config.server.global_prefix.trim_matches('/') {
        "" => "/cats".to_string(),
        prefix => format!("/{prefix}/cats"),
    };
    let response = adapter
        .dispatch(Request::get(path).with_header("x-roles", "read"))
        .await?;
    tracing::info!(status = %response.status, body = %response.body, "Smoke request");

    run(
        &app,
        RunOptions {
            shutdown: ShutdownOptions::Signals,
        },
    )
    .await
}

async fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let (app, _adapter) = boot(&config).await?;
    println!(
        "Configuration is valid ({} modules)",
        app.graph().modules().len()
    );
    app.close(None).await;
    Ok(())
}

async fn print_routes(config: AppConfig) -> Result<()> {
    let (app, adapter) = boot(&config).await?;
    for (method, path) in adapter.routes() {
        println!("{method:<7} {path}");
    }
    app.close(None).await;
    Ok(())
}
