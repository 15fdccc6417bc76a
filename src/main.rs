use actix_web::{App, HttpServer, web};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod api;
mod cli;
mod config;
mod migration;
mod registry;
mod shutdown;
mod storage;

use crate::api::{
    health::{health_config, HealthState},
    validation,
};
use crate::migration::{handlers::migration_config, Engine};
use crate::registry::JsonFileRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::storage::FsObjectStore;

fn init_logging(log_dir: &std::path::Path) {
    // logs/info.log.2024-12-22, logs/error.log.2024-12-22, ...
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "info.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "warn.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "error.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "debug.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = cli::Cli::parse();

    let mut config = config::Config::from_env()
        .expect("Failed to load configuration");
    cli.apply(&mut config);

    if cli.check_config {
        println!("{:#?}", config);
        return Ok(());
    }

    std::fs::create_dir_all(&config.log_dir)
        .expect("Failed to create logs directory");
    init_logging(&config.log_dir);

    info!("Starting meta-migrator");
    info!("Configuration loaded successfully:");
    info!("  - Max concurrent jobs: {}", config.max_concurrent_jobs);
    info!("  - Max attempts per job: {}", config.max_retries);
    info!("  - Batch size: {} x {} concurrent batches", config.migration.batch_size, config.migration.concurrent_batches);
    info!("  - Object store root: {}", config.store_root.display());
    info!("  - Tenant registry: {}", config.apps_file.display());

    std::fs::create_dir_all(&config.store_root)
        .expect("Failed to create object store root");
    let objects = Arc::new(FsObjectStore::new(&config.store_root, config.list_page_size));
    let registry = Arc::new(
        JsonFileRegistry::load(&config.apps_file)
            .expect("Failed to load tenant registry"),
    );

    let engine = Engine::new(&config, objects, registry);
    let service = engine.service.clone();

    // watch channel: every background loop sees the same shutdown flag
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_handles = engine.start(shutdown_rx);

    let max_payload_size = config.max_payload_size;
    let store_root = config.store_root.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(service.clone()))
            .app_data(web::Data::new(HealthState {
                store_root: store_root.clone(),
            }))
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(validation::json_config())
            .configure(health_config)
            .configure(migration_config)
    });

    info!("Server starting on http://{}", config.bind_addr);

    let server = server.bind(config.bind_addr.as_str())?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator = ShutdownCoordinator::new(
        server_handle,
        server_task,
        loop_handles,
        shutdown_tx,
    );

    coordinator.wait_for_shutdown().await
}
