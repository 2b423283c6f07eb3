use std::path::Path;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use log::{error, info, warn};

use aperi_solve::api;
use aperi_solve::app_state::AppState;
use aperi_solve::config::AppConfig;
use aperi_solve::storage::sweeper::SweepWorker;

fn init_logging(config_file: &str) {
    if Path::new(config_file).exists() {
        if let Err(e) = log4rs::init_file(config_file, Default::default()) {
            eprintln!("Failed to load log config {}: {}", config_file, e);
        } else {
            return;
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    warn!("Log config {} unavailable, logging to stderr", config_file);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    init_logging(&config.logging.config_file);

    let app_state = AppState::from_config(config.clone()).map_err(|e| {
        error!("Failed to open artifact store: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e)
    })?;

    if config.storage.sweep_interval_secs > 0 {
        let worker = SweepWorker::new(
            app_state.store.clone(),
            config.storage.ttl(),
            Duration::from_secs(config.storage.sweep_interval_secs),
        );
        worker.start_background();
        info!("Periodic sweep every {}s", config.storage.sweep_interval_secs);
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    info!("Starting server on {}:{}", host, port);

    let state = web::Data::new(app_state);
    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
            .default_service(web::to(api::not_found))
    })
    .workers(config.server.workers)
    .bind((host, port))?
    .run()
    .await
}
