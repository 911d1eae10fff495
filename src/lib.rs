pub mod config;
pub mod currency;
pub mod log;
pub mod providers;
pub mod rate_provider;
pub mod server;
pub mod service;

use actix_web::{App, HttpServer, web};
use anyhow::Result;
use chrono::Duration;
use tracing::{debug, info};
use tracing_actix_web::TracingLogger;

use crate::providers::OpenErApiProvider;
use crate::service::RateService;

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Currency API starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let provider = OpenErApiProvider::new(&config.provider.base_url);
    let service = web::Data::new(RateService::new(
        Box::new(provider),
        Duration::seconds(config.cache.ttl_secs as i64),
    ));

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    info!("Listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(service.clone())
            .configure(server::configure)
            .default_service(web::route().to(server::not_found))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
