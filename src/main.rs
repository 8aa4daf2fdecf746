// src/main.rs
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use governor::RateLimiter;
use log::{info, warn};

use srcquery::config::{Config, QueryConfig};
use srcquery::handlers;
use srcquery::service::QueryService;
use srcquery::utils::IpRateLimiter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();

    let query_config = match QueryConfig::load(&config.config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    let service = QueryService::from_config(&query_config);
    if let Err(e) = service.reload_mapnames(&query_config.mapnames_db) {
        warn!("Map database unavailable, map codes will be shown raw: {}", e);
    }
    let service = web::Data::new(service);

    let rate_limiter: web::Data<IpRateLimiter> =
        web::Data::new(RateLimiter::keyed(config.query_quota()));

    let bind = format!("{}:{}", config.bind_address, config.port);
    let config = web::Data::new(config);

    info!("Starting server on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(config.clone())
            .app_data(rate_limiter.clone())
            .route("/", web::get().to(handlers::index::index))
            .route("/query", web::get().to(handlers::query::query))
            .route("/server/{group}/{name}", web::get().to(handlers::query::server))
            .route("/refresh", web::post().to(handlers::refresh::refresh))
    })
    .bind(&bind)?
    .run()
    .await
}
