mod analysis;
mod config;
mod detection;
mod error;
mod imaging;
mod routes;
mod vision;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use analysis::Analyzer;
use config::AppConfig;
use routes::{RequestLimits, configure_routes};

fn build_cors(allowed_origins: &[String]) -> Cors {
    let cors = if allowed_origins.iter().any(|origin| origin == "*") {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::AUTHORIZATION,
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let analyzer = Analyzer::from_config(&config).map_err(|e| {
        log::error!("Failed to initialize {} backend: {}", config.backend.as_str(), e);
        std::io::Error::other(e.to_string())
    })?;

    let limits = RequestLimits::from(&config.server);
    if limits.allow_file_path_analysis {
        log::warn!("Server-side file path analysis is enabled");
    }

    let bind_address = config.bind_address();
    let allowed_origins = config.server.allowed_origins.clone();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&allowed_origins))
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(analyzer.clone()))
            .app_data(web::Data::new(limits.clone()))
            .configure(|cfg| configure_routes(cfg, &limits))
    })
    .bind(&bind_address)?
    .run()
    .await
}
