mod auth;
mod config;
mod ingest;
mod interpret;
mod pipeline;
mod predict;
mod preprocess;
mod routes;
#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use auth::jwt::AssertionSigner;
use auth::models::ServiceAccountKey;
use auth::token_service::{TokenService, TokenSource};
use config::{Credentials, GatewayConfig, ModelConfig};
use pipeline::Pipeline;
use predict::client::build_http_client;
use predict::PredictionClient;
use routes::configure_routes;
use std::sync::Arc;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

fn build_pipeline(config: &GatewayConfig) -> std::io::Result<Pipeline> {
    let classes = ModelConfig::load(&config.model_config_path)
        .and_then(|model| model.class_list())
        .map_err(|e| startup_error("Failed to load class list", e))?;
    log::info!(
        "Loaded {} classes from {}",
        classes.len(),
        config.model_config_path.display()
    );

    let http_client = build_http_client(config.timeout)
        .map_err(|e| startup_error("Failed to build HTTP client", e))?;

    let source = match &config.credentials {
        Credentials::StaticToken(token) => {
            log::warn!("Using static access token from GCP_ACCESS_TOKEN");
            TokenSource::Static(token.clone())
        }
        Credentials::ServiceAccountFile(path) => {
            let key = ServiceAccountKey::from_file(path)
                .map_err(|e| startup_error("Failed to read service account key", e))?;
            let signer = AssertionSigner::new(&key)
                .map_err(|e| startup_error("Invalid service account key", e))?;
            log::info!("Authenticating as {}", key.client_email);
            TokenSource::ServiceAccount(signer)
        }
    };
    let tokens = Arc::new(TokenService::new(http_client.clone(), source));

    let client = PredictionClient::new(
        http_client,
        tokens,
        &config.endpoint,
        &config.model_path,
        config.timeout,
    )
    .map_err(|e| startup_error("Invalid prediction endpoint", e))?;

    Ok(Pipeline::new(client, classes, config.max_upload_bytes))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = GatewayConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let pipeline = build_pipeline(&config)?;

    log::info!(
        "Serving {} via {} (timeout {:?}, max upload {} bytes)",
        pipeline.model_resource(),
        config.endpoint,
        config.timeout,
        config.max_upload_bytes
    );

    let bind_address = (config.host.clone(), config.port);
    log::info!("Starting server on {}:{}", bind_address.0, bind_address.1);

    let pipeline = web::Data::new(pipeline);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .configure(configure_routes)
    })
    .bind(bind_address)?
    .run()
    .await
}
