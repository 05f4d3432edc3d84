use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use fieldgate::config::Settings;
use fieldgate::inference::HttpInferenceClient;
use fieldgate::orchestrator::Orchestrator;
use fieldgate::server::{self, routes};
use fieldgate::store;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;

    let filter = EnvFilter::try_new(&settings.rust_log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = HttpInferenceClient::new(&settings.ml_service_url, settings.inference_timeout())?;
    let store = store::from_settings(
        settings.mongo_uri.as_deref(),
        &settings.mongo_database,
        settings.store_timeout(),
    )
    .await;

    let orchestrator = web::Data::new(
        Orchestrator::new(Arc::new(client), store)
            .with_store_timeout(settings.store_timeout())
            .with_max_image_bytes(settings.max_image_bytes),
    );

    let addr = settings.bind_addr();
    info!(
        "listening on {}:{}, forwarding inference to {}",
        addr.0, addr.1, settings.ml_service_url
    );

    HttpServer::new(move || {
        App::new()
            .app_data(orchestrator.clone())
            .app_data(server::json_config())
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .configure(routes::configure)
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?
    .run()
    .await?;

    Ok(())
}
