//! Image ingest service
//!
//! Stores raw upload bodies in the images collection. Unlike the device
//! registry it does not retry the initial connection and keeps serving when
//! the store is unreachable; uploads then fail individually.

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use device_registry::{
    config::{AppConfig, Service},
    database, logging,
    image_api::ImageApi,
    store::MongoImageStore,
};
use log::{debug, error, info};
use tokio::signal::unix::{SignalKind, signal};

type IngestApi = ImageApi<MongoImageStore>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    logging::init(env!("CARGO_BIN_NAME"));

    let config = AppConfig::load(Service::ImageIngest).context("failed to load configuration")?;

    let database = database::open(&config.mongo).await?;
    match database::ping(&database).await {
        Ok(()) => info!("connected to MongoDB database {}", config.mongo.database),
        Err(e) => error!("MongoDB connection error: {e:#}"),
    }

    let api = IngestApi::new(MongoImageStore::new(&database, &config.mongo.collection));
    let body_limit = config.server.body_limit_bytes;

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::PayloadConfig::new(body_limit))
            .app_data(web::Data::new(api.clone()))
            .configure(IngestApi::configure)
            .default_service(web::route().to(IngestApi::not_found))
    })
    .bind((config.server.bind_address.as_str(), config.server.port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    info!(
        "listening on {}:{}",
        config.server.bind_address, config.server.port
    );

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
        },
    }

    server_handle.stop(true).await;
    info!("shutdown complete");

    Ok(())
}
