use actix_server::ServerHandle;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use device_registry::{
    api::{self, Api},
    config::{AppConfig, ServerConfig, Service},
    database, logging,
    store::MongoDeviceStore,
};
use log::{debug, error, info};
use tokio::signal::unix::{SignalKind, signal};

type RegistryApi = Api<MongoDeviceStore>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    logging::init(env!("CARGO_BIN_NAME"));

    let config = AppConfig::load(Service::Registry).context("failed to load configuration")?;

    let database = database::connect_with_retry(&config.mongo).await?;
    let device_store = MongoDeviceStore::new(&database, &config.mongo.collection);

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let (server_handle, server_task) = run_server(device_store, &config.server)?;

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

fn run_server(
    device_store: MongoDeviceStore,
    config: &ServerConfig,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let api = RegistryApi::new(device_store);
    let body_limit = config.body_limit_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(api::cors())
            .wrap(api::cors_headers())
            .app_data(web::PayloadConfig::new(body_limit))
            .app_data(web::Data::new(api.clone()))
            .configure(RegistryApi::configure)
            .default_service(web::route().to(RegistryApi::not_found))
    })
    .bind((config.bind_address.as_str(), config.port))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    info!("listening on {}:{}", config.bind_address, config.port);

    Ok((server.handle(), tokio::spawn(server)))
}
