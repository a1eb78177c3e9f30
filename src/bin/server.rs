use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use rusty_fleet::auth::crypto::SigningKey;
use rusty_fleet::auth::system_identity::default_system_identity_factory;
use rusty_fleet::config::HostConfig;
use rusty_fleet::handlers::routes;
use rusty_fleet::services::HostServicesBuilder;
use rusty_fleet::storage::MemoryCredentialStore;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    let config = match HostConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, data={}",
        config.server.host,
        config.server.port,
        config.server.data_directory.display()
    );

    let signing_key = match SigningKey::load_or_create(&config.signing_key_path()) {
        Ok(key) => key,
        Err(e) => {
            error!("Failed to load token signing key: {}", e);
            std::process::exit(1);
        }
    };

    let identity_factory = default_system_identity_factory(&config.security);
    let services = match HostServicesBuilder::new(config.clone(), Arc::new(MemoryCredentialStore::new()), signing_key)
        .with_system_identity_factory(identity_factory)
        .build()
    {
        Ok(services) => services,
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = services.users.ensure_admin_user(&CancellationToken::new()).await {
        error!("Failed to create the default administrator: {}", e);
        std::process::exit(1);
    }

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.server.host, config.server.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let server = warp::serve(routes(services));

    match (
        config.server.enable_tls,
        config.server.tls_cert_path.as_deref(),
        config.server.tls_key_path.as_deref(),
    ) {
        (true, Some(cert_path), Some(key_path)) => {
            info!("Starting Rusty Fleet server on https://{}", addr);
            server.tls().cert_path(cert_path).key_path(key_path).run(addr).await;
        }
        _ => {
            info!("Starting Rusty Fleet server on http://{}", addr);
            server.run(addr).await;
        }
    }
}
