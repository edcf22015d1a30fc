use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wan_i2v_proxy::{api, config, pipeline::Pipeline, workflow::TemplateStore};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    config::Config::dotenv_load();
    let config = config::Config::new().expect("Failed to load configuration");
    config::Config::print_env_vars();

    let templates = TemplateStore::load_from_dir(&config.workflows_dir).expect("Failed to load workflow templates");
    let (pipeline, engine) = Pipeline::from_config(&config, Arc::new(templates));
    let state = Arc::new(api::AppState { pipeline, engine });
    let app = api::router(state);

    // Run our application with safe parsing
    let host_str = config.api_host.clone();
    let port_str = config.api_port.clone();
    let ip: std::net::IpAddr = host_str.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_HOST '{}', falling back to 127.0.0.1", host_str);
        std::net::IpAddr::from([127, 0, 0, 1])
    });
    let port: u16 = port_str.parse().unwrap_or_else(|_| {
        tracing::warn!("Invalid API_PORT '{}', falling back to 8189", port_str);
        8189
    });
    let socket_address = SocketAddr::new(ip, port);
    tracing::info!("listening on {}", socket_address);
    axum::Server::bind(&socket_address)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await
        .unwrap();
}
