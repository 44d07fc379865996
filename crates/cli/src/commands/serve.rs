//! `stepweave serve` — Start the HTTP API server.

use stepweave_config::AppConfig;

use super::build_backend;

pub async fn run(
    port_override: Option<u16>,
    backend: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    let backend = build_backend(backend.as_deref(), &config)?;

    println!("Stepweave Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {}", backend.name());

    stepweave_gateway::start(config, backend).await?;

    Ok(())
}
