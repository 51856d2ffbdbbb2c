// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use soleco_bridge::config::BridgeConfig;
use soleco_bridge::{scheduler, status};
use soleco_core::{DeviceClient, DeviceMonitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("soleco_bridge=info,soleco_core=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "bridge_config.toml".to_owned());
    info!(path = %config_path, "Loading configuration");
    let config = BridgeConfig::from_file(&config_path)?;

    let client = DeviceClient::new(
        config.device.host.clone(),
        config.device.port,
        Duration::from_secs(config.device.timeout_secs),
    );

    // A failed probe is not fatal; the availability machinery owns
    // recovery once polling starts.
    match client.probe().await {
        Ok(()) => info!(addr = %client.addr(), "device reachable"),
        Err(e) => {
            warn!(error = %e, addr = %client.addr(), "device probe failed, polling will keep retrying");
        }
    }

    let monitor = Arc::new(DeviceMonitor::new(client));
    scheduler::spawn_poll_task(Arc::clone(&monitor), &config);

    let app = status::router(monitor);
    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("SolEco Bridge listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
