use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use homelab_server::{
    config::{self, Config},
    logging,
    routes::{self, ROUTE_PATHS},
    state::DropletState,
    vps,
};
use tracing::info;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let config = Config::from_env().context("failed to load configuration")?;
    let port = config::server_port()?;
    let state = Arc::new(DropletState::from_config(&config)?);

    vps::spawn_sync_loop(
        Arc::clone(&state.vps),
        Duration::from_secs(config.vps.sync_interval),
    );

    info!("Server Routes:");
    for path in ROUTE_PATHS {
        info!("- {path}");
    }

    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    info!("Server listening on http://{addr}");
    warp::serve(routes::routes(state)).run(addr).await;
    Ok(())
}
