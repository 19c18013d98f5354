use std::{sync::Arc, time::Duration};

use crate::{
    api::{Doctl, PowerApi},
    config::Config,
    docs::ApiDocs,
    error::ConfigError,
    idle::IdleTimer,
    liveness::Liveness,
    machine::Machines,
    mc_server::McServers,
    vps::{DropletProbe, Vps},
};

/// Everything the route handlers share.
pub struct AppState<A, L> {
    pub vps: Arc<Vps<A, L>>,
    pub machines: Machines,
    pub mc_servers: McServers,
    pub docs: ApiDocs,
}

impl<A, L> AppState<A, L>
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    /// Builds the shared state around an already constructed VPS.
    pub fn new(config: &Config, vps: Arc<Vps<A, L>>) -> Result<Self, ConfigError> {
        let probe_timeout = Duration::from_millis(config.vps.probe_timeout_ms);
        Ok(Self {
            vps,
            machines: Machines::from_config(&config.machines, probe_timeout)?,
            mc_servers: McServers::from_config(&config.mc_server, probe_timeout),
            docs: ApiDocs::load(&config.docs_dir),
        })
    }
}

pub type DropletState = AppState<Arc<Doctl>, DropletProbe>;

impl DropletState {
    /// The production wiring: `doctl` for power, a droplet probe for liveness.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let doctl = Arc::new(Doctl::from_env()?);
        let droplet_id = config.vps.droplet_id.to_string();
        let probe = DropletProbe::new(
            Arc::clone(&doctl),
            droplet_id.clone(),
            config.vps.vps_hostname.clone(),
            Duration::from_millis(config.vps.probe_timeout_ms),
        );
        let timer = IdleTimer::new(doctl, probe, droplet_id, config.vps.idle_timer());

        Self::new(config, Arc::new(Vps::new(timer)))
    }
}
