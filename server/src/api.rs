use std::{env, future::Future, sync::Arc};

use anyhow::anyhow;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::{error::ConfigError, exec};

pub trait PowerApi: Send + Sync {
    fn power_on(&self, resource_id: String) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn power_off(&self, resource_id: String) -> impl Future<Output = anyhow::Result<()>> + Send;
}

impl<T: PowerApi> PowerApi for Arc<T> {
    fn power_on(&self, resource_id: String) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.as_ref().power_on(resource_id)
    }

    fn power_off(&self, resource_id: String) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.as_ref().power_off(resource_id)
    }
}

/// DigitalOcean droplets driven through the `doctl` CLI.
pub struct Doctl {
    token: String,
    authenticated: OnceCell<()>,
}

impl Doctl {
    /// Fails when `DIGITAL_OCEAN_API_TOKEN` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("DIGITAL_OCEAN_API_TOKEN")
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingEnv("DIGITAL_OCEAN_API_TOKEN"))?;
        Ok(Self::new(token))
    }

    pub fn new(token: String) -> Self {
        Self {
            token,
            authenticated: OnceCell::new(),
        }
    }

    /// `doctl auth init` happens once, before the first command. A failed
    /// attempt is retried by the next command.
    async fn ensure_auth(&self) -> anyhow::Result<()> {
        self.authenticated
            .get_or_try_init(|| async {
                match exec::run_checked("doctl", &["auth", "init", "-t", &self.token]).await {
                    Ok(_) => {
                        info!("Successfully authenticated doctl");
                        Ok(())
                    }
                    Err(err) => {
                        error!("Invalid Digital Ocean API token: {err:#}");
                        Err(err)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    async fn droplet_action(&self, action: &str, droplet_id: &str) -> anyhow::Result<()> {
        self.ensure_auth().await?;
        exec::run_checked("doctl", &["compute", "droplet-action", action, droplet_id])
            .await
            .map_err(|err| anyhow!("doctl failed to {action} droplet {droplet_id}: {err:#}"))?;
        Ok(())
    }

    /// Public IPv4 address of a droplet.
    pub async fn public_ipv4(&self, droplet_id: &str) -> anyhow::Result<String> {
        self.ensure_auth().await?;
        let output = exec::run_checked(
            "doctl",
            &[
                "compute",
                "droplet",
                "get",
                droplet_id,
                "--format",
                "PublicIPv4",
                "--no-header",
            ],
        )
        .await?;

        let address = output.stdout.trim();
        if address.is_empty() {
            return Err(anyhow!("droplet {droplet_id} has no public address"));
        }
        Ok(address.to_string())
    }
}

impl PowerApi for Doctl {
    async fn power_on(&self, resource_id: String) -> anyhow::Result<()> {
        self.droplet_action("power-on", &resource_id).await?;
        info!(droplet_id = %resource_id, "Powering on droplet");
        Ok(())
    }

    async fn power_off(&self, resource_id: String) -> anyhow::Result<()> {
        self.droplet_action("power-off", &resource_id).await?;
        info!(droplet_id = %resource_id, "Powering off droplet");
        Ok(())
    }
}
