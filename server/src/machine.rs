use std::{collections::HashMap, net::Ipv4Addr, time::Duration};

use anyhow::Context;
use shared::Alias;
use tokio::net::UdpSocket;
use tracing::info;

use crate::{config::MachinesConfig, error::ConfigError, liveness};

const WOL_PORT: u16 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl std::str::FromStr for MacAddr {
    type Err = ConfigError;

    /// Accepts `aa:bb:cc:dd:ee:ff` and `aa-bb-cc-dd-ee-ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidMac(s.to_string());

        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(MacAddr(bytes))
    }
}

impl MacAddr {
    /// Six `0xFF` bytes followed by the address sixteen times.
    pub fn magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFFu8; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

/// Hostnames that can be woken, keyed to their MAC address.
#[derive(Debug)]
pub struct Machines {
    macs: HashMap<Alias, MacAddr>,
    probe_timeout: Duration,
}

impl Machines {
    pub fn from_config(
        config: &MachinesConfig,
        probe_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let macs = config
            .machine_hostnames
            .iter()
            .zip(&config.machine_mac_addrs)
            .map(|(hostname, mac)| Ok::<_, ConfigError>((hostname.clone(), mac.parse::<MacAddr>()?)))
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self {
            macs,
            probe_timeout,
        })
    }

    pub fn mac(&self, hostname: &str) -> Option<MacAddr> {
        self.macs.get(hostname).copied()
    }

    pub async fn is_up(&self, hostname: &str) -> bool {
        liveness::is_reachable(hostname, self.probe_timeout).await
    }

    pub async fn wake(&self, hostname: &str, mac: MacAddr) -> anyhow::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("failed to bind wake socket")?;
        socket.set_broadcast(true)?;
        socket
            .send_to(&mac.magic_packet(), (Ipv4Addr::BROADCAST, WOL_PORT))
            .await
            .with_context(|| format!("failed to send wake packet for {hostname}"))?;

        info!(hostname, "Sent wake packet");
        Ok(())
    }
}
