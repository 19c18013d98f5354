use std::env;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use pnet::datalink::{self, interfaces, Channel};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use reqwest::Url;
use shared::req::ActionRequest;
use shared::VpsAction;
use tokio::net::lookup_host;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
// ssh, dns, ntp
const DEFAULT_IGNORED_PORTS: &[u16] = &[22, 53, 123];

/// Decides which captured frames count as player traffic.
#[derive(Debug, Clone, Default)]
struct ActivityFilter {
    /// Only traffic to or from this port counts when set.
    watch_port: Option<u16>,
    /// Never counts when no watch port is set.
    ignored_ports: Vec<u16>,
    /// The control API; our own refresh requests must not count.
    api_endpoints: Vec<SocketAddrV4>,
}

impl ActivityFilter {
    fn is_activity(&self, frame: &[u8]) -> bool {
        let Some(ethernet) = EthernetPacket::new(frame) else {
            return false;
        };
        if ethernet.get_ethertype() != EtherTypes::Ipv4 {
            return false;
        }
        let Some(ipv4) = Ipv4Packet::new(ethernet.payload()) else {
            return false;
        };

        let ports = match ipv4.get_next_level_protocol() {
            IpNextHeaderProtocols::Tcp => TcpPacket::new(ipv4.payload())
                .map(|tcp| (tcp.get_source(), tcp.get_destination())),
            IpNextHeaderProtocols::Udp => UdpPacket::new(ipv4.payload())
                .map(|udp| (udp.get_source(), udp.get_destination())),
            _ => None,
        };
        let Some((src_port, dst_port)) = ports else {
            return false;
        };

        let src = SocketAddrV4::new(ipv4.get_source(), src_port);
        let dst = SocketAddrV4::new(ipv4.get_destination(), dst_port);
        if self.api_endpoints.contains(&src) || self.api_endpoints.contains(&dst) {
            return false;
        }

        match self.watch_port {
            Some(port) => src_port == port || dst_port == port,
            None => {
                !self.ignored_ports.contains(&src_port) && !self.ignored_ports.contains(&dst_port)
            }
        }
    }
}

/// IPv4 endpoints the API URL resolves to.
async fn resolve_api(api_url: &str) -> anyhow::Result<Vec<SocketAddrV4>> {
    let url =
        Url::parse(api_url).with_context(|| format!("invalid HOMELAB_API_URL {api_url:?}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("HOMELAB_API_URL {api_url:?} has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("HOMELAB_API_URL {api_url:?} has no port"))?;

    let endpoints = lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve {host}"))?
        .filter_map(|addr| match addr {
            SocketAddr::V4(addr) => Some(addr),
            SocketAddr::V6(_) => None,
        })
        .collect();
    Ok(endpoints)
}

fn parse_ports(raw: &str) -> anyhow::Result<Vec<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|port| !port.is_empty())
        .map(|port| {
            port.parse()
                .with_context(|| format!("invalid port {port:?} in IGNORE_PORTS"))
        })
        .collect()
}

fn refresh_interval(secs: Option<u64>) -> anyhow::Result<Duration> {
    let secs = secs.unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
    if secs == 0 {
        bail!("REFRESH_INTERVAL_SECS must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {key} {raw:?}")),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("homelab_client=info")),
        )
        .with_target(false)
        .init();

    let interface_name = env::var("INTERFACE_NAME").context("INTERFACE_NAME is not set")?;
    let api_url = env::var("HOMELAB_API_URL").context("HOMELAB_API_URL is not set")?;
    let every = refresh_interval(env_parse("REFRESH_INTERVAL_SECS")?)?;

    let ignored_ports = match env::var("IGNORE_PORTS") {
        Ok(raw) => parse_ports(&raw)?,
        Err(_) => DEFAULT_IGNORED_PORTS.to_vec(),
    };
    let api_endpoints = resolve_api(&api_url).await?;
    if api_endpoints.is_empty() {
        warn!("HOMELAB_API_URL has no IPv4 address, refresh traffic is not excluded");
    }
    let filter = ActivityFilter {
        watch_port: env_parse("WATCH_PORT")?,
        ignored_ports,
        api_endpoints,
    };

    let interface = interfaces()
        .into_iter()
        .find(|interface| interface.name == interface_name)
        .ok_or_else(|| anyhow!("no interface named {interface_name}"))?;
    let mut rx = match datalink::channel(&interface, Default::default()) {
        Ok(Channel::Ethernet(_, rx)) => rx,
        Ok(_) => return Err(anyhow!("unhandled channel type on {interface}")),
        Err(e) => return Err(e).context("failed to open datalink channel"),
    };

    info!(interface = %interface_name, ?filter, "Watching for activity");

    let num_packets = Arc::new(AtomicU64::new(0));
    let num_packets_clone = Arc::clone(&num_packets);

    let capture = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        loop {
            let frame = rx.next().context("failed to read packet")?;
            if filter.is_activity(frame) {
                num_packets_clone.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let client = reqwest::Client::default();
    let refresh = ActionRequest {
        action: VpsAction::Refresh.as_str().to_string(),
    };
    let refresh_url = format!("{api_url}/api/vps");

    let heartbeat = tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;

            let num_packets = num_packets.swap(0, Ordering::SeqCst);
            if num_packets == 0 {
                debug!("No activity");
                continue;
            }

            let resp = client
                .put(&refresh_url)
                .json(&refresh)
                .send()
                .await
                .and_then(|resp| resp.error_for_status());
            match resp {
                Ok(_) => info!(num_packets, "Refreshed VPS idle timer"),
                Err(err) => warn!("Failed to refresh VPS idle timer: {err}"),
            }
        }
    });

    tokio::select! {
        res = capture => res.context("capture task panicked")?,
        res = heartbeat => {
            res.context("refresh task panicked")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const VPS: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const API: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const PLAYER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

    fn frame(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, transport: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 14 + 20];
        frame[12..14].copy_from_slice(&0x0800u16.to_be_bytes());

        let total_len = (20 + transport.len()) as u16;
        let ip = &mut frame[14..34];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&total_len.to_be_bytes());
        ip[8] = 64;
        ip[9] = proto;
        ip[12..16].copy_from_slice(&src.octets());
        ip[16..20].copy_from_slice(&dst.octets());

        frame.extend_from_slice(transport);
        frame
    }

    fn udp_frame(src: (Ipv4Addr, u16), dst: (Ipv4Addr, u16)) -> Vec<u8> {
        let mut udp = [0u8; 8];
        udp[0..2].copy_from_slice(&src.1.to_be_bytes());
        udp[2..4].copy_from_slice(&dst.1.to_be_bytes());
        udp[4..6].copy_from_slice(&8u16.to_be_bytes());
        frame(src.0, dst.0, 17, &udp)
    }

    fn tcp_frame(src: (Ipv4Addr, u16), dst: (Ipv4Addr, u16)) -> Vec<u8> {
        let mut tcp = [0u8; 20];
        tcp[0..2].copy_from_slice(&src.1.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst.1.to_be_bytes());
        tcp[12] = 0x50;
        frame(src.0, dst.0, 6, &tcp)
    }

    fn default_filter() -> ActivityFilter {
        ActivityFilter {
            watch_port: None,
            ignored_ports: DEFAULT_IGNORED_PORTS.to_vec(),
            api_endpoints: vec![SocketAddrV4::new(API, 3000)],
        }
    }

    #[test]
    fn player_traffic_counts_as_activity() {
        let filter = default_filter();
        assert!(filter.is_activity(&udp_frame((PLAYER, 50000), (VPS, 19132))));
        assert!(filter.is_activity(&tcp_frame((VPS, 25565), (PLAYER, 41000))));
    }

    #[test]
    fn refresh_requests_to_api_do_not_count() {
        let filter = default_filter();
        assert!(!filter.is_activity(&tcp_frame((VPS, 41234), (API, 3000))));
        assert!(!filter.is_activity(&tcp_frame((API, 3000), (VPS, 41234))));
    }

    #[test]
    fn background_ports_do_not_count() {
        let filter = default_filter();
        assert!(!filter.is_activity(&tcp_frame((PLAYER, 51000), (VPS, 22))));
        assert!(!filter.is_activity(&udp_frame((VPS, 40000), (PLAYER, 53))));
        assert!(!filter.is_activity(&udp_frame((VPS, 123), (PLAYER, 123))));
    }

    #[test]
    fn watch_port_filters_traffic() {
        let filter = ActivityFilter {
            watch_port: Some(19132),
            ..default_filter()
        };
        assert!(filter.is_activity(&udp_frame((PLAYER, 50000), (VPS, 19132))));
        assert!(filter.is_activity(&udp_frame((VPS, 19132), (PLAYER, 50000))));
        assert!(!filter.is_activity(&udp_frame((PLAYER, 50000), (VPS, 8080))));
        assert!(!filter.is_activity(&tcp_frame((VPS, 41234), (API, 3000))));
    }

    #[test]
    fn non_ipv4_is_ignored() {
        let filter = default_filter();
        let mut frame = udp_frame((PLAYER, 50000), (VPS, 19132));
        frame[12..14].copy_from_slice(&0x86ddu16.to_be_bytes());
        assert!(!filter.is_activity(&frame));
        assert!(!filter.is_activity(&[0u8; 4]));
    }

    #[test]
    fn zero_refresh_interval_is_rejected() {
        assert!(refresh_interval(Some(0)).is_err());
        assert_eq!(refresh_interval(None).unwrap(), Duration::from_secs(30));
        assert_eq!(refresh_interval(Some(5)).unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parses_ignore_ports_list() {
        assert_eq!(parse_ports("22, 53,,123").unwrap(), vec![22, 53, 123]);
        assert!(parse_ports("22,ssh").is_err());
    }

    #[tokio::test]
    async fn resolves_api_url_endpoints() {
        let endpoints = resolve_api("http://127.0.0.1:3000").await.unwrap();
        assert_eq!(endpoints, vec![SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3000)]);
        assert!(resolve_api("not a url").await.is_err());
    }
}
