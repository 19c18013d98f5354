use std::{env, fs, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::idle::{IdleTimerConfig, PowerOffFailure};

const DEFAULT_PROBE_TIMEOUT_MS: u64 = 600;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
const DEFAULT_POWER_OFF_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SERVER_PORT: u16 = 3000;

/// Contents of `config.yml`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub machines: MachinesConfig,
    pub mc_server: McServerConfig,
    pub vps: VpsConfig,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct MachinesConfig {
    #[serde(default)]
    pub machine_hostnames: Vec<String>,
    #[serde(default)]
    pub machine_mac_addrs: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct McServerConfig {
    pub server_host_name: String,
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    #[serde(default)]
    pub mc_server_aliases: Vec<String>,
    #[serde(default)]
    pub mc_server_container_names: Vec<String>,
    #[serde(default)]
    pub mc_server_addrs: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VpsConfig {
    #[serde(rename = "dropletID")]
    pub droplet_id: u64,
    /// Probed directly when set, otherwise the droplet's public address is looked up.
    pub vps_hostname: Option<String>,
    pub sync_interval: u64,
    pub time_out: u64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_power_off_timeout")]
    pub power_off_timeout: u64,
    #[serde(default)]
    pub on_power_off_failure: PowerOffFailure,
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_power_off_timeout() -> u64 {
    DEFAULT_POWER_OFF_TIMEOUT_SECS
}

impl Config {
    /// Reads the path in `HOMELAB_CONFIG`, falling back to `./config.yml`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var("HOMELAB_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
        Self::load(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let machines = &self.machines;
        if machines.machine_hostnames.len() != machines.machine_mac_addrs.len() {
            return Err(ConfigError::Mismatched {
                left: "machines.machineHostnames",
                right: "machines.machineMacAddrs",
            });
        }

        let mc = &self.mc_server;
        if mc.mc_server_aliases.len() != mc.mc_server_container_names.len() {
            return Err(ConfigError::Mismatched {
                left: "mcServer.mcServerAliases",
                right: "mcServer.mcServerContainerNames",
            });
        }

        for (field, value) in [
            ("vps.syncInterval", self.vps.sync_interval),
            ("vps.timeOut", self.vps.time_out),
            ("vps.tickInterval", self.vps.tick_interval),
            ("vps.powerOffTimeout", self.vps.power_off_timeout),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }

        Ok(())
    }
}

impl VpsConfig {
    pub fn idle_timer(&self) -> IdleTimerConfig {
        IdleTimerConfig {
            tick_interval_secs: self.tick_interval,
            timeout_secs: self.time_out,
            power_off_timeout_secs: self.power_off_timeout,
            on_power_off_failure: self.on_power_off_failure,
        }
    }
}

/// `SERVER_PORT` from the environment, 3000 when unset.
pub fn server_port() -> Result<u16, ConfigError> {
    match env::var("SERVER_PORT") {
        Ok(port) => port.parse().map_err(|_| ConfigError::InvalidPort(port)),
        Err(_) => Ok(DEFAULT_SERVER_PORT),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
machines:
  machineHostnames: ["desktop", "nas"]
  machineMacAddrs: ["aa:bb:cc:dd:ee:ff", "11:22:33:44:55:66"]
mcServer:
  serverHostName: games.lan
  mcServerAliases: ["survival"]
  mcServerContainerNames: ["mc-survival"]
  mcServerAddrs: ["survival.example.net"]
vps:
  dropletID: 123456
  syncInterval: 300
  timeOut: 3600
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.machines.machine_hostnames.len(), 2);
        assert_eq!(config.mc_server.ssh_user, "root");
        assert_eq!(config.vps.droplet_id, 123456);
        assert_eq!(config.vps.vps_hostname, None);
        assert_eq!(config.vps.tick_interval, 5);
        assert_eq!(config.vps.probe_timeout_ms, 600);
        assert_eq!(config.vps.power_off_timeout, 60);
        assert_eq!(config.vps.on_power_off_failure, PowerOffFailure::Stop);
        assert_eq!(config.docs_dir, PathBuf::from("docs"));
    }

    #[test]
    fn reads_failure_policy() {
        let raw = SAMPLE.replace("timeOut: 3600", "timeOut: 3600\n  onPowerOffFailure: retry");
        let config = Config::parse(&raw).unwrap();
        assert_eq!(config.vps.on_power_off_failure, PowerOffFailure::Retry);
    }

    #[test]
    fn rejects_mismatched_aliases() {
        let raw = SAMPLE.replace(r#"mcServerAliases: ["survival"]"#, r#"mcServerAliases: ["survival", "creative"]"#);
        assert!(matches!(
            Config::parse(&raw),
            Err(ConfigError::Mismatched { .. })
        ));
    }

    #[test]
    fn rejects_zero_timeout() {
        let raw = SAMPLE.replace("timeOut: 3600", "timeOut: 0");
        assert!(matches!(
            Config::parse(&raw),
            Err(ConfigError::Zero("vps.timeOut"))
        ));
    }

    #[test]
    fn rejects_zero_power_off_timeout() {
        let raw = SAMPLE.replace("timeOut: 3600", "timeOut: 3600\n  powerOffTimeout: 0");
        assert!(matches!(
            Config::parse(&raw),
            Err(ConfigError::Zero("vps.powerOffTimeout"))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("config.yml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mc_server.mc_server_aliases, vec!["survival"]);
    }
}
