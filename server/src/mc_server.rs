use std::{collections::HashMap, sync::LazyLock, time::Duration};

use regex::Regex;
use shared::Alias;
use tracing::error;

use crate::{config::McServerConfig, exec, liveness};

const INSPECT_FORMAT: &str = "'{{.State.Status}}, {{.State.Health}} exitcode{{.State.ExitCode}}'";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid regex"));
static LIST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[0-9a-zA-Z ]*: ").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Stopped,
    Starting,
    Active,
    Unknown,
    Error,
}

impl ServerStatus {
    /// Reads the output of `docker container inspect -f` with [`INSPECT_FORMAT`].
    pub fn from_inspect(stdout: &str) -> Self {
        if stdout.contains("running") && stdout.contains("healthy") {
            ServerStatus::Active
        } else if stdout.contains("starting") {
            ServerStatus::Starting
        } else if stdout.contains("exitcode137") || stdout.contains("exitcode0") {
            ServerStatus::Stopped
        } else if stdout.contains("exited") {
            ServerStatus::Error
        } else {
            ServerStatus::Unknown
        }
    }
}

/// Player names from `rcon-cli list`, e.g.
/// `There are 2 of a max of 20 players online: Steve, Alex`.
pub fn parse_players(output: &str) -> Vec<String> {
    let plain = ANSI_ESCAPE.replace_all(output, "");
    let names = LIST_PREFIX.replace_all(&plain, "").replace(' ', "");
    names
        .trim()
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Game-server containers on one docker host, reached over SSH.
#[derive(Debug)]
pub struct McServers {
    host: String,
    ssh_user: String,
    containers: HashMap<Alias, String>,
    aliases: Vec<Alias>,
    addrs: Vec<String>,
    probe_timeout: Duration,
}

impl McServers {
    pub fn from_config(config: &McServerConfig, probe_timeout: Duration) -> Self {
        let containers = config
            .mc_server_aliases
            .iter()
            .cloned()
            .zip(config.mc_server_container_names.iter().cloned())
            .collect();
        Self {
            host: config.server_host_name.clone(),
            ssh_user: config.ssh_user.clone(),
            containers,
            aliases: config.mc_server_aliases.clone(),
            addrs: config.mc_server_addrs.clone(),
            probe_timeout,
        }
    }

    pub fn container(&self, alias: &str) -> Option<&str> {
        self.containers.get(alias).map(String::as_str)
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    pub async fn host_up(&self) -> bool {
        liveness::is_reachable(&self.host, self.probe_timeout).await
    }

    async fn ssh(&self, command: &str) -> anyhow::Result<exec::Output> {
        let target = format!("{}@{}", self.ssh_user, self.host);
        exec::run(
            "ssh",
            &[
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                &target,
                command,
            ],
        )
        .await
    }

    pub async fn status(&self, container: &str) -> ServerStatus {
        let command = format!("docker container inspect -f {INSPECT_FORMAT} {container}");
        match self.ssh(&command).await {
            Ok(output) => ServerStatus::from_inspect(&output.stdout),
            Err(err) => {
                error!(container, "Failed to inspect container: {err:#}");
                ServerStatus::Unknown
            }
        }
    }

    /// Players currently online; empty when the list cannot be read.
    pub async fn players(&self, container: &str) -> Vec<String> {
        let command = format!("docker exec {container} rcon-cli list");
        match self.ssh(&command).await {
            Ok(output) if output.success => parse_players(&output.stdout),
            Ok(output) => {
                error!(container, "Failed to list players: {}", output.stderr.trim());
                Vec::new()
            }
            Err(err) => {
                error!(container, "Failed to list players: {err:#}");
                Vec::new()
            }
        }
    }

    pub async fn start(&self, container: &str) -> anyhow::Result<()> {
        self.checked(&format!("docker start {container}")).await
    }

    pub async fn stop(&self, container: &str) -> anyhow::Result<()> {
        self.checked(&format!("docker exec {container} rcon-cli stop")).await
    }

    async fn checked(&self, command: &str) -> anyhow::Result<()> {
        let output = self.ssh(command).await?;
        if !output.success {
            anyhow::bail!("`{command}` failed on {}: {}", self.host, output.stderr.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_output_maps_to_status() {
        let cases = [
            ("running, {healthy 0 []} exitcode0", ServerStatus::Active),
            ("running, {starting 0 []} exitcode0", ServerStatus::Starting),
            ("exited, <nil> exitcode137", ServerStatus::Stopped),
            ("exited, <nil> exitcode0", ServerStatus::Stopped),
            ("exited, <nil> exitcode1", ServerStatus::Error),
            ("", ServerStatus::Unknown),
        ];
        for (stdout, expected) in cases {
            assert_eq!(ServerStatus::from_inspect(stdout), expected, "{stdout:?}");
        }
    }

    #[test]
    fn parses_player_list() {
        let output = "\x1b[0mThere are 2 of a max of 20 players online: Steve, Alex\x1b[0m\n";
        assert_eq!(parse_players(output), vec!["Steve", "Alex"]);
    }

    #[test]
    fn empty_server_has_no_players() {
        let output = "There are 0 of a max of 20 players online: \n";
        assert!(parse_players(output).is_empty());
    }

    #[test]
    fn aliases_resolve_to_containers() {
        let servers = McServers::from_config(
            &McServerConfig {
                server_host_name: "games.lan".into(),
                ssh_user: "root".into(),
                mc_server_aliases: vec!["survival".into(), "creative".into()],
                mc_server_container_names: vec!["mc-survival".into(), "mc-creative".into()],
                mc_server_addrs: vec![],
            },
            Duration::from_millis(600),
        );

        assert_eq!(servers.container("creative"), Some("mc-creative"));
        assert_eq!(servers.container("hardcore"), None);
        assert_eq!(servers.aliases(), ["survival", "creative"]);
    }
}
