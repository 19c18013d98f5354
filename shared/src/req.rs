use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ActionRequest {
    pub action: String,
}

/// `code` is 0 when the request did what was asked and 1 otherwise.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ActionResponse {
    pub code: u8,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: message.into(),
        }
    }

    pub fn not_ok(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VpsStatusResponse {
    pub code: u8,
    pub message: String,
    pub idle_secs: u64,
    pub timer_active: bool,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct McStatusResponse {
    pub code: u8,
    pub server_stat: String,
    pub players: Vec<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlayerList {
    pub player_count: usize,
    pub players: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServerList {
    pub mc_server_aliases: Vec<String>,
    pub mc_server_addrs: Vec<String>,
}
