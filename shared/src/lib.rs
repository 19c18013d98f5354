pub mod req;

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

pub type Alias = String;

/// Actions accepted by `PUT /api/vps`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpsAction {
    Start,
    Stop,
    Refresh,
    Sync,
}

/// Actions accepted by `PUT /api/machine`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineAction {
    Start,
}

/// Actions accepted by `PUT /api/mc-server`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum McServerAction {
    Start,
    Stop,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl Display for UnknownAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown Action \"{}\".", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl VpsAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VpsAction::Start => "startVps",
            VpsAction::Stop => "stopVps",
            VpsAction::Refresh => "refreshVps",
            VpsAction::Sync => "syncVps",
        }
    }
}

impl FromStr for VpsAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startVps" => Ok(VpsAction::Start),
            "stopVps" => Ok(VpsAction::Stop),
            "refreshVps" => Ok(VpsAction::Refresh),
            "syncVps" => Ok(VpsAction::Sync),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl FromStr for MachineAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startMachine" => Ok(MachineAction::Start),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl FromStr for McServerAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startMinecraftServer" => Ok(McServerAction::Start),
            "stopMinecraftServer" => Ok(McServerAction::Stop),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vps_action_names_parse_back() {
        for action in [
            VpsAction::Start,
            VpsAction::Stop,
            VpsAction::Refresh,
            VpsAction::Sync,
        ] {
            assert_eq!(action.as_str().parse::<VpsAction>(), Ok(action));
        }
    }

    #[test]
    fn unknown_action_is_reported_verbatim() {
        let err = "reboot".parse::<McServerAction>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown Action \"reboot\".");
    }
}
