use std::path::PathBuf;

use thiserror::Error;

/// Anything that stops the server from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{left} and {right} must have the same length")]
    Mismatched {
        left: &'static str,
        right: &'static str,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("missing {0} in environment")]
    MissingEnv(&'static str),
    #[error("invalid SERVER_PORT {0:?}")]
    InvalidPort(String),
    #[error("invalid MAC address {0:?}")]
    InvalidMac(String),
}

/// Failure of an action that a caller is waiting on.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to power on {resource}: {cause:#}")]
    PowerOn {
        resource: String,
        cause: anyhow::Error,
    },
    #[error("failed to power off {resource}: {cause:#}")]
    PowerOff {
        resource: String,
        cause: anyhow::Error,
    },
}
