//! Home-lab control API: wake machines, drive game-server containers and
//! power a cloud VPS with an idle-timeout auto shutoff.

pub mod api;
pub mod config;
pub mod docs;
pub mod error;
pub mod exec;
pub mod handlers;
pub mod idle;
pub mod liveness;
pub mod logging;
pub mod machine;
pub mod mc_server;
pub mod routes;
pub mod state;
pub mod vps;
