use std::{convert::Infallible, sync::Arc};

use serde::{Deserialize, Serialize};
use shared::{
    req::{
        ActionRequest, ActionResponse, McStatusResponse, PlayerList, ServerList,
        VpsStatusResponse,
    },
    MachineAction, McServerAction, VpsAction,
};
use tracing::error;
use warp::{
    filters::body::BodyDeserializeError,
    http::StatusCode,
    reject,
    reply::{Reply, Response},
    Rejection,
};

use crate::{
    api::PowerApi,
    liveness::Liveness,
    mc_server::ServerStatus,
    state::AppState,
    vps::Outcome,
};

#[derive(Deserialize, Debug)]
pub struct MachineQuery {
    #[serde(rename = "machineHostname")]
    pub machine_hostname: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct McQuery {
    #[serde(rename = "mcInstance")]
    pub mc_instance: Option<String>,
}

fn json<T: Serialize>(body: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

fn ok(message: impl Into<String>) -> Result<Response, Infallible> {
    Ok(json(&ActionResponse::ok(message), StatusCode::OK))
}

fn not_ok(message: impl Into<String>) -> Result<Response, Infallible> {
    Ok(json(&ActionResponse::not_ok(message), StatusCode::OK))
}

fn bad_request(message: impl Into<String>) -> Result<Response, Infallible> {
    Ok(warp::reply::with_status(message.into(), StatusCode::BAD_REQUEST).into_response())
}

fn bad_gateway(err: &dyn std::fmt::Display) -> Result<Response, Infallible> {
    Ok(json(
        &ActionResponse::not_ok(err.to_string()),
        StatusCode::BAD_GATEWAY,
    ))
}

fn mc_status(code: u8, server_stat: &str, players: Vec<String>, message: &str) -> Response {
    json(
        &McStatusResponse {
            code,
            server_stat: server_stat.to_string(),
            players,
            message: message.to_string(),
        },
        StatusCode::OK,
    )
}

pub async fn vps_status<A, L>(state: Arc<AppState<A, L>>) -> Result<Response, Infallible>
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    let (up, timer) = state.vps.status().await;
    let (code, message) = if up {
        (0, "VPS is up.")
    } else {
        (1, "VPS is down.")
    };

    Ok(json(
        &VpsStatusResponse {
            code,
            message: message.to_string(),
            idle_secs: timer.idle_secs,
            timer_active: timer.active,
        },
        StatusCode::OK,
    ))
}

pub async fn vps_action<A, L>(
    req: ActionRequest,
    state: Arc<AppState<A, L>>,
) -> Result<Response, Infallible>
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    let action = match req.action.parse::<VpsAction>() {
        Ok(action) => action,
        Err(err) => return bad_request(err.to_string()),
    };

    match action {
        VpsAction::Start => match state.vps.start().await {
            Ok(Outcome::Done) => ok("Starting up VPS!"),
            Ok(Outcome::AlreadyInState) => not_ok("VPS is already up!"),
            Err(err) => {
                error!("{err}");
                bad_gateway(&err)
            }
        },
        VpsAction::Stop => match state.vps.stop().await {
            Ok(Outcome::Done) => ok("Shutting down VPS!"),
            Ok(Outcome::AlreadyInState) => not_ok("VPS is already down!"),
            Err(err) => {
                error!("{err}");
                bad_gateway(&err)
            }
        },
        VpsAction::Refresh => {
            state.vps.refresh().await;
            ok("VPS refreshed.")
        }
        VpsAction::Sync => {
            state.vps.sync().await;
            ok("VPS synced.")
        }
    }
}

pub async fn machine_status<A, L>(
    query: MachineQuery,
    state: Arc<AppState<A, L>>,
) -> Result<Response, Infallible> {
    let Some(hostname) = query.machine_hostname else {
        return bad_request("Missing \"?machineHostname=\" query.");
    };
    if state.machines.mac(&hostname).is_none() {
        return not_ok(format!("\"{hostname}\" is not a registered hostname."));
    }

    if state.machines.is_up(&hostname).await {
        ok("Machine is up!")
    } else {
        not_ok("Machine is down!")
    }
}

pub async fn machine_action<A, L>(
    query: MachineQuery,
    req: ActionRequest,
    state: Arc<AppState<A, L>>,
) -> Result<Response, Infallible> {
    let Some(hostname) = query.machine_hostname else {
        return bad_request("Missing \"?machineHostname=\" query.");
    };
    let Some(mac) = state.machines.mac(&hostname) else {
        return not_ok(format!("\"{hostname}\" is not a registered hostname."));
    };

    match req.action.parse::<MachineAction>() {
        Ok(MachineAction::Start) => match state.machines.wake(&hostname, mac).await {
            Ok(()) => ok("Starting Machine!"),
            Err(err) => {
                error!(hostname, "Failed to wake machine: {err:#}");
                bad_gateway(&format!("{err:#}"))
            }
        },
        Err(err) => bad_request(err.to_string()),
    }
}

pub async fn mc_server_status<A, L>(
    query: McQuery,
    state: Arc<AppState<A, L>>,
) -> Result<Response, Infallible> {
    let Some(alias) = query.mc_instance else {
        return bad_request("Missing \"?mcInstance=\" query.");
    };
    let servers = &state.mc_servers;
    let Some(container) = servers.container(&alias) else {
        return not_ok(format!("{alias} not recognized in server aliases"));
    };

    if !servers.host_up().await {
        return Ok(mc_status(
            1,
            "down",
            Vec::new(),
            "Minecraft server is down because machine is down!",
        ));
    }

    let reply = match servers.status(container).await {
        ServerStatus::Active => {
            let players = servers.players(container).await;
            mc_status(0, "running", players, "Minecraft server is up and running!")
        }
        ServerStatus::Starting => {
            mc_status(0, "starting", Vec::new(), "Minecraft server is starting!")
        }
        ServerStatus::Error => {
            mc_status(1, "error", Vec::new(), "Minecraft server has an error!")
        }
        ServerStatus::Stopped => {
            mc_status(0, "exited", Vec::new(), "Minecraft server is shut down!")
        }
        ServerStatus::Unknown => {
            mc_status(1, "unknown", Vec::new(), "Minecraft server status unknown.")
        }
    };
    Ok(reply)
}

pub async fn mc_server_action<A, L>(
    query: McQuery,
    req: ActionRequest,
    state: Arc<AppState<A, L>>,
) -> Result<Response, Infallible> {
    let Some(alias) = query.mc_instance else {
        return bad_request("Missing \"?mcInstance=\" query.");
    };
    let servers = &state.mc_servers;
    let Some(container) = servers.container(&alias) else {
        return not_ok(format!("{alias} not recognized in server aliases"));
    };
    let action = match req.action.parse::<McServerAction>() {
        Ok(action) => action,
        Err(err) => return bad_request(err.to_string()),
    };

    if !servers.host_up().await {
        return match action {
            McServerAction::Start => not_ok("Minecraft server is down because machine is down!"),
            McServerAction::Stop => {
                not_ok("Minecraft server is already down because machine is down!")
            }
        };
    }

    let status = servers.status(container).await;
    match (action, status) {
        (McServerAction::Start, ServerStatus::Active) => {
            not_ok("Minecraft server is already up and running!")
        }
        (McServerAction::Start, ServerStatus::Starting) => {
            not_ok("Minecraft server is already starting!")
        }
        (McServerAction::Start, ServerStatus::Stopped | ServerStatus::Error) => {
            match servers.start(container).await {
                Ok(()) => ok("Starting Minecraft server!"),
                Err(err) => {
                    error!(alias, "Failed to start container: {err:#}");
                    bad_gateway(&format!("{err:#}"))
                }
            }
        }
        (McServerAction::Stop, ServerStatus::Active) => {
            let players = servers.players(container).await;
            if !players.is_empty() {
                return not_ok(format!(
                    "{} players online! Aborting shutdown.",
                    players.len()
                ));
            }
            match servers.stop(container).await {
                Ok(()) => ok("Shutting down Minecraft server..."),
                Err(err) => {
                    error!(alias, "Failed to stop container: {err:#}");
                    bad_gateway(&format!("{err:#}"))
                }
            }
        }
        (McServerAction::Stop, ServerStatus::Starting) => not_ok(
            "Minecraft server is starting up. Please wait until server is fully up and running.",
        ),
        (McServerAction::Stop, ServerStatus::Stopped | ServerStatus::Error) => {
            not_ok("Minecraft server is already stopped!")
        }
        (_, ServerStatus::Unknown) => not_ok("Minecraft server status unknown."),
    }
}

pub async fn mc_player_list<A, L>(
    query: McQuery,
    state: Arc<AppState<A, L>>,
) -> Result<Response, Infallible> {
    let Some(alias) = query.mc_instance else {
        return bad_request("Missing \"?mcInstance=\" query.");
    };
    let servers = &state.mc_servers;
    let Some(container) = servers.container(&alias) else {
        return not_ok(format!("{alias} not recognized in server aliases"));
    };

    if !servers.host_up().await {
        return not_ok("Minecraft server is down because machine is down!");
    }
    if servers.status(container).await != ServerStatus::Active {
        return not_ok("Minecraft server is shut down.");
    }

    let players = servers.players(container).await;
    let list = PlayerList {
        player_count: players.len(),
        players,
    };
    match serde_json::to_string(&list) {
        Ok(message) => ok(message),
        Err(err) => bad_gateway(&err),
    }
}

pub async fn mc_server_list<A, L>(state: Arc<AppState<A, L>>) -> Result<Response, Infallible> {
    let list = ServerList {
        mc_server_aliases: state.mc_servers.aliases().to_vec(),
        mc_server_addrs: state.mc_servers.addrs().to_vec(),
    };
    match serde_json::to_string(&list) {
        Ok(message) => ok(message),
        Err(err) => bad_gateway(&err),
    }
}

pub async fn api_docs<A, L>(state: Arc<AppState<A, L>>) -> Result<Response, Infallible> {
    Ok(json(&state.docs, StatusCode::OK))
}

/// Maps rejections to plain-text replies. Body problems are checked before
/// `MethodNotAllowed`, which a sibling route on the same path always adds.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (message, status) = if err.find::<BodyDeserializeError>().is_some()
        || err.find::<reject::UnsupportedMediaType>().is_some()
    {
        ("Bad Request", StatusCode::BAD_REQUEST)
    } else if err.find::<reject::LengthRequired>().is_some() {
        ("Length Required", StatusCode::LENGTH_REQUIRED)
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        ("Payload Too Large", StatusCode::PAYLOAD_TOO_LARGE)
    } else if err.is_not_found() {
        ("Not Found", StatusCode::NOT_FOUND)
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ("Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED)
    } else {
        error!("unhandled rejection: {err:?}");
        ("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
    };
    Ok(warp::reply::with_status(message, status).into_response())
}
