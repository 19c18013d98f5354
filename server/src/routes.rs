use std::{convert::Infallible, sync::Arc};

use shared::req::ActionRequest;
use warp::{Filter, Rejection, Reply};

use crate::{
    api::PowerApi,
    handlers::{self, MachineQuery, McQuery},
    liveness::Liveness,
    state::AppState,
};

const MAX_BODY_BYTES: u64 = 16 * 1024;

fn with_state<S: Send + Sync + 'static>(
    state: Arc<S>,
) -> impl Filter<Extract = (Arc<S>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

fn action_body() -> impl Filter<Extract = (ActionRequest,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// All `/api` routes, with rejections turned into plain-text replies.
pub fn routes<A, L>(
    state: Arc<AppState<A, L>>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    let vps_status = warp::path!("api" / "vps")
        .and(warp::get())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::vps_status::<A, L>);

    let vps_action = warp::path!("api" / "vps")
        .and(warp::put())
        .and(action_body())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::vps_action::<A, L>);

    let machine_status = warp::path!("api" / "machine")
        .and(warp::get())
        .and(warp::query::<MachineQuery>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::machine_status::<A, L>);

    let machine_action = warp::path!("api" / "machine")
        .and(warp::put())
        .and(warp::query::<MachineQuery>())
        .and(action_body())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::machine_action::<A, L>);

    let mc_server_status = warp::path!("api" / "mc-server")
        .and(warp::get())
        .and(warp::query::<McQuery>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::mc_server_status::<A, L>);

    let mc_server_action = warp::path!("api" / "mc-server")
        .and(warp::put())
        .and(warp::query::<McQuery>())
        .and(action_body())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::mc_server_action::<A, L>);

    let mc_player_list = warp::path!("api" / "mc-server" / "playerlist")
        .and(warp::get())
        .and(warp::query::<McQuery>())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::mc_player_list::<A, L>);

    let mc_server_list = warp::path!("api" / "mc-server" / "serverlist")
        .and(warp::get())
        .and(with_state(Arc::clone(&state)))
        .and_then(handlers::mc_server_list::<A, L>);

    let api_docs = warp::path!("api" / "docs")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::api_docs::<A, L>);

    vps_status
        .or(vps_action)
        .or(machine_status)
        .or(machine_action)
        .or(mc_server_status)
        .or(mc_server_action)
        .or(mc_player_list)
        .or(mc_server_list)
        .or(api_docs)
        .recover(handlers::handle_rejection)
}

/// Paths served by [`routes`], for the startup log.
pub const ROUTE_PATHS: &[&str] = &[
    "/api/vps",
    "/api/machine",
    "/api/mc-server",
    "/api/mc-server/playerlist",
    "/api/mc-server/serverlist",
    "/api/docs",
];
