use std::{future::Future, time::Duration};

use tracing::debug;

use crate::exec;

/// Reachability of one specific resource.
pub trait Liveness: Send + Sync {
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

/// Pings `address` once with `fping`. Unreachable, timed out and a missing
/// `fping` binary all report `false`.
pub async fn is_reachable(address: &str, timeout: Duration) -> bool {
    let timeout_arg = format!("-t{}", timeout.as_millis());
    match exec::run("fping", &["-c1", &timeout_arg, address]).await {
        Ok(output) => output.success,
        Err(err) => {
            debug!(address, "ping failed: {err:#}");
            false
        }
    }
}
