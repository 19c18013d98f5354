//! Idle-timeout auto shutoff for one power-controllable resource.
//!
//! An [`IdleTimer`] counts idle seconds while its ticker task is running and
//! powers the resource off once the count passes the configured timeout.
//! The counter and the ticker handle live behind one async mutex; a tick
//! holds it for the whole increment, compare and power-off sequence, so
//! `start`, `stop`, `refresh` and `reconcile` land either before or after a
//! tick, never in the middle of one.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use serde::Deserialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{api::PowerApi, liveness::Liveness};

/// What a tick does when the power-off command fails.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PowerOffFailure {
    /// Log the failure and stop ticking.
    #[default]
    Stop,
    /// Keep ticking; every following tick tries again.
    Retry,
}

#[derive(Debug, Clone, Copy)]
pub struct IdleTimerConfig {
    pub tick_interval_secs: u64,
    pub timeout_secs: u64,
    /// Deadline for one power-off call; running past it counts as a failure.
    pub power_off_timeout_secs: u64,
    pub on_power_off_failure: PowerOffFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub idle_secs: u64,
    pub active: bool,
}

/// Result of [`IdleTimer::reconcile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Started,
    Stopped,
    Unchanged,
}

struct Ticker {
    epoch: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerState {
    idle_secs: u64,
    ticker: Option<Ticker>,
    // bumped for every new ticker
    epoch: u64,
}

struct Shared<A, L> {
    api: A,
    liveness: L,
    resource_id: String,
    config: IdleTimerConfig,
    state: Mutex<TimerState>,
}

#[derive(PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Finished,
}

pub struct IdleTimer<A, L> {
    shared: Arc<Shared<A, L>>,
}

impl<A, L> Clone for IdleTimer<A, L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, L> IdleTimer<A, L>
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    /// Builds an inactive timer. Nothing is scheduled until `start` or
    /// `reconcile` arms it.
    pub fn new(
        api: A,
        liveness: L,
        resource_id: impl Into<String>,
        config: IdleTimerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                liveness,
                resource_id: resource_id.into(),
                config,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    pub fn api(&self) -> &A {
        &self.shared.api
    }

    pub fn liveness(&self) -> &L {
        &self.shared.liveness
    }

    pub fn resource_id(&self) -> &str {
        &self.shared.resource_id
    }

    /// (Re)arms the timer from zero, replacing any running ticker.
    pub async fn start(&self) {
        let mut state = self.shared.state.lock().await;
        self.arm(&mut state);
    }

    /// Cancels the ticker. Returns `false` if the timer was not running.
    pub async fn stop(&self) -> bool {
        let mut state = self.shared.state.lock().await;
        disarm(&mut state)
    }

    pub async fn refresh(&self) {
        let mut state = self.shared.state.lock().await;
        debug!(resource_id = %self.shared.resource_id, idle_secs = state.idle_secs, "idle timer refreshed");
        state.idle_secs = 0;
    }

    /// Brings the timer in line with whether the resource answers a probe.
    ///
    /// Stopping here never powers the resource off; it is already down.
    pub async fn reconcile(&self) -> Reconciled {
        let reachable = self.shared.liveness.is_reachable().await;

        let mut state = self.shared.state.lock().await;
        match (reachable, state.ticker.is_some()) {
            (true, false) => {
                info!(resource_id = %self.shared.resource_id, "Resource found online! Syncing timeout timer...");
                self.arm(&mut state);
                Reconciled::Started
            }
            (false, true) => {
                info!(resource_id = %self.shared.resource_id, "Resource found offline, clearing timeout timer");
                disarm(&mut state);
                Reconciled::Stopped
            }
            _ => Reconciled::Unchanged,
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.shared.state.lock().await;
        Snapshot {
            idle_secs: state.idle_secs,
            active: state.ticker.is_some(),
        }
    }

    fn arm(&self, state: &mut TimerState) {
        if let Some(ticker) = state.ticker.take() {
            ticker.handle.abort();
        }
        state.idle_secs = 0;
        state.epoch += 1;

        let epoch = state.epoch;
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.run_ticker(epoch).await });
        state.ticker = Some(Ticker { epoch, handle });
    }
}

fn disarm(state: &mut TimerState) -> bool {
    match state.ticker.take() {
        Some(ticker) => {
            ticker.handle.abort();
            state.idle_secs = 0;
            true
        }
        None => false,
    }
}

impl<A, L> Shared<A, L>
where
    A: PowerApi,
    L: Liveness,
{
    async fn run_ticker(&self, epoch: u64) {
        let period = Duration::from_secs(self.config.tick_interval_secs);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if self.tick(epoch).await == TickOutcome::Finished {
                break;
            }
        }
    }

    async fn tick(&self, epoch: u64) -> TickOutcome {
        let mut state = self.state.lock().await;

        // a replaced or cancelled ticker must not touch the counter
        if state.ticker.as_ref().map(|ticker| ticker.epoch) != Some(epoch) {
            return TickOutcome::Finished;
        }

        state.idle_secs += self.config.tick_interval_secs;
        if state.idle_secs <= self.config.timeout_secs {
            return TickOutcome::Continue;
        }

        info!(
            resource_id = %self.resource_id,
            idle_secs = state.idle_secs,
            "Auto shutoff triggered"
        );
        let deadline = Duration::from_secs(self.config.power_off_timeout_secs);
        let power_off = self.api.power_off(self.resource_id.clone());
        let result = match time::timeout(deadline, power_off).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("power off timed out after {deadline:?}")),
        };
        match result {
            Ok(()) => info!(resource_id = %self.resource_id, "Resource shutting off"),
            Err(err) => {
                error!(resource_id = %self.resource_id, "Auto shutoff failed: {err:#}");
                if self.config.on_power_off_failure == PowerOffFailure::Retry {
                    warn!(resource_id = %self.resource_id, "Retrying power off on next tick");
                    return TickOutcome::Continue;
                }
            }
        }

        // our own handle; dropping it detaches this task, which then returns
        state.ticker = None;
        state.idle_secs = 0;
        TickOutcome::Finished
    }
}
