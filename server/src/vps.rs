use std::{sync::Arc, time::Duration};

use tokio::{sync::OnceCell, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    api::{Doctl, PowerApi},
    error::ActionError,
    idle::{IdleTimer, Reconciled, Snapshot},
    liveness::{self, Liveness},
};

/// How an action relates to the state the resource was already in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    AlreadyInState,
}

/// Probes a droplet, either at a configured hostname or at its public
/// address, which is looked up once and then cached.
pub struct DropletProbe {
    doctl: Arc<Doctl>,
    droplet_id: String,
    address: OnceCell<String>,
    timeout: Duration,
}

impl DropletProbe {
    pub fn new(
        doctl: Arc<Doctl>,
        droplet_id: impl Into<String>,
        hostname: Option<String>,
        timeout: Duration,
    ) -> Self {
        let address = match hostname {
            Some(hostname) => OnceCell::new_with(Some(hostname)),
            None => OnceCell::new(),
        };
        Self {
            doctl,
            droplet_id: droplet_id.into(),
            address,
            timeout,
        }
    }
}

impl Liveness for DropletProbe {
    async fn is_reachable(&self) -> bool {
        let address = self
            .address
            .get_or_try_init(|| self.doctl.public_ipv4(&self.droplet_id))
            .await;

        match address {
            Ok(address) => liveness::is_reachable(address, self.timeout).await,
            Err(err) => {
                warn!(droplet_id = %self.droplet_id, "Cannot get ip address of droplet: {err:#}");
                false
            }
        }
    }
}

/// The `startVps`/`stopVps`/`refreshVps`/`syncVps` actions on top of an
/// [`IdleTimer`].
pub struct Vps<A, L> {
    timer: IdleTimer<A, L>,
}

impl<A, L> Vps<A, L>
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    pub fn new(timer: IdleTimer<A, L>) -> Self {
        Self { timer }
    }

    pub fn timer(&self) -> &IdleTimer<A, L> {
        &self.timer
    }

    pub async fn is_up(&self) -> bool {
        self.timer.liveness().is_reachable().await
    }

    pub async fn status(&self) -> (bool, Snapshot) {
        let up = self.is_up().await;
        (up, self.timer.snapshot().await)
    }

    /// Powers the resource on unless it already answers, then arms the timer.
    pub async fn start(&self) -> Result<Outcome, ActionError> {
        if self.is_up().await {
            return Ok(Outcome::AlreadyInState);
        }

        let resource = self.timer.resource_id().to_string();
        self.timer
            .api()
            .power_on(resource.clone())
            .await
            .map_err(|cause| ActionError::PowerOn { resource, cause })?;
        self.timer.start().await;
        Ok(Outcome::Done)
    }

    /// Powers the resource off if it answers. The timer is cleared even when
    /// the power-off fails.
    pub async fn stop(&self) -> Result<Outcome, ActionError> {
        if !self.is_up().await {
            return Ok(Outcome::AlreadyInState);
        }

        let resource = self.timer.resource_id().to_string();
        let result = self.timer.api().power_off(resource.clone()).await;
        self.timer.stop().await;
        result.map_err(|cause| ActionError::PowerOff { resource, cause })?;
        Ok(Outcome::Done)
    }

    pub async fn refresh(&self) {
        self.timer.refresh().await;
    }

    pub async fn sync(&self) -> Reconciled {
        self.timer.reconcile().await
    }
}

/// Reconciles once right away and then every `every`, independent of the
/// idle ticker.
pub fn spawn_sync_loop<A, L>(vps: Arc<Vps<A, L>>, every: Duration) -> JoinHandle<()>
where
    A: PowerApi + 'static,
    L: Liveness + 'static,
{
    tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let reconciled = vps.sync().await;
            if reconciled != Reconciled::Unchanged {
                info!(?reconciled, "VPS timer synced");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::idle::{IdleTimerConfig, PowerOffFailure};

    #[derive(Default)]
    struct Counts {
        power_ons: AtomicUsize,
        power_offs: AtomicUsize,
        fail: AtomicBool,
    }

    #[derive(Clone, Default)]
    struct FakeApi(Arc<Counts>);

    impl PowerApi for FakeApi {
        async fn power_on(&self, _resource_id: String) -> anyhow::Result<()> {
            self.0.power_ons.fetch_add(1, Ordering::SeqCst);
            if self.0.fail.load(Ordering::SeqCst) {
                anyhow::bail!("api unavailable");
            }
            Ok(())
        }

        async fn power_off(&self, _resource_id: String) -> anyhow::Result<()> {
            self.0.power_offs.fetch_add(1, Ordering::SeqCst);
            if self.0.fail.load(Ordering::SeqCst) {
                anyhow::bail!("api unavailable");
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeLiveness(Arc<AtomicBool>);

    impl Liveness for FakeLiveness {
        async fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn vps() -> (Vps<FakeApi, FakeLiveness>, FakeApi, FakeLiveness) {
        let api = FakeApi::default();
        let liveness = FakeLiveness::default();
        let timer = IdleTimer::new(
            api.clone(),
            liveness.clone(),
            "1234",
            IdleTimerConfig {
                tick_interval_secs: 5,
                timeout_secs: 3600,
                power_off_timeout_secs: 60,
                on_power_off_failure: PowerOffFailure::Stop,
            },
        );
        (Vps::new(timer), api, liveness)
    }

    #[tokio::test(start_paused = true)]
    async fn start_powers_on_and_arms_timer() {
        let (vps, api, _) = vps();

        assert_eq!(vps.start().await.unwrap(), Outcome::Done);
        assert_eq!(api.0.power_ons.load(Ordering::SeqCst), 1);
        assert!(vps.timer().snapshot().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn start_when_up_is_already_in_state() {
        let (vps, api, liveness) = vps();
        liveness.0.store(true, Ordering::SeqCst);

        assert_eq!(vps.start().await.unwrap(), Outcome::AlreadyInState);
        assert_eq!(api.0.power_ons.load(Ordering::SeqCst), 0);
        assert!(!vps.timer().snapshot().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_power_on_leaves_timer_inactive() {
        let (vps, api, _) = vps();
        api.0.fail.store(true, Ordering::SeqCst);

        let err = vps.start().await.unwrap_err();
        assert!(matches!(err, ActionError::PowerOn { .. }));
        assert!(!vps.timer().snapshot().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_powers_off_and_clears_timer() {
        let (vps, api, liveness) = vps();
        liveness.0.store(true, Ordering::SeqCst);
        vps.timer().start().await;

        assert_eq!(vps.stop().await.unwrap(), Outcome::Done);
        assert_eq!(api.0.power_offs.load(Ordering::SeqCst), 1);
        assert!(!vps.timer().snapshot().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_power_off_is_reported_and_timer_cleared() {
        let (vps, api, liveness) = vps();
        liveness.0.store(true, Ordering::SeqCst);
        api.0.fail.store(true, Ordering::SeqCst);
        vps.timer().start().await;

        let err = vps.stop().await.unwrap_err();
        assert!(matches!(err, ActionError::PowerOff { .. }));
        assert!(!vps.timer().snapshot().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_down_is_already_in_state() {
        let (vps, api, _) = vps();

        assert_eq!(vps.stop().await.unwrap(), Outcome::AlreadyInState);
        assert_eq!(api.0.power_offs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_loop_picks_up_externally_started_resource() {
        let (vps, _, liveness) = vps();
        let vps = Arc::new(vps);
        liveness.0.store(true, Ordering::SeqCst);

        let handle = spawn_sync_loop(Arc::clone(&vps), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(vps.timer().snapshot().await.active);

        liveness.0.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!vps.timer().snapshot().await.active);

        handle.abort();
    }
}
