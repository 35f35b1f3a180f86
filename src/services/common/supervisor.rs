//! Link supervisor base.
//!
//! A [`Supervisor`] owns the last-asserted configuration, the published
//! status record and at most one reconcile worker. Reconfiguration replaces
//! the worker: cancel, bounded join, reset status, spawn. The kind-specific
//! behavior lives in a [`LinkDriver`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::property::Property;
use super::types::{LinkConfig, LinkKind, LinkState, LinkStatus};

/// How long a replaced worker gets to observe its cancellation before it is
/// aborted outright.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles a reconcile worker publishes through.
#[derive(Debug, Clone)]
pub struct LinkShared {
    /// Published link status.
    pub status: Property<LinkStatus>,
    /// Process-wide connectivity-change event.
    pub conn_event: Arc<Notify>,
}

impl LinkShared {
    /// Fresh shared state wired to the given connectivity event.
    pub fn new(conn_event: Arc<Notify>) -> Self {
        Self {
            status: Property::new(LinkStatus::default()),
            conn_event,
        }
    }

    /// Snapshot of the published status.
    pub fn snapshot(&self) -> LinkStatus {
        self.status.get()
    }

    /// Modify the published status in place.
    pub fn update(&self, f: impl FnOnce(&mut LinkStatus)) {
        self.status.update(f);
    }

    /// Ask the manager to re-probe online status.
    pub fn signal(&self) {
        self.conn_event.notify_one();
    }
}

/// Kind-specific reconcile behavior.
#[async_trait]
pub trait LinkDriver: Send + Sync + 'static {
    /// Link kind, used for file naming and logging.
    fn kind(&self) -> LinkKind;

    /// The reconcile loop. Never returns on its own; only cancellation
    /// stops it, and no error may escape an iteration.
    async fn run(&self, cfg: LinkConfig, link: LinkShared, cancel: CancellationToken);

    /// Tear down all side effects: generated files, auxiliary children,
    /// interface addresses.
    async fn clean(&self, link: &LinkShared);

    /// Live connection information, augmented with kernel state.
    async fn info(&self, link: &LinkShared) -> serde_json::Value;
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Controller for one link kind, owning one reconcile worker.
pub struct Supervisor<D: LinkDriver> {
    driver: Arc<D>,
    shared: LinkShared,
    cfg: Mutex<Option<LinkConfig>>,
    worker: Mutex<Option<Worker>>,
}

impl<D: LinkDriver> Supervisor<D> {
    /// Supervisor around a driver; no worker runs until `connect`.
    pub fn new(driver: D, conn_event: Arc<Notify>) -> Self {
        Self {
            driver: Arc::new(driver),
            shared: LinkShared::new(conn_event),
            cfg: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Assert a configuration (or disable with `None`) and reconnect.
    pub async fn connect(&self, cfg: Option<LinkConfig>) {
        *self.cfg.lock().await = cfg;
        self.reconnect().await;
    }

    /// Replace the worker with a fresh one running the stored
    /// configuration; with no stored configuration, tear everything down.
    pub async fn reconnect(&self) {
        let cfg = self.cfg.lock().await.clone();
        let mut slot = self.worker.lock().await;

        if let Some(worker) = slot.take() {
            info!("Terminating reconcile worker of {}", self.driver.kind());
            worker.cancel.cancel();
            let mut handle = worker.handle;
            if tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
            }
            self.shared.signal();
        }

        self.shared.status.set(LinkStatus {
            status: LinkState::Inactive,
            error: None,
            config: cfg.clone(),
            ifname: None,
            dns: None,
        });

        match cfg {
            Some(cfg) => {
                info!("Set new configuration for {}: {cfg:?}", self.driver.kind());
                let cancel = CancellationToken::new();
                let driver = Arc::clone(&self.driver);
                let shared = self.shared.clone();
                let worker_cancel = cancel.clone();
                let handle =
                    tokio::spawn(async move { driver.run(cfg, shared, worker_cancel).await });
                *slot = Some(Worker { handle, cancel });
            }
            None => {
                info!("Disconnecting {}", self.driver.kind());
                drop(slot);
                self.driver.clean(&self.shared).await;
            }
        }
    }

    /// Snapshot of the published status.
    pub fn status(&self) -> LinkStatus {
        self.shared.snapshot()
    }

    /// Live connection information from the driver.
    pub async fn info(&self) -> serde_json::Value {
        self.driver.info(&self.shared).await
    }

    /// The driver, for kind-specific operations such as Wi-Fi scanning.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Shared state handle (status + connectivity event).
    pub fn shared(&self) -> &LinkShared {
        &self.shared
    }
}
