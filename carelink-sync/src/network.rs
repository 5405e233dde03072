//! Connectivity tracking.
//!
//! [`NetworkStatus`] is a cheap, cloneable handle to one shared online/offline
//! flag. Callbacks fire only on transitions, and async code can watch the
//! flag through [`NetworkStatus::subscribe`].

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    online: Vec<(u64, Callback)>,
    offline: Vec<(u64, Callback)>,
    next_id: u64,
}

struct Inner {
    tx: watch::Sender<bool>,
    callbacks: Mutex<Callbacks>,
}

/// Shared connectivity flag. Starts online.
#[derive(Clone)]
pub struct NetworkStatus {
    inner: Arc<Inner>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkStatus")
            .field("online", &self.is_online())
            .finish()
    }
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            inner: Arc::new(Inner {
                tx,
                callbacks: Mutex::new(Callbacks::default()),
            }),
        }
    }

    fn callbacks(&self) -> MutexGuard<'_, Callbacks> {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_online(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Records a connectivity observation. Returns `true` on a transition.
    ///
    /// Callbacks for the new state run on the calling thread after the
    /// internal locks are released, so they may call back into this handle.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.inner.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return false;
        }

        if online {
            info!("Network online");
        } else {
            info!("Network offline");
        }

        let to_call: Vec<Callback> = {
            let callbacks = self.callbacks();
            let list = if online {
                &callbacks.online
            } else {
                &callbacks.offline
            };
            list.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for cb in to_call {
            cb();
        }
        true
    }

    /// Registers a callback for offline → online transitions.
    pub fn on_online(&self, cb: impl Fn() + Send + Sync + 'static) -> u64 {
        let mut callbacks = self.callbacks();
        let id = callbacks.next_id;
        callbacks.next_id += 1;
        callbacks.online.push((id, Arc::new(cb)));
        id
    }

    /// Registers a callback for online → offline transitions.
    pub fn on_offline(&self, cb: impl Fn() + Send + Sync + 'static) -> u64 {
        let mut callbacks = self.callbacks();
        let id = callbacks.next_id;
        callbacks.next_id += 1;
        callbacks.offline.push((id, Arc::new(cb)));
        id
    }

    pub fn remove_online_callback(&self, id: u64) -> bool {
        let mut callbacks = self.callbacks();
        let before = callbacks.online.len();
        callbacks.online.retain(|(cb_id, _)| *cb_id != id);
        callbacks.online.len() != before
    }

    pub fn remove_offline_callback(&self, id: u64) -> bool {
        let mut callbacks = self.callbacks();
        let before = callbacks.offline.len();
        callbacks.offline.retain(|(cb_id, _)| *cb_id != id);
        callbacks.offline.len() != before
    }

    /// A receiver that observes every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Polls `probe` every `every` and feeds the result into this handle.
    ///
    /// The task runs until aborted.
    pub fn spawn_probe<P>(&self, probe: P, every: Duration) -> JoinHandle<()>
    where
        P: ConnectivityProbe + 'static,
    {
        let status = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let online = probe.check().await;
                debug!("Connectivity probe: online={}", online);
                status.set_online(online);
            }
        })
    }
}

/// Source of connectivity observations.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Treats the network as up when a TCP connection to `addr` succeeds
/// within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub addr: SocketAddr,
    pub timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn check(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(self.addr)).await,
            Ok(Ok(_))
        )
    }
}
