//! Endpoint discovery over two filesystem namespaces.
//!
//! Physical boards appear as serial character devices, virtual boards as
//! unix sockets. A fixed-interval scan claims each index that exists and
//! is not yet handled; relays release their claim on teardown, optionally
//! with a cooldown so a misbehaving endpoint is not re-probed immediately.
//! Scan and teardown race on the claim set and serialize through its lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, select, tick};
use lowcar_shm::Hub;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::DaemonConfig;
use crate::relay::{self, SubscriptionRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Physical,
    Virtual,
}

impl Namespace {
    fn index(self) -> usize {
        match self {
            Namespace::Physical => 0,
            Namespace::Virtual => 1,
        }
    }
}

/// One discovered endpoint, claimed until its relay releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub namespace: Namespace,
    pub port: usize,
    pub path: PathBuf,
}

struct RegistryState {
    // one claim bitmap per namespace
    claimed: [u64; 2],
    // (namespace, port, earliest re-probe time)
    cooldowns: Vec<(Namespace, usize, Instant)>,
}

/// The claim set shared between the discovery loop and relay teardown.
pub struct PortRegistry {
    physical_prefix: String,
    virtual_prefix: String,
    max_endpoints: usize,
    state: Mutex<RegistryState>,
}

impl PortRegistry {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            physical_prefix: config.physical_prefix.clone(),
            virtual_prefix: config.virtual_prefix.clone(),
            max_endpoints: config.max_endpoints.min(64),
            state: Mutex::new(RegistryState {
                claimed: [0; 2],
                cooldowns: Vec::new(),
            }),
        }
    }

    fn path_of(&self, namespace: Namespace, port: usize) -> PathBuf {
        let prefix = match namespace {
            Namespace::Physical => &self.physical_prefix,
            Namespace::Virtual => &self.virtual_prefix,
        };
        PathBuf::from(format!("{prefix}{port}"))
    }

    /// One scan pass: claims and returns every unclaimed, non-cooling
    /// index whose path currently exists.
    pub fn scan(&self) -> Vec<Endpoint> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.cooldowns.retain(|(_, _, until)| *until > now);

        let mut found = Vec::new();
        for namespace in [Namespace::Physical, Namespace::Virtual] {
            for port in 0..self.max_endpoints {
                if state.claimed[namespace.index()] & (1 << port) != 0 {
                    continue;
                }
                if state
                    .cooldowns
                    .iter()
                    .any(|(ns, p, _)| *ns == namespace && *p == port)
                {
                    continue;
                }
                let path = self.path_of(namespace, port);
                if path.exists() {
                    state.claimed[namespace.index()] |= 1 << port;
                    found.push(Endpoint {
                        namespace,
                        port,
                        path,
                    });
                }
            }
        }
        found
    }

    /// Releases a claim so the next scan may pick the index up again.
    pub fn release(&self, endpoint: &Endpoint) {
        let mut state = self.state.lock();
        state.claimed[endpoint.namespace.index()] &= !(1 << endpoint.port);
        debug!(?endpoint.namespace, port = endpoint.port, "claim released");
    }

    /// Releases a claim but blocks re-probing until `until`.
    pub fn release_with_cooldown(&self, endpoint: &Endpoint, until: Instant) {
        let mut state = self.state.lock();
        state.claimed[endpoint.namespace.index()] &= !(1 << endpoint.port);
        state
            .cooldowns
            .push((endpoint.namespace, endpoint.port, until));
        debug!(?endpoint.namespace, port = endpoint.port, "claim released with cooldown");
    }
}

/// Runs discovery until `stop` fires, spawning one relay per discovered
/// endpoint. Joins all relays before returning.
pub fn run(
    hub: Arc<Hub>,
    registry: Arc<PortRegistry>,
    config: &DaemonConfig,
    stop: Receiver<()>,
) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let router = Arc::new(SubscriptionRouter::new());
    let ticker = tick(config.scan_interval());
    let mut relays: Vec<JoinHandle<()>> = Vec::new();

    info!(
        physical = %config.physical_prefix,
        virtual_ns = %config.virtual_prefix,
        "discovery started"
    );
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                for endpoint in registry.scan() {
                    info!(path = %endpoint.path.display(), "endpoint discovered");
                    let hub = Arc::clone(&hub);
                    let registry = Arc::clone(&registry);
                    let router = Arc::clone(&router);
                    let shutdown = Arc::clone(&shutdown);
                    let config = config.clone();
                    relays.push(std::thread::spawn(move || {
                        relay::run(endpoint, hub, registry, router, &config, &shutdown);
                    }));
                }
                relays.retain(|handle| !handle.is_finished());
            }
        }
    }

    shutdown.store(true, Ordering::Release);
    for handle in relays {
        let _ = handle.join();
    }
    info!("discovery stopped");
}
