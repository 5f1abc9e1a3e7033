//! Per-device connection relay.
//!
//! One relay per discovered endpoint, moving through
//! `Opening -> Handshaking -> Active -> Draining -> Closed`. The lifecycle
//! role owns the transport and the other two roles: it performs the
//! handshake, claims a hub slot, spawns the inbound and outbound workers,
//! watches liveness and endpoint existence, and tears everything down in
//! order. Workers stop only at cooperative checkpoints (a timed-out read
//! slice or tick), so no lock or transport handle is ever abandoned
//! mid-operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::tick;
use lowcar_protocol::{DeviceIdentity, MAX_DEVICES, Message, MessageKind, ProtocolError};
use lowcar_shm::{Client, Hub, ShmError, Stream};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::devices::{self, DeviceType};
use crate::discovery::{Endpoint, Namespace, PortRegistry};
use crate::framing::{self, FrameReader, LinkError};
use crate::monitor::LivenessMonitor;
use crate::transport::{
    SerialTransport, SocketTransport, Transport, TransportError, TransportReader, TransportWriter,
};

/// Handshake-phase protocol errors tolerated before the endpoint is
/// written off as not a lowcar device.
const MAX_HANDSHAKE_FAULTS: u32 = 3;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("endpoint is not a lowcar device")]
    NotADevice,
    #[error("no acknowledgement within {0:?}")]
    HandshakeTimeout(Duration),
    #[error(transparent)]
    Hub(#[from] ShmError),
}

impl From<LinkError> for RelayError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Transport(e) => RelayError::Transport(e),
            LinkError::Protocol(e) => RelayError::Protocol(e),
        }
    }
}

/// Why an Active relay started Draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// Daemon-wide shutdown.
    Shutdown,
    /// The endpoint's path vanished from the namespace.
    EndpointVanished,
    /// Silence longer than the liveness window.
    DeviceTimeout,
    /// A worker stopped on its own: peer RESET or transport failure.
    WorkerStopped,
}

/// Routes drained subscription changes to the relay that owns each slot.
///
/// Any outbound role may drain the hub's changed set; entries for other
/// slots are parked here until their own relay polls.
pub struct SubscriptionRouter {
    pending: Mutex<[Option<u32>; MAX_DEVICES]>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new([None; MAX_DEVICES]),
        }
    }

    /// Drains the hub and returns the pending mask for `slot`, if any.
    pub fn poll(&self, hub: &Hub, slot: usize) -> Option<u32> {
        let mut pending = self.pending.lock();
        for (changed_slot, mask) in hub.drain_subscriptions() {
            pending[changed_slot] = Some(mask);
        }
        pending[slot].take()
    }

    /// Drops any mask parked for `slot`. Called when a relay claims the
    /// slot for a fresh connection: a mask drained on behalf of the
    /// previous occupant must not reach its successor.
    pub fn forget(&self, slot: usize) {
        self.pending.lock()[slot] = None;
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one relay to completion and releases the discovery claim.
///
/// Clean teardowns release immediately; failures and worker-initiated
/// stops release with a cooldown so a misbehaving endpoint is not
/// re-probed in a tight loop.
pub fn run(
    endpoint: Endpoint,
    hub: Arc<Hub>,
    registry: Arc<PortRegistry>,
    router: Arc<SubscriptionRouter>,
    config: &DaemonConfig,
    shutdown: &AtomicBool,
) {
    debug!(path = %endpoint.path.display(), "opening");
    let result = match endpoint.namespace {
        Namespace::Physical => SerialTransport::open(&endpoint.path, config.read_slice())
            .map_err(RelayError::from)
            .and_then(|t| service(t, &endpoint, &hub, &router, config, shutdown)),
        Namespace::Virtual => SocketTransport::open(&endpoint.path, config.read_slice())
            .map_err(RelayError::from)
            .and_then(|t| service(t, &endpoint, &hub, &router, config, shutdown)),
    };

    match result {
        Ok(Teardown::Shutdown) | Ok(Teardown::EndpointVanished) => registry.release(&endpoint),
        Ok(reason) => {
            debug!(path = %endpoint.path.display(), ?reason, "cooling down");
            registry.release_with_cooldown(&endpoint, Instant::now() + config.cooldown());
        }
        Err(e) => {
            warn!(path = %endpoint.path.display(), error = %e, "connection abandoned");
            registry.release_with_cooldown(&endpoint, Instant::now() + config.cooldown());
        }
    }
}

/// Handshaking through Closed, on an already-open transport.
fn service<T: Transport>(
    transport: T,
    endpoint: &Endpoint,
    hub: &Hub,
    router: &SubscriptionRouter,
    config: &DaemonConfig,
    shutdown: &AtomicBool,
) -> Result<Teardown, RelayError> {
    let (reader, mut writer) = transport.split()?;
    let mut frames = FrameReader::new(reader);

    let identity = handshake(&mut frames, &mut writer, config.handshake_timeout())?;
    let Some(device) = devices::device_type(identity.dev_type) else {
        warn!(%identity, "unknown device type");
        return Err(RelayError::NotADevice);
    };

    // the hub is touched only after a completed handshake
    let slot = hub.connect(&identity)?;
    router.forget(slot);
    info!(%identity, device = device.name, slot, "device online");

    let monitor = LivenessMonitor::new(config.device_timeout());
    let stop = AtomicBool::new(false);

    let reason = std::thread::scope(|scope| {
        let inbound =
            scope.spawn(|| inbound_loop(frames, hub, slot, identity.uid, device, &monitor, &stop));
        let outbound =
            scope.spawn(|| outbound_loop(writer, hub, router, slot, device, config, &stop));

        // lifecycle role: the watchdog
        let reason = loop {
            std::thread::sleep(config.watchdog_interval());
            if shutdown.load(Ordering::Acquire) {
                break Teardown::Shutdown;
            }
            if stop.load(Ordering::Acquire) {
                break Teardown::WorkerStopped;
            }
            if !endpoint.path.exists() {
                break Teardown::EndpointVanished;
            }
            if !monitor.is_alive() {
                break Teardown::DeviceTimeout;
            }
        };

        debug!(slot, ?reason, "draining");
        stop.store(true, Ordering::Release);
        let _ = inbound.join();
        if let Ok(mut writer) = outbound.join() {
            // best-effort goodbye; the transport closes right after
            let _ = framing::send_message(&mut writer, &Message::reset());
        }
        reason
    });

    if let Err(e) = hub.disconnect(slot) {
        warn!(slot, error = %e, "hub slot release failed");
    }
    info!(slot, ?reason, "device offline");
    Ok(reason)
}

/// Sends the opening PING and waits, bounded, for the ACKNOWLEDGEMENT.
fn handshake<R: TransportReader, W: TransportWriter>(
    frames: &mut FrameReader<R>,
    writer: &mut W,
    timeout: Duration,
) -> Result<DeviceIdentity, RelayError> {
    framing::send_message(writer, &Message::ping())?;
    let deadline = Instant::now() + timeout;
    let mut faults = 0;
    loop {
        match frames.next_message() {
            Ok(message) if message.kind == MessageKind::Acknowledgement => {
                return message.identity().map_err(|e| {
                    warn!(error = %e, "malformed acknowledgement");
                    RelayError::NotADevice
                });
            }
            Ok(message) => {
                warn!(kind = ?message.kind, "first frame is not an acknowledgement");
                return Err(RelayError::NotADevice);
            }
            Err(LinkError::Protocol(e)) => {
                faults += 1;
                debug!(fault = faults, error = %e, "handshake frame rejected");
                if faults >= MAX_HANDSHAKE_FAULTS {
                    return Err(RelayError::NotADevice);
                }
            }
            Err(LinkError::Transport(TransportError::Timeout)) => {
                if Instant::now() >= deadline {
                    return Err(RelayError::HandshakeTimeout(timeout));
                }
            }
            Err(LinkError::Transport(e)) => return Err(e.into()),
        }
    }
}

/// Inbound role: bounded-slice read loop publishing into the hub.
fn inbound_loop<R: TransportReader>(
    mut frames: FrameReader<R>,
    hub: &Hub,
    slot: usize,
    uid: u64,
    device: &'static DeviceType,
    monitor: &LivenessMonitor,
    stop: &AtomicBool,
) {
    let schema = device.schema();
    while !stop.load(Ordering::Acquire) {
        match frames.next_message() {
            Ok(message) => {
                monitor.touch();
                match message.kind {
                    MessageKind::DeviceData => match message.values(&schema) {
                        Ok((mask, values)) => {
                            if let Err(e) =
                                hub.write(Client::DeviceHandler, slot, Stream::Data, mask, &values)
                            {
                                warn!(slot, error = %e, "data publish failed");
                            }
                        }
                        Err(e) => warn!(slot, error = %e, "undecodable DEVICE_DATA dropped"),
                    },
                    MessageKind::Log => match message.log_text() {
                        Ok(text) => {
                            info!(device = device.name, uid = format_args!("{uid:016x}"), "{text}")
                        }
                        Err(e) => warn!(slot, error = %e, "undecodable LOG dropped"),
                    },
                    MessageKind::Reset => {
                        info!(slot, "peer requested reset");
                        stop.store(true, Ordering::Release);
                    }
                    // liveness refresh only
                    MessageKind::Ping => {}
                    kind => warn!(slot, ?kind, "unexpected message dropped"),
                }
            }
            Err(LinkError::Protocol(e)) => warn!(slot, error = %e, "malformed frame dropped"),
            // the cooperative checkpoint
            Err(LinkError::Transport(TransportError::Timeout)) => {}
            Err(LinkError::Transport(e)) => {
                warn!(slot, error = %e, "transport read failed");
                stop.store(true, Ordering::Release);
            }
        }
    }
}

/// Outbound role: tick-driven drain of pending commands, subscription
/// forwarding and heartbeat PINGs. Never blocks on reads. Returns the
/// writer so the lifecycle role can send the final RESET.
fn outbound_loop<W: TransportWriter>(
    mut writer: W,
    hub: &Hub,
    router: &SubscriptionRouter,
    slot: usize,
    device: &'static DeviceType,
    config: &DaemonConfig,
    stop: &AtomicBool,
) -> W {
    let schema = device.schema();
    let ticker = tick(config.command_tick());
    let mut last_ping = Instant::now();

    while !stop.load(Ordering::Acquire) {
        // bounded wait doubles as the cancellation checkpoint
        if ticker.recv_timeout(Duration::from_millis(50)).is_err() {
            continue;
        }

        let map = hub.changed_commands();
        if map.slots & (1 << slot) != 0 {
            // consume every changed bit, but only forward writable params
            let mask = map.params[slot];
            let writable = mask & device.writable_mask();
            if writable != mask {
                warn!(
                    slot,
                    dropped = format_args!("{:#010x}", mask & !writable),
                    "read-only params in command write"
                );
            }
            match hub.read(Client::DeviceHandler, slot, Stream::Command, mask) {
                Ok(values) if writable != 0 => {
                    let values: Vec<_> = (0..u32::BITS)
                        .filter(|bit| mask & (1 << bit) != 0)
                        .zip(values)
                        .filter(|(bit, _)| writable & (1 << bit) != 0)
                        .map(|(_, value)| value)
                        .collect();
                    match Message::device_write(writable, &values, &schema) {
                        Ok(message) => {
                            if !send_or_stop(&mut writer, &message, slot, stop) {
                                break;
                            }
                        }
                        Err(e) => warn!(slot, error = %e, "unsendable command dropped"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(slot, error = %e, "command drain failed"),
            }
        }

        if let Some(mask) = router.poll(hub, slot) {
            let message = Message::subscription_request(
                mask,
                config.sub_request_interval_ms,
                config.interval_bounds(),
            );
            debug!(slot, mask = format_args!("{mask:#010x}"), "subscription forwarded");
            if !send_or_stop(&mut writer, &message, slot, stop) {
                break;
            }
        }

        if last_ping.elapsed() >= config.ping_interval() {
            if !send_or_stop(&mut writer, &Message::ping(), slot, stop) {
                break;
            }
            last_ping = Instant::now();
        }
    }
    writer
}

/// Returns false after a transport failure, which also raises the stop
/// flag. Frame-construction failures only drop the one message.
fn send_or_stop<W: TransportWriter>(
    writer: &mut W,
    message: &Message,
    slot: usize,
    stop: &AtomicBool,
) -> bool {
    match framing::send_message(writer, message) {
        Ok(()) => true,
        Err(LinkError::Protocol(e)) => {
            warn!(slot, error = %e, "frame construction failed");
            true
        }
        Err(LinkError::Transport(e)) => {
            warn!(slot, error = %e, "transport write failed");
            stop.store(true, Ordering::Release);
            false
        }
    }
}
