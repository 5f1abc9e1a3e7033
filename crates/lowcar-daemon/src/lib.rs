//! Host-side device daemon for the lowcar protocol.
//!
//! The daemon watches two filesystem namespaces for serial ports and
//! virtual-device sockets, spins up one [`relay`] per endpoint, and
//! bridges each device into the shared-memory hub: inbound DEVICE_DATA
//! lands in the DATA stream, pending COMMAND writes and subscription
//! changes flow back out, and a watchdog retires devices that go quiet.
//!
//! Libraries in this workspace log through `tracing` and never install a
//! subscriber; the binaries under `apps/` do that.

pub mod config;
pub mod devices;
pub mod discovery;
pub mod framing;
pub mod monitor;
pub mod relay;
pub mod transport;

pub use config::{ConfigError, DaemonConfig};
pub use discovery::{Endpoint, Namespace, PortRegistry};
pub use framing::{FrameReader, LinkError};
pub use monitor::LivenessMonitor;
pub use relay::{RelayError, SubscriptionRouter};
pub use transport::{Transport, TransportError, TransportReader, TransportWriter};
