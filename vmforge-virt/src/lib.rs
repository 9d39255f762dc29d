//! # vmforge Virt
//!
//! Hypervisor control core for driving virtual machine lifecycle on
//! local and remote libvirt hosts.
//!
//! The crate is the layer an orchestrator calls when it has already
//! decided *what* should happen to a domain; this layer knows *how*:
//! it probes host liveness, opens the control channel (local or
//! SSH-tunneled), resolves the domain by UUID, checks power-state
//! preconditions and performs the transition, reporting failures as a
//! small closed taxonomy the caller can branch on.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │                  VirtApi                   │
//! │ (define, status, start, reboot, shutdown,  │
//! │        poweroff, undefine, exists)         │
//! └─────────────────────┬──────────────────────┘
//!                       │ ConnectionManager + DomainLocator
//!                       ▼
//! ┌────────────────────────────────────────────┐
//! │        Transport / DomainChannel trait     │
//! └─────────┬──────────────────────┬───────────┘
//!           ▼                      ▼
//! ┌───────────────────┐  ┌───────────────────┐
//! │ LibvirtTransport  │  │  MockTransport    │
//! │  (via libvirt)    │  │   (in-memory)     │
//! └───────────────────┘  └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmforge_virt::{HostAddress, VirtApi, VirtConfig};
//!
//! #[tokio::main]
//! async fn main() -> vmforge_virt::Result<()> {
//!     let api = VirtApi::libvirt(VirtConfig::default());
//!     let host = HostAddress::new("10.0.0.5");
//!
//!     let (code, state) = api.status(&host, "9c7f...").await?;
//!     if !state.is_running_family() {
//!         api.start(&host, "9c7f...").await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Operations are idempotent where the desired end state may already
//! hold, so a reconciliation loop can reissue them unconditionally.
//! Callers serialize operations per (host, UUID) pair; calls for
//! distinct domains are safe to run concurrently.

pub mod config;
pub mod connection;
pub mod error;
pub mod libvirt;
pub mod lifecycle;
mod locator;
pub mod migration;
pub mod mock;
pub mod reachability;
pub mod transport;
pub mod types;

pub use config::{ProbeConfig, RemoteConfig, VirtConfig};
pub use connection::{Connection, ConnectionManager};
pub use error::{Result, VirtError};
pub use lifecycle::VirtApi;
pub use migration::{HostIdentity, MigrationRecord, MigrationRecordBuilder};
pub use mock::{MockCounters, MockProbe, MockTransport};
pub use reachability::{FpingProbe, LivenessProbe, Reachability};
pub use transport::{DomainChannel, DomainRef, Transport, TransportError};
pub use types::{HostAddress, LogicalState};

// Re-export the libvirt transport when compiled in
#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtTransport;
