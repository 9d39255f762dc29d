//! Transport seam between the lifecycle core and hypervisor backends.
//!
//! The core drives domains exclusively through these traits, so the
//! in-memory [`MockTransport`](crate::mock::MockTransport) can stand in
//! for libvirt in every test, and the real `LibvirtTransport` stays
//! behind the `libvirt` feature.

use async_trait::async_trait;
use thiserror::Error;

/// Low-level failure reported by a transport backend.
///
/// Backends report *what* went wrong at the wire; the core classifies
/// it into the caller-facing [`VirtError`](crate::error::VirtError)
/// taxonomy.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Channel establishment failed.
    #[error("channel establishment failed: {0}")]
    Connect(String),

    /// No domain with the given UUID on this host.
    #[error("no domain with UUID {0}")]
    NoSuchDomain(String),

    /// The channel degraded mid-operation.
    #[error("channel lost: {0}")]
    ChannelLost(String),

    /// The hypervisor refused a definition document.
    #[error("definition rejected: {0}")]
    DefineRejected(String),

    /// Any other failed hypervisor call.
    #[error("hypervisor call failed: {0}")]
    Call(String),
}

/// Result type alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Opens control channels to hypervisor endpoints.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a control channel to the endpoint identified by `uri`.
    async fn connect(&self, uri: &str) -> TransportResult<Box<dyn DomainChannel>>;
}

/// One open control channel to a host's hypervisor.
#[async_trait]
pub trait DomainChannel: Send + Sync {
    /// Submit a domain definition document. Returns the new domain's
    /// UUID.
    async fn define_xml(&self, xml: &str) -> TransportResult<String>;

    /// Resolve a domain by UUID.
    ///
    /// Backends must report [`TransportError::NoSuchDomain`] for an
    /// absent UUID and [`TransportError::ChannelLost`] when the lookup
    /// could not be performed at all.
    async fn lookup(&self, uuid: &str) -> TransportResult<Box<dyn DomainRef>>;

    /// UUIDs of every domain known to this host, active or not.
    async fn list_uuids(&self) -> TransportResult<Vec<String>>;

    /// Release the channel. Best-effort; called on every exit path via
    /// the owning [`Connection`](crate::connection::Connection) guard.
    fn close(&self);
}

/// A resolved domain reference, valid only while the channel that
/// produced it is open.
#[async_trait]
pub trait DomainRef: Send + Sync {
    /// The domain's UUID.
    fn uuid(&self) -> &str;

    /// Raw hypervisor state code.
    async fn state_code(&self) -> TransportResult<i32>;

    /// Boot the defined domain.
    async fn create(&self) -> TransportResult<()>;

    /// Request a soft reboot of the running instance.
    async fn reboot(&self) -> TransportResult<()>;

    /// Request a graceful guest shutdown.
    async fn shutdown(&self) -> TransportResult<()>;

    /// Force-destroy the running instance.
    async fn destroy(&self) -> TransportResult<()>;

    /// Remove the domain definition permanently.
    async fn undefine(&self) -> TransportResult<()>;
}
