//! Domain lifecycle operations.
//!
//! Every operation opens its own control connection, resolves the
//! domain, checks the power-state precondition, then acts. Operations
//! whose desired end state already holds return success without a
//! second hypervisor call, so an orchestration layer can reissue them
//! unconditionally from a reconciliation loop.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::VirtConfig;
use crate::connection::ConnectionManager;
use crate::error::{Result, VirtError};
use crate::locator;
use crate::reachability::LivenessProbe;
use crate::transport::{DomainRef, Transport};
use crate::types::{HostAddress, LogicalState};

/// Hypervisor control API over (host, domain UUID) pairs.
///
/// Safe to share and call concurrently for distinct domains; callers
/// must serialize operations against the same (host, UUID) pair
/// themselves, since a power transition already in flight makes a
/// concurrent one meaningless.
pub struct VirtApi {
    connections: ConnectionManager,
}

impl VirtApi {
    /// Build an API over an explicit transport and probe. This is the
    /// constructor tests and non-libvirt deployments use.
    pub fn new(
        transport: Arc<dyn Transport>,
        probe: Arc<dyn LivenessProbe>,
        config: VirtConfig,
    ) -> Self {
        Self {
            connections: ConnectionManager::new(transport, probe, config),
        }
    }

    /// Build an API over the libvirt transport with ICMP probing.
    #[cfg(feature = "libvirt")]
    pub fn libvirt(config: VirtConfig) -> Self {
        let transport = Arc::new(crate::libvirt::LibvirtTransport::new(&config.remote));
        let probe = Arc::new(crate::reachability::FpingProbe::new(&config.probe));
        Self::new(transport, probe, config)
    }

    /// Submit a new domain definition document to the host's
    /// hypervisor. The document is treated as opaque; the hypervisor
    /// itself rejects malformed input.
    ///
    /// Returns the new domain's UUID.
    #[instrument(skip(self, xml), fields(host = %host))]
    pub async fn define(&self, host: &HostAddress, xml: &str) -> Result<String> {
        let conn = self.connections.open(host).await?;

        let uuid = conn
            .channel()
            .define_xml(xml)
            .await
            .map_err(|e| VirtError::classify(host, "define domain", e))?;

        info!(uuid = %uuid, "Domain defined");
        Ok(uuid)
    }

    /// Whether a domain with `uuid` exists on `host`.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn exists(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let conn = self.connections.open(host).await?;
        locator::exists(&conn, uuid).await
    }

    /// Read the domain's raw state code and its logical
    /// classification.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn status(&self, host: &HostAddress, uuid: &str) -> Result<(i32, LogicalState)> {
        let conn = self.connections.open(host).await?;
        let domain = locator::resolve(&conn, uuid).await?;
        let code = self.state_code(host, &*domain).await?;
        Ok((code, LogicalState::from_raw(code)))
    }

    /// Like [`status`](Self::status), but total: connection failure and
    /// domain absence come back as the synthesized
    /// [`LogicalState::HostUnreachable`] / [`LogicalState::Missing`]
    /// states instead of errors, and any other failure degrades to
    /// [`LogicalState::Unknown`].
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn logical_state(&self, host: &HostAddress, uuid: &str) -> LogicalState {
        match self.status(host, uuid).await {
            Ok((_, state)) => state,
            Err(VirtError::HostUnreachable { .. }) => LogicalState::HostUnreachable,
            Err(VirtError::DomainMissing { .. }) => LogicalState::Missing,
            Err(_) => LogicalState::Unknown,
        }
    }

    /// Boot the domain.
    ///
    /// Idempotent: a domain already in a running-family state is left
    /// alone and the call succeeds without a second hypervisor call.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn start(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let conn = self.connections.open(host).await?;
        let domain = locator::resolve(&conn, uuid).await?;

        if self.current_state(host, &*domain).await?.is_running_family() {
            debug!("Domain already running, nothing to do");
            return Ok(true);
        }

        domain
            .create()
            .await
            .map_err(|e| VirtError::classify(host, "start domain", e))?;

        info!("Domain started");
        Ok(true)
    }

    /// Request a soft reboot.
    ///
    /// Rebooting a domain that is not running is meaningless: the call
    /// returns `false` without contacting the hypervisor's reboot
    /// entry point.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn reboot(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let conn = self.connections.open(host).await?;
        let domain = locator::resolve(&conn, uuid).await?;

        if !self.current_state(host, &*domain).await?.is_running_family() {
            debug!("Domain not running, reboot skipped");
            return Ok(false);
        }

        domain
            .reboot()
            .await
            .map_err(|e| VirtError::classify(host, "reboot domain", e))?;

        info!("Domain reboot requested");
        Ok(true)
    }

    /// Request a graceful guest shutdown.
    ///
    /// A domain that is not running is already in the desired end
    /// state: the call succeeds without a hypervisor call.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn shutdown(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let conn = self.connections.open(host).await?;
        let domain = locator::resolve(&conn, uuid).await?;

        if !self.current_state(host, &*domain).await?.is_running_family() {
            debug!("Domain not running, already in desired state");
            return Ok(true);
        }

        domain
            .shutdown()
            .await
            .map_err(|e| VirtError::classify(host, "shutdown domain", e))?;

        info!("Domain shutdown requested");
        Ok(true)
    }

    /// Force-destroy the running instance.
    ///
    /// Same end-state contract as [`shutdown`](Self::shutdown): a
    /// stopped domain is a quiet success.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn poweroff(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let conn = self.connections.open(host).await?;
        let domain = locator::resolve(&conn, uuid).await?;

        if !self.current_state(host, &*domain).await?.is_running_family() {
            debug!("Domain not running, already in desired state");
            return Ok(true);
        }

        domain
            .destroy()
            .await
            .map_err(|e| VirtError::classify(host, "poweroff domain", e))?;

        info!("Domain powered off");
        Ok(true)
    }

    /// Remove the domain definition permanently.
    ///
    /// The hypervisor may refuse (a running domain, per its policy);
    /// that refusal surfaces as [`VirtError::Hypervisor`] with the
    /// cause attached.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn undefine(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let conn = self.connections.open(host).await?;
        let domain = locator::resolve(&conn, uuid).await?;

        domain
            .undefine()
            .await
            .map_err(|e| VirtError::classify(host, "undefine domain", e))?;

        info!("Domain undefined");
        Ok(true)
    }

    /// Whether the domain is in a running-family state (running,
    /// blocked, paused or suspended instances all count as "on").
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn is_running(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let (_, state) = self.status(host, uuid).await?;
        Ok(state.is_running_family())
    }

    /// Whether the domain is shut off.
    #[instrument(skip(self), fields(host = %host, uuid = %uuid))]
    pub async fn is_shutoff(&self, host: &HostAddress, uuid: &str) -> Result<bool> {
        let (_, state) = self.status(host, uuid).await?;
        Ok(state == LogicalState::ShutOff)
    }

    async fn state_code(&self, host: &HostAddress, domain: &dyn DomainRef) -> Result<i32> {
        domain
            .state_code()
            .await
            .map_err(|e| VirtError::classify(host, "read domain state", e))
    }

    async fn current_state(
        &self,
        host: &HostAddress,
        domain: &dyn DomainRef,
    ) -> Result<LogicalState> {
        let code = self.state_code(host, domain).await?;
        Ok(LogicalState::from_raw(code))
    }
}
