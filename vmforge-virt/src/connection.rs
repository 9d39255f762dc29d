//! Control connection establishment and scoped release.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::VirtConfig;
use crate::error::{Result, VirtError};
use crate::reachability::{LivenessProbe, Reachability};
use crate::transport::{DomainChannel, Transport};
use crate::types::HostAddress;

/// A live control channel to one host's hypervisor.
///
/// Exclusively owned by the lifecycle call that opened it and released
/// when the guard drops, on every exit path. Domain references resolved
/// through it must not outlive it.
pub struct Connection {
    host: HostAddress,
    channel: Box<dyn DomainChannel>,
}

impl Connection {
    /// The host this channel talks to.
    pub fn host(&self) -> &HostAddress {
        &self.host
    }

    pub(crate) fn channel(&self) -> &dyn DomainChannel {
        self.channel.as_ref()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!(host = %self.host, "Releasing hypervisor channel");
        self.channel.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("host", &self.host).finish()
    }
}

/// Opens control connections, probing remote hosts first.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    reachability: Reachability,
    config: VirtConfig,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        probe: Arc<dyn LivenessProbe>,
        config: VirtConfig,
    ) -> Self {
        let reachability = Reachability::new(probe, config.probe.attempts);
        Self {
            transport,
            reachability,
            config,
        }
    }

    /// Open a control connection to `host`.
    ///
    /// Remote hosts are liveness-probed first; an unreachable host
    /// fails here without any channel establishment attempt, so the
    /// caller is never left waiting on a transport-level timeout.
    /// Channel establishment failures are reported as unreachable with
    /// the transport cause attached.
    #[instrument(skip(self), fields(host = %host))]
    pub async fn open(&self, host: &HostAddress) -> Result<Connection> {
        if !host.is_local() && !self.reachability.is_reachable(host).await {
            return Err(VirtError::HostUnreachable {
                host: host.clone(),
                source: None,
            });
        }

        let uri = self.config.uri_for(host);
        debug!(uri = %uri, "Opening hypervisor channel");

        let channel = self
            .transport
            .connect(&uri)
            .await
            .map_err(|e| VirtError::HostUnreachable {
                host: host.clone(),
                source: Some(e),
            })?;

        Ok(Connection {
            host: host.clone(),
            channel,
        })
    }
}
