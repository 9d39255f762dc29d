//! Libvirt transport implementation.
//!
//! All libvirt FFI calls run inside `spawn_blocking` closures; domain
//! pointers never cross a thread or await point, only the connection
//! handle and plain data do.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use virt::connect::Connect;
use virt::domain::Domain;
use virt::sys;

use crate::config::RemoteConfig;
use crate::transport::{
    DomainChannel, DomainRef, Transport, TransportError, TransportResult,
};

async fn blocking<T, F>(f: F) -> TransportResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TransportResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Call(format!("blocking task failed: {e}")))?
}

/// Transport backend over the libvirt client library.
pub struct LibvirtTransport {
    connect_timeout: Duration,
}

impl LibvirtTransport {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl Transport for LibvirtTransport {
    async fn connect(&self, uri: &str) -> TransportResult<Box<dyn DomainChannel>> {
        info!(uri = %uri, "Connecting to libvirt");

        let uri_owned = uri.to_string();
        let result = tokio::time::timeout(
            self.connect_timeout,
            tokio::task::spawn_blocking(move || Connect::open(Some(&uri_owned))),
        )
        .await;

        let conn = match result {
            Ok(Ok(Ok(conn))) => conn,
            Ok(Ok(Err(e))) => return Err(TransportError::Connect(e.to_string())),
            Ok(Err(e)) => {
                return Err(TransportError::Connect(format!("task failed: {e}")))
            }
            Err(_) => {
                return Err(TransportError::Connect(format!(
                    "timed out after {:?}",
                    self.connect_timeout
                )))
            }
        };

        info!(uri = %uri, "Connected to libvirt");

        Ok(Box::new(LibvirtChannel {
            conn: Mutex::new(Some(conn)),
        }))
    }
}

/// One open libvirt connection.
struct LibvirtChannel {
    conn: Mutex<Option<Connect>>,
}

impl LibvirtChannel {
    fn conn_clone(&self) -> TransportResult<Connect> {
        self.conn
            .lock()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?
            .as_ref()
            .cloned()
            .ok_or_else(|| TransportError::ChannelLost("channel closed".to_string()))
    }
}

#[async_trait]
impl DomainChannel for LibvirtChannel {
    async fn define_xml(&self, xml: &str) -> TransportResult<String> {
        let conn = self.conn_clone()?;
        let xml = xml.to_string();

        blocking(move || {
            let domain = Domain::define_xml(&conn, &xml)
                .map_err(|e| TransportError::DefineRejected(e.to_string()))?;
            domain
                .get_uuid_string()
                .map_err(|e| TransportError::Call(e.to_string()))
        })
        .await
    }

    async fn lookup(&self, uuid: &str) -> TransportResult<Box<dyn DomainRef>> {
        let conn = self.conn_clone()?;
        let uuid_owned = uuid.to_string();

        let found = blocking(move || {
            match Domain::lookup_by_uuid_string(&conn, &uuid_owned) {
                Ok(_) => Ok(true),
                // An absent domain and a degraded channel both surface
                // as a lookup error; the connection's own liveness
                // tells them apart.
                Err(e) => match conn.is_alive() {
                    Ok(true) => Ok(false),
                    _ => Err(TransportError::ChannelLost(e.to_string())),
                },
            }
        })
        .await?;

        if !found {
            return Err(TransportError::NoSuchDomain(uuid.to_string()));
        }

        Ok(Box::new(LibvirtDomain {
            conn: Mutex::new(self.conn_clone()?),
            uuid: uuid.to_string(),
        }))
    }

    async fn list_uuids(&self) -> TransportResult<Vec<String>> {
        let conn = self.conn_clone()?;

        blocking(move || {
            let flags = sys::VIR_CONNECT_LIST_DOMAINS_ACTIVE
                | sys::VIR_CONNECT_LIST_DOMAINS_INACTIVE;

            let domains = conn
                .list_all_domains(flags)
                .map_err(|e| TransportError::ChannelLost(e.to_string()))?;

            let mut uuids = Vec::with_capacity(domains.len());
            for domain in domains {
                let uuid = domain
                    .get_uuid_string()
                    .map_err(|e| TransportError::Call(e.to_string()))?;
                uuids.push(uuid);
            }

            debug!(count = uuids.len(), "Listed domains");
            Ok(uuids)
        })
        .await
    }

    fn close(&self) {
        let Ok(mut guard) = self.conn.lock() else {
            return;
        };
        if let Some(mut conn) = guard.take() {
            if let Err(e) = conn.close() {
                warn!(error = %e, "Failed to close libvirt connection");
            }
        }
    }
}

/// A domain addressed by UUID on one open connection.
struct LibvirtDomain {
    conn: Mutex<Connect>,
    uuid: String,
}

impl LibvirtDomain {
    async fn with_domain<T, F>(&self, f: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Domain) -> Result<T, virt::error::Error> + Send + 'static,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?
            .clone();
        let uuid = self.uuid.clone();

        blocking(move || {
            let domain = Domain::lookup_by_uuid_string(&conn, &uuid)
                .map_err(|_| TransportError::NoSuchDomain(uuid.clone()))?;
            f(&domain).map_err(|e| TransportError::Call(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl DomainRef for LibvirtDomain {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    async fn state_code(&self) -> TransportResult<i32> {
        self.with_domain(|d| d.get_state().map(|(state, _)| state as i32))
            .await
    }

    async fn create(&self) -> TransportResult<()> {
        self.with_domain(|d| d.create().map(|_| ())).await
    }

    async fn reboot(&self) -> TransportResult<()> {
        self.with_domain(|d| d.reboot(sys::VIR_DOMAIN_REBOOT_DEFAULT).map(|_| ()))
            .await
    }

    async fn shutdown(&self) -> TransportResult<()> {
        self.with_domain(|d| d.shutdown().map(|_| ())).await
    }

    async fn destroy(&self) -> TransportResult<()> {
        self.with_domain(|d| d.destroy().map(|_| ())).await
    }

    async fn undefine(&self) -> TransportResult<()> {
        self.with_domain(|d| d.undefine().map(|_| ())).await
    }
}
