//! Domain resolution on an open connection.
//!
//! Lookup is by UUID only: names are mutable and must not be used as
//! identity.

use tracing::debug;

use crate::connection::Connection;
use crate::error::{Result, VirtError};
use crate::transport::DomainRef;

/// Resolve a domain by UUID on the connection's host.
///
/// Fails with [`VirtError::DomainMissing`] when no such domain exists,
/// and with [`VirtError::HostUnreachable`] when the channel degraded
/// mid-lookup, so callers can distinguish "not found" from "couldn't
/// check".
pub async fn resolve(conn: &Connection, uuid: &str) -> Result<Box<dyn DomainRef>> {
    conn.channel()
        .lookup(uuid)
        .await
        .map_err(|e| VirtError::classify(conn.host(), "domain lookup", e))
}

/// Whether a domain with `uuid` exists on the connection's host.
///
/// Enumerates all domains known to the host and checks membership;
/// only a degraded channel turns this into an error.
pub async fn exists(conn: &Connection, uuid: &str) -> Result<bool> {
    let uuids = conn
        .channel()
        .list_uuids()
        .await
        .map_err(|e| VirtError::classify(conn.host(), "domain enumeration", e))?;

    let found = uuids.iter().any(|u| u == uuid);
    debug!(host = %conn.host(), uuid = %uuid, found, "Domain membership check");
    Ok(found)
}
