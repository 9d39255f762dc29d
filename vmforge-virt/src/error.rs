//! Error types for the hypervisor control core.

use thiserror::Error;

use crate::transport::TransportError;
use crate::types::HostAddress;

/// Errors that can occur while driving a domain's lifecycle.
///
/// The set is deliberately closed so callers can branch on cause:
/// retry later on [`VirtError::HostUnreachable`], re-check placement on
/// [`VirtError::DomainMissing`], fix the input on
/// [`VirtError::DefineRejected`]. The underlying transport failure is
/// preserved as the error source for diagnostics.
#[derive(Debug, Error)]
pub enum VirtError {
    /// The host failed liveness probing, or the control channel could
    /// not be established or was lost mid-operation.
    #[error("host {host} is unreachable")]
    HostUnreachable {
        host: HostAddress,
        #[source]
        source: Option<TransportError>,
    },

    /// No domain with the given UUID exists on the host.
    #[error("domain {uuid} does not exist on host {host}")]
    DomainMissing { host: HostAddress, uuid: String },

    /// The hypervisor refused a domain definition document.
    #[error("hypervisor rejected domain definition on host {host}")]
    DefineRejected {
        host: HostAddress,
        #[source]
        source: TransportError,
    },

    /// Any other hypervisor-reported failure.
    #[error("{op} failed on host {host}")]
    Hypervisor {
        op: &'static str,
        host: HostAddress,
        #[source]
        source: TransportError,
    },
}

impl VirtError {
    /// Classify a transport-level failure into the caller-facing
    /// taxonomy. Connection loss is reported as unreachable so callers
    /// can distinguish "not found" from "couldn't check".
    pub(crate) fn classify(host: &HostAddress, op: &'static str, err: TransportError) -> Self {
        match err {
            TransportError::Connect(_) | TransportError::ChannelLost(_) => {
                VirtError::HostUnreachable {
                    host: host.clone(),
                    source: Some(err),
                }
            }
            TransportError::NoSuchDomain(ref uuid) => VirtError::DomainMissing {
                host: host.clone(),
                uuid: uuid.clone(),
            },
            TransportError::DefineRejected(_) => VirtError::DefineRejected {
                host: host.clone(),
                source: err,
            },
            TransportError::Call(_) => VirtError::Hypervisor {
                op,
                host: host.clone(),
                source: err,
            },
        }
    }
}

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, VirtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_preserves_cause() {
        let host = HostAddress::new("10.0.0.9");
        let err = VirtError::classify(
            &host,
            "start domain",
            TransportError::ChannelLost("broken pipe".to_string()),
        );

        assert!(matches!(err, VirtError::HostUnreachable { .. }));
        let source = std::error::Error::source(&err).expect("cause attached");
        assert!(source.to_string().contains("broken pipe"));
    }

    #[test]
    fn classify_maps_missing_domain() {
        let host = HostAddress::new("10.0.0.9");
        let err = VirtError::classify(
            &host,
            "status",
            TransportError::NoSuchDomain("uuid-1".to_string()),
        );

        match err {
            VirtError::DomainMissing { uuid, .. } => assert_eq!(uuid, "uuid-1"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
