//! Migration outcome records.
//!
//! Migration itself is an orchestration concern: the orchestrator
//! resolves the domain on the source, defines it on the destination,
//! verifies it runs there, then undefines the source, all with the
//! lifecycle operations of this crate. What belongs here is the record
//! of how that attempt went; persisting it is the collaborator's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::HostAddress;

/// A host as the orchestration layer identifies it: its metadata-store
/// id plus the address this crate connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostIdentity {
    pub id: i64,
    pub address: HostAddress,
}

impl HostIdentity {
    pub fn new(id: i64, address: impl Into<HostAddress>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

/// Outcome of one cross-host migration attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// UUID of the migrated domain
    pub vm_uuid: String,
    /// Source host id
    pub src_host_id: i64,
    /// Source host address
    pub src_host_ipv4: HostAddress,
    /// Destination host id
    pub dst_host_id: i64,
    /// Destination host address
    pub dst_host_ipv4: HostAddress,
    /// When the attempt finished
    pub migrated_at: DateTime<Utc>,
    /// Whether the attempt completed without error
    pub result: bool,
    /// Free-text diagnostic record of the attempt
    pub content: String,
    /// Whether the source-side definition was removed after success
    pub src_undefined: bool,
}

impl MigrationRecord {
    pub fn builder(
        vm_uuid: impl Into<String>,
        source: HostIdentity,
        destination: HostIdentity,
    ) -> MigrationRecordBuilder {
        MigrationRecordBuilder {
            vm_uuid: vm_uuid.into(),
            source,
            destination,
            content: Vec::new(),
            src_undefined: false,
        }
    }
}

/// Accumulates the facts of a migration attempt as the orchestrator
/// works through its steps.
#[derive(Debug)]
pub struct MigrationRecordBuilder {
    vm_uuid: String,
    source: HostIdentity,
    destination: HostIdentity,
    content: Vec<String>,
    src_undefined: bool,
}

impl MigrationRecordBuilder {
    /// Append a diagnostic line.
    pub fn note(mut self, line: impl Into<String>) -> Self {
        self.content.push(line.into());
        self
    }

    /// Record whether the source-side definition was removed.
    pub fn source_cleaned(mut self, done: bool) -> Self {
        self.src_undefined = done;
        self
    }

    /// Finish as a successful attempt.
    pub fn succeeded(self) -> MigrationRecord {
        self.finish(true)
    }

    /// Finish as a failed attempt, appending the failure diagnostic.
    pub fn failed(mut self, diagnostic: impl Into<String>) -> MigrationRecord {
        self.content.push(diagnostic.into());
        self.finish(false)
    }

    fn finish(self, result: bool) -> MigrationRecord {
        MigrationRecord {
            vm_uuid: self.vm_uuid,
            src_host_id: self.source.id,
            src_host_ipv4: self.source.address,
            dst_host_id: self.destination.id,
            dst_host_ipv4: self.destination.address,
            migrated_at: Utc::now(),
            result,
            content: self.content.join("\n"),
            src_undefined: self.src_undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_attempt_with_source_cleanup() {
        let record = MigrationRecord::builder(
            "uuid-1",
            HostIdentity::new(3, "10.0.0.5"),
            HostIdentity::new(7, "10.0.0.6"),
        )
        .note("defined on destination")
        .note("running on destination")
        .source_cleaned(true)
        .succeeded();

        assert!(record.result);
        assert!(record.src_undefined);
        assert_eq!(record.src_host_id, 3);
        assert_eq!(record.dst_host_ipv4, HostAddress::new("10.0.0.6"));
        assert_eq!(record.content, "defined on destination\nrunning on destination");
    }

    #[test]
    fn failed_attempt_keeps_diagnostics_and_cleanup_flag() {
        let record = MigrationRecord::builder(
            "uuid-1",
            HostIdentity::new(3, "10.0.0.5"),
            HostIdentity::new(7, "10.0.0.6"),
        )
        .failed("destination rejected definition");

        assert!(!record.result);
        assert!(!record.src_undefined);
        assert!(record.content.contains("destination rejected definition"));
    }

    #[test]
    fn record_serializes_with_collaborator_field_names() {
        let record = MigrationRecord::builder(
            "uuid-1",
            HostIdentity::new(1, "10.0.0.5"),
            HostIdentity::new(2, "10.0.0.6"),
        )
        .succeeded();

        let json = serde_json::to_value(&record).expect("serializable");
        assert_eq!(json["vm_uuid"], "uuid-1");
        assert_eq!(json["src_host_ipv4"], "10.0.0.5");
        assert_eq!(json["dst_host_id"], 2);
        assert_eq!(json["result"], true);
        assert_eq!(json["src_undefined"], false);
    }
}
