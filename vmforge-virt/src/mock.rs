//! In-memory mock transport for testing and development.
//!
//! Simulates hosts and domains without a hypervisor. Every transport
//! call is counted, so tests can assert not only outcomes but also
//! which hypervisor entry points were (or were not) touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::reachability::LivenessProbe;
use crate::transport::{
    DomainChannel, DomainRef, Transport, TransportError, TransportResult,
};
use crate::types::HostAddress;

/// Per-entry-point call counters.
#[derive(Debug, Default)]
pub struct MockCounters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub defines: AtomicUsize,
    pub lookups: AtomicUsize,
    pub creates: AtomicUsize,
    pub reboots: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub destroys: AtomicUsize,
    pub undefines: AtomicUsize,
}

impl MockCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
struct MockDomainState {
    raw_state: i32,
    refuse_undefine: bool,
}

type HostTable = HashMap<String, HashMap<String, MockDomainState>>;

/// Mock transport backend.
///
/// Domains are seeded per host; channels hand out domain references
/// backed by the same shared table, so state transitions made through
/// one operation are visible to the next.
pub struct MockTransport {
    hosts: Arc<RwLock<HostTable>>,
    counters: Arc<MockCounters>,
    fail_connect: RwLock<Option<String>>,
    channel_lost: RwLock<Option<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        info!("Creating mock transport");
        Self {
            hosts: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(MockCounters::default()),
            fail_connect: RwLock::new(None),
            channel_lost: RwLock::new(None),
        }
    }

    /// Seed a domain on a host with a raw state code.
    pub fn add_domain(&self, host: &HostAddress, uuid: &str, raw_state: i32) {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        hosts
            .entry(host_key(host))
            .or_default()
            .insert(uuid.to_string(), MockDomainState {
                raw_state,
                refuse_undefine: false,
            });
    }

    /// Make the hypervisor refuse to undefine a seeded domain.
    pub fn refuse_undefine(&self, host: &HostAddress, uuid: &str) {
        let mut hosts = self.hosts.write().unwrap_or_else(|e| e.into_inner());
        if let Some(domain) = hosts
            .entry(host_key(host))
            .or_default()
            .get_mut(uuid)
        {
            domain.refuse_undefine = true;
        }
    }

    /// Current raw state of a seeded domain, if it still exists.
    pub fn raw_state(&self, host: &HostAddress, uuid: &str) -> Option<i32> {
        let hosts = self.hosts.read().unwrap_or_else(|e| e.into_inner());
        hosts
            .get(&host_key(host))
            .and_then(|domains| domains.get(uuid))
            .map(|d| d.raw_state)
    }

    /// Make every channel establishment fail.
    pub fn fail_connect(&self, message: &str) {
        *self.fail_connect.write().unwrap_or_else(|e| e.into_inner()) =
            Some(message.to_string());
    }

    /// Make every channel operation fail as a lost channel.
    pub fn lose_channel(&self, message: &str) {
        *self.channel_lost.write().unwrap_or_else(|e| e.into_inner()) =
            Some(message.to_string());
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, uri: &str) -> TransportResult<Box<dyn DomainChannel>> {
        MockCounters::bump(&self.counters.connects);

        if let Some(msg) = self
            .fail_connect
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(TransportError::Connect(msg));
        }

        let host = uri_host(uri);
        debug!(uri = %uri, host = %host, "Mock channel opened");

        Ok(Box::new(MockChannel {
            host,
            hosts: Arc::clone(&self.hosts),
            counters: Arc::clone(&self.counters),
            channel_lost: self
                .channel_lost
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }))
    }
}

struct MockChannel {
    host: String,
    hosts: Arc<RwLock<HostTable>>,
    counters: Arc<MockCounters>,
    channel_lost: Option<String>,
}

impl MockChannel {
    fn check_alive(&self) -> TransportResult<()> {
        match &self.channel_lost {
            Some(msg) => Err(TransportError::ChannelLost(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DomainChannel for MockChannel {
    async fn define_xml(&self, xml: &str) -> TransportResult<String> {
        MockCounters::bump(&self.counters.defines);
        self.check_alive()?;

        if !xml.trim_start().starts_with("<domain") {
            return Err(TransportError::DefineRejected(
                "document is not a domain element".to_string(),
            ));
        }

        let uuid = extract_uuid(xml).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?;
        hosts
            .entry(self.host.clone())
            .or_default()
            .insert(uuid.clone(), MockDomainState {
                // A defined-but-never-started domain is shut off.
                raw_state: 5,
                refuse_undefine: false,
            });

        Ok(uuid)
    }

    async fn lookup(&self, uuid: &str) -> TransportResult<Box<dyn DomainRef>> {
        MockCounters::bump(&self.counters.lookups);
        self.check_alive()?;

        let hosts = self
            .hosts
            .read()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?;
        let found = hosts
            .get(&self.host)
            .map(|domains| domains.contains_key(uuid))
            .unwrap_or(false);

        if !found {
            return Err(TransportError::NoSuchDomain(uuid.to_string()));
        }

        Ok(Box::new(MockDomain {
            host: self.host.clone(),
            uuid: uuid.to_string(),
            hosts: Arc::clone(&self.hosts),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn list_uuids(&self) -> TransportResult<Vec<String>> {
        self.check_alive()?;

        let hosts = self
            .hosts
            .read()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?;
        Ok(hosts
            .get(&self.host)
            .map(|domains| domains.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn close(&self) {
        MockCounters::bump(&self.counters.closes);
    }
}

struct MockDomain {
    host: String,
    uuid: String,
    hosts: Arc<RwLock<HostTable>>,
    counters: Arc<MockCounters>,
}

impl MockDomain {
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MockDomainState) -> TransportResult<T>,
    ) -> TransportResult<T> {
        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?;
        let domain = hosts
            .get_mut(&self.host)
            .and_then(|domains| domains.get_mut(&self.uuid))
            .ok_or_else(|| TransportError::NoSuchDomain(self.uuid.clone()))?;
        f(domain)
    }
}

#[async_trait]
impl DomainRef for MockDomain {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    async fn state_code(&self) -> TransportResult<i32> {
        self.with_state(|d| Ok(d.raw_state))
    }

    async fn create(&self) -> TransportResult<()> {
        MockCounters::bump(&self.counters.creates);
        self.with_state(|d| {
            d.raw_state = 1;
            Ok(())
        })
    }

    async fn reboot(&self) -> TransportResult<()> {
        MockCounters::bump(&self.counters.reboots);
        self.with_state(|_| Ok(()))
    }

    async fn shutdown(&self) -> TransportResult<()> {
        MockCounters::bump(&self.counters.shutdowns);
        self.with_state(|d| {
            d.raw_state = 5;
            Ok(())
        })
    }

    async fn destroy(&self) -> TransportResult<()> {
        MockCounters::bump(&self.counters.destroys);
        self.with_state(|d| {
            d.raw_state = 5;
            Ok(())
        })
    }

    async fn undefine(&self) -> TransportResult<()> {
        MockCounters::bump(&self.counters.undefines);

        let refused = self.with_state(|d| Ok(d.refuse_undefine))?;
        if refused {
            return Err(TransportError::Call(
                "undefine refused by hypervisor".to_string(),
            ));
        }

        let mut hosts = self
            .hosts
            .write()
            .map_err(|_| TransportError::Call("lock poisoned".to_string()))?;
        hosts
            .get_mut(&self.host)
            .and_then(|domains| domains.remove(&self.uuid))
            .ok_or_else(|| TransportError::NoSuchDomain(self.uuid.clone()))?;
        Ok(())
    }
}

/// Liveness probe with a scripted reachable set and a probe counter.
#[derive(Default)]
pub struct MockProbe {
    reachable: RwLock<Vec<String>>,
    probes: AtomicUsize,
}

impl MockProbe {
    /// A probe that considers every host unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_reachable(&self, host: &HostAddress) {
        self.reachable
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(host.as_str().to_string());
    }

    /// Number of probe attempts sent so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for MockProbe {
    async fn probe(&self, host: &HostAddress) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|h| h == host.as_str())
    }
}

/// Host part of an endpoint URI; empty for a local endpoint.
fn uri_host(uri: &str) -> String {
    let rest = uri.split("://").nth(1).unwrap_or(uri);
    let authority = rest.split('/').next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or("");
    host.to_string()
}

fn host_key(host: &HostAddress) -> String {
    if host.is_local() {
        String::new()
    } else {
        host.as_str().to_string()
    }
}

fn extract_uuid(xml: &str) -> Option<String> {
    let start = xml.find("<uuid>")? + "<uuid>".len();
    let end = xml[start..].find("</uuid>")? + start;
    let uuid = xml[start..end].trim();
    if uuid.is_empty() {
        None
    } else {
        Some(uuid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_host_extraction() {
        assert_eq!(uri_host("qemu:///system"), "");
        assert_eq!(uri_host("qemu+ssh://10.0.0.5/system"), "10.0.0.5");
        assert_eq!(uri_host("qemu+ssh://virtops@10.0.0.5/system"), "10.0.0.5");
    }

    #[test]
    fn uuid_extraction() {
        let xml = "<domain type='kvm'><uuid>uuid-7</uuid><name>web-1</name></domain>";
        assert_eq!(extract_uuid(xml).as_deref(), Some("uuid-7"));
        assert_eq!(extract_uuid("<domain/>"), None);
    }

    #[tokio::test]
    async fn seeded_domain_is_visible_through_a_channel() {
        let transport = MockTransport::new();
        let host = HostAddress::new("10.0.0.5");
        transport.add_domain(&host, "uuid-1", 1);

        let channel = transport.connect("qemu+ssh://10.0.0.5/system").await.unwrap();
        let uuids = channel.list_uuids().await.unwrap();
        assert_eq!(uuids, vec!["uuid-1".to_string()]);

        let domain = channel.lookup("uuid-1").await.unwrap();
        assert_eq!(domain.state_code().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transitions_persist_across_channels() {
        let transport = MockTransport::new();
        let host = HostAddress::local();
        transport.add_domain(&host, "uuid-1", 5);

        {
            let channel = transport.connect("qemu:///system").await.unwrap();
            let domain = channel.lookup("uuid-1").await.unwrap();
            domain.create().await.unwrap();
        }

        let channel = transport.connect("qemu:///system").await.unwrap();
        let domain = channel.lookup("uuid-1").await.unwrap();
        assert_eq!(domain.state_code().await.unwrap(), 1);
    }
}
