//! Host liveness probing.
//!
//! A remote host is probed before any channel establishment is
//! attempted, so an unreachable host fails in probe time rather than in
//! transport-level timeout time.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::ProbeConfig;
use crate::types::HostAddress;

/// One liveness probe attempt against a host.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Send a single probe. `true` means the host answered within the
    /// prober's timeout. Never an error: an unanswered probe is a
    /// normal `false`.
    async fn probe(&self, host: &HostAddress) -> bool;
}

/// ICMP liveness probing via the `fping` binary.
pub struct FpingProbe {
    binary: String,
    timeout: Duration,
}

impl FpingProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: config.timeout(),
        }
    }
}

impl Default for FpingProbe {
    fn default() -> Self {
        Self::new(&ProbeConfig::default())
    }
}

#[async_trait]
impl LivenessProbe for FpingProbe {
    async fn probe(&self, host: &HostAddress) -> bool {
        let timeout_ms = self.timeout.as_millis().to_string();

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-r")
            .arg("0")
            .arg("-t")
            .arg(&timeout_ms)
            .arg(host.as_str())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // The prober enforces its own timeout; the outer one is a
        // backstop against a wedged subprocess.
        match tokio::time::timeout(self.timeout + Duration::from_secs(2), cmd.output()).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                warn!(host = %host, error = %e, "Failed to spawn liveness prober");
                false
            }
            Err(_) => {
                warn!(host = %host, "Liveness prober timed out");
                false
            }
        }
    }
}

/// Bounded-retry reachability check over a [`LivenessProbe`].
pub struct Reachability {
    probe: Arc<dyn LivenessProbe>,
    attempts: u32,
}

impl Reachability {
    pub fn new(probe: Arc<dyn LivenessProbe>, attempts: u32) -> Self {
        Self {
            probe,
            attempts: attempts.max(1),
        }
    }

    /// Whether the host currently answers liveness probes.
    ///
    /// Returns on the first successful probe, after at most the
    /// configured number of attempts. The local host is always
    /// reachable and is never probed.
    #[instrument(skip(self), fields(host = %host))]
    pub async fn is_reachable(&self, host: &HostAddress) -> bool {
        if host.is_local() {
            return true;
        }

        for attempt in 1..=self.attempts {
            if self.probe.probe(host).await {
                debug!(attempt, "Host answered liveness probe");
                return true;
            }
        }

        debug!(attempts = self.attempts, "Host failed all liveness probes");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProbe {
        /// Probe outcomes, consumed in order; exhausted means false.
        outcomes: std::sync::Mutex<Vec<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(outcomes: Vec<bool>) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LivenessProbe for ScriptedProbe {
        async fn probe(&self, _host: &HostAddress) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.is_empty() {
                false
            } else {
                outcomes.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn local_host_is_never_probed() {
        let probe = Arc::new(ScriptedProbe::new(vec![]));
        let reachability = Reachability::new(probe.clone(), 3);

        assert!(reachability.is_reachable(&HostAddress::local()).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stops_at_first_successful_probe() {
        let probe = Arc::new(ScriptedProbe::new(vec![false, true, true]));
        let reachability = Reachability::new(probe.clone(), 3);

        assert!(reachability.is_reachable(&HostAddress::new("10.0.0.5")).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_reports_unreachable() {
        let probe = Arc::new(ScriptedProbe::new(vec![false, false, false, false]));
        let reachability = Reachability::new(probe.clone(), 3);

        assert!(!reachability.is_reachable(&HostAddress::new("10.0.0.5")).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }
}
