//! Type definitions for host addressing and domain power state.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// HOST ADDRESSING
// =============================================================================

/// Address of a hypervisor node.
///
/// An empty string or a loopback address denotes the local machine,
/// which is controlled over a local channel and is always considered
/// reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostAddress(String);

impl HostAddress {
    /// Create an address from an IPv4 address or resolvable hostname.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// The local host sentinel.
    pub fn local() -> Self {
        Self(String::new())
    }

    /// Whether this address denotes the local machine.
    pub fn is_local(&self) -> bool {
        matches!(self.0.as_str(), "" | "localhost" | "127.0.0.1" | "::1")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_local() {
            write!(f, "localhost")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for HostAddress {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for HostAddress {
    fn from(addr: String) -> Self {
        Self(addr)
    }
}

// =============================================================================
// DOMAIN POWER STATE
// =============================================================================

/// Logical classification of a domain's power state, decoupled from the
/// hypervisor's raw state codes.
///
/// Raw codes 0-7 map one-to-one onto the first eight variants;
/// unrecognized codes degrade to [`LogicalState::Unknown`].
/// [`LogicalState::HostUnreachable`] and [`LogicalState::Missing`] are
/// synthesized by this crate for connection failure and
/// domain-not-found; the hypervisor never reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalState {
    NoState,
    Running,
    Blocked,
    Paused,
    ShuttingDown,
    ShutOff,
    Crashed,
    Suspended,
    Unknown,
    HostUnreachable,
    Missing,
}

impl LogicalState {
    /// Classify a raw hypervisor state code. Total: never fails,
    /// unmapped codes become [`LogicalState::Unknown`].
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => LogicalState::NoState,
            1 => LogicalState::Running,
            2 => LogicalState::Blocked,
            3 => LogicalState::Paused,
            4 => LogicalState::ShuttingDown,
            5 => LogicalState::ShutOff,
            6 => LogicalState::Crashed,
            7 => LogicalState::Suspended,
            _ => LogicalState::Unknown,
        }
    }

    /// Stable state code, including the synthesized variants.
    pub fn code(&self) -> i32 {
        match self {
            LogicalState::NoState => 0,
            LogicalState::Running => 1,
            LogicalState::Blocked => 2,
            LogicalState::Paused => 3,
            LogicalState::ShuttingDown => 4,
            LogicalState::ShutOff => 5,
            LogicalState::Crashed => 6,
            LogicalState::Suspended => 7,
            LogicalState::Unknown => 8,
            LogicalState::HostUnreachable => 9,
            LogicalState::Missing => 10,
        }
    }

    /// Human-readable state label.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalState::NoState => "no state",
            LogicalState::Running => "running",
            LogicalState::Blocked => "blocked",
            LogicalState::Paused => "paused",
            LogicalState::ShuttingDown => "shut down",
            LogicalState::ShutOff => "shut off",
            LogicalState::Crashed => "crashed",
            LogicalState::Suspended => "suspended",
            LogicalState::Unknown => "unknown",
            LogicalState::HostUnreachable => "host connect failed",
            LogicalState::Missing => "missing",
        }
    }

    /// Whether the domain counts as "on" for reboot/shutdown/poweroff
    /// precondition checks. Blocked, paused and suspended domains are
    /// still executing instances.
    pub fn is_running_family(&self) -> bool {
        matches!(
            self,
            LogicalState::Running
                | LogicalState::Blocked
                | LogicalState::Paused
                | LogicalState::Suspended
        )
    }
}

impl Default for LogicalState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for LogicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_mapping_is_total_and_stable() {
        let expected = [
            LogicalState::NoState,
            LogicalState::Running,
            LogicalState::Blocked,
            LogicalState::Paused,
            LogicalState::ShuttingDown,
            LogicalState::ShutOff,
            LogicalState::Crashed,
            LogicalState::Suspended,
        ];

        for (code, state) in expected.iter().enumerate() {
            assert_eq!(LogicalState::from_raw(code as i32), *state);
            assert_eq!(state.code(), code as i32);
        }

        assert_eq!(LogicalState::from_raw(8), LogicalState::Unknown);
        assert_eq!(LogicalState::from_raw(99), LogicalState::Unknown);
        assert_eq!(LogicalState::from_raw(-1), LogicalState::Unknown);
    }

    #[test]
    fn synthesized_states_never_come_from_raw_codes() {
        for code in -1..=64 {
            let state = LogicalState::from_raw(code);
            assert_ne!(state, LogicalState::HostUnreachable);
            assert_ne!(state, LogicalState::Missing);
        }
    }

    #[test]
    fn running_family_membership() {
        assert!(LogicalState::Running.is_running_family());
        assert!(LogicalState::Blocked.is_running_family());
        assert!(LogicalState::Paused.is_running_family());
        assert!(LogicalState::Suspended.is_running_family());

        assert!(!LogicalState::NoState.is_running_family());
        assert!(!LogicalState::ShuttingDown.is_running_family());
        assert!(!LogicalState::ShutOff.is_running_family());
        assert!(!LogicalState::Crashed.is_running_family());
        assert!(!LogicalState::Unknown.is_running_family());
    }

    #[test]
    fn local_host_detection() {
        assert!(HostAddress::local().is_local());
        assert!(HostAddress::new("").is_local());
        assert!(HostAddress::new("127.0.0.1").is_local());
        assert!(HostAddress::new("localhost").is_local());
        assert!(!HostAddress::new("10.0.0.5").is_local());
    }
}
