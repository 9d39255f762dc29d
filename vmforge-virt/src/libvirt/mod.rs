//! Libvirt transport backend.
//!
//! The primary backend for driving domains through libvirt/QEMU. It
//! requires the `libvirt` feature to be enabled and the system to have
//! libvirt installed.

#[cfg(feature = "libvirt")]
mod backend;

#[cfg(feature = "libvirt")]
pub use backend::LibvirtTransport;

/// Check if the libvirt backend is compiled in.
pub fn is_available() -> bool {
    cfg!(feature = "libvirt")
}
