//! Typed argument contracts for every external tool the provisioner runs.

pub mod binfmt;
pub mod chroot;
pub mod firewall;
pub mod generator;
pub mod mapping;
pub mod mount;
