//! Address policy: which network paths a throughput test is sent over.

use serde::{Deserialize, Serialize};

use crate::vm::VirtualMachine;

/// Decides whether traffic is sent to external and/or internal addresses.
pub trait IpAddressPolicy: Send + Sync {
    fn should_run_on_external_ip(&self) -> bool;

    /// May depend on both machines, e.g. whether they share a network.
    fn should_run_on_internal_ip(
        &self,
        sending_vm: &dyn VirtualMachine,
        receiving_vm: &dyn VirtualMachine,
    ) -> bool;
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum IpAddressMode {
    External,
    Internal,
    #[default]
    Both,
    /// External always; internal only between machines on the same network.
    Reachable,
}

impl std::fmt::Display for IpAddressMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpAddressMode::External => write!(f, "external"),
            IpAddressMode::Internal => write!(f, "internal"),
            IpAddressMode::Both => write!(f, "both"),
            IpAddressMode::Reachable => write!(f, "reachable"),
        }
    }
}

/// Policy driven by a single configured [`IpAddressMode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagPolicy {
    pub mode: IpAddressMode,
}

impl FlagPolicy {
    pub fn new(mode: IpAddressMode) -> Self {
        Self { mode }
    }
}

impl IpAddressPolicy for FlagPolicy {
    fn should_run_on_external_ip(&self) -> bool {
        matches!(
            self.mode,
            IpAddressMode::External | IpAddressMode::Both | IpAddressMode::Reachable
        )
    }

    fn should_run_on_internal_ip(
        &self,
        sending_vm: &dyn VirtualMachine,
        receiving_vm: &dyn VirtualMachine,
    ) -> bool {
        match self.mode {
            IpAddressMode::Internal | IpAddressMode::Both => true,
            IpAddressMode::External => false,
            IpAddressMode::Reachable => match (sending_vm.network(), receiving_vm.network()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}
