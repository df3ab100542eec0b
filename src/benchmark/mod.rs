//! Benchmark plugin surface: static info, the per-run specification, and errors.

pub mod iperf;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::firewall::Firewall;
use crate::vm::VirtualMachine;

/// Number of machines every benchmark run operates on.
pub const NUM_MACHINES: usize = 2;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Could not find iperf result in stdout:\n\n{stdout}")]
    ResultNotFound { stdout: String },

    #[error("iperf reported an unparsable throughput '{value}'")]
    InvalidThroughput { value: String },

    #[error("{vm} has no external IP address")]
    MissingExternalIp { vm: String },

    #[error("benchmark requires exactly {expected} machines, got {actual}")]
    MachineCount { expected: usize, actual: usize },

    #[error("machine '{name}' appears more than once in the benchmark")]
    DuplicateMachine { name: String },

    /// Failure reported by a VM, firewall or package collaborator.
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

/// Static metadata describing a benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BenchmarkInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub scratch_disk: bool,
    pub num_machines: usize,
}

/// The machines and firewall a single benchmark run operates on.
#[derive(Clone)]
pub struct BenchmarkSpec {
    vms: [Arc<dyn VirtualMachine>; NUM_MACHINES],
    firewall: Arc<dyn Firewall>,
}

impl BenchmarkSpec {
    /// Build a spec from exactly two distinct machines.
    pub fn new(
        vms: Vec<Arc<dyn VirtualMachine>>,
        firewall: Arc<dyn Firewall>,
    ) -> Result<Self, BenchmarkError> {
        let actual = vms.len();
        let vms: [Arc<dyn VirtualMachine>; NUM_MACHINES] =
            vms.try_into().map_err(|_| BenchmarkError::MachineCount {
                expected: NUM_MACHINES,
                actual,
            })?;

        let mut names = HashSet::new();
        for vm in &vms {
            if !names.insert(vm.name().to_string()) {
                return Err(BenchmarkError::DuplicateMachine {
                    name: vm.name().to_string(),
                });
            }
        }

        Ok(Self { vms, firewall })
    }

    pub fn vms(&self) -> &[Arc<dyn VirtualMachine>; NUM_MACHINES] {
        &self.vms
    }

    pub fn vm(&self, index: usize) -> &dyn VirtualMachine {
        self.vms[index].as_ref()
    }

    pub fn firewall(&self) -> &dyn Firewall {
        self.firewall.as_ref()
    }
}

impl std::fmt::Debug for BenchmarkSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkSpec")
            .field("vms", &[self.vms[0].name(), self.vms[1].name()])
            .finish_non_exhaustive()
    }
}
