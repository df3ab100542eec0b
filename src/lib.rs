//! iperf-bench -- network throughput benchmark across a pair of machines.
//!
//! This crate provides the iperf benchmark lifecycle (prepare, run,
//! cleanup), the machine/firewall/policy collaborators it drives, and an
//! SSH-backed implementation used by the command-line tool.

pub mod benchmark;
pub mod config;
pub mod firewall;
pub mod policy;
pub mod report;
pub mod runner;
pub mod sample;
pub mod vm;

use std::sync::Arc;

use anyhow::Result;

use benchmark::BenchmarkSpec;
use config::{BenchConfig, FirewallKind};
use firewall::{Firewall, IptablesFirewall, NoopFirewall};
use vm::{ssh::SshVm, VirtualMachine};

/// Build SSH machine handles and the firewall described by `config`.
pub fn build_spec(config: &BenchConfig) -> Result<BenchmarkSpec> {
    config.validate()?;

    let vms = config
        .machines
        .iter()
        .map(|m| {
            SshVm::from_config(m, &config.ssh).map(|vm| Arc::new(vm) as Arc<dyn VirtualMachine>)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let firewall: Arc<dyn Firewall> = match config.firewall.kind {
        FirewallKind::Unmanaged => Arc::new(NoopFirewall),
        FirewallKind::Iptables => Arc::new(IptablesFirewall::new()),
    };

    tracing::debug!(machines = vms.len(), firewall = ?config.firewall.kind, "built benchmark spec");
    Ok(BenchmarkSpec::new(vms, firewall)?)
}
