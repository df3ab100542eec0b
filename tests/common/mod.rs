//! Recording fakes for the machine, firewall and policy collaborators.

#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use iperf_bench::benchmark::BenchmarkSpec;
use iperf_bench::firewall::Firewall;
use iperf_bench::policy::IpAddressPolicy;
use iperf_bench::vm::{RemoteOutput, VirtualMachine};

/// Every collaborator call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Command { vm: String, command: String, should_log: bool },
    Detached { vm: String, command: String },
    Install { vm: String, package: String },
    Uninstall { vm: String, package: String },
    AllowPort { vm: String, port: u16 },
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(journal: &Journal) -> Vec<Event> {
    journal.lock().unwrap().clone()
}

pub struct FakeVm {
    pub name: String,
    pub internal_ip: IpAddr,
    pub external_ip: Option<IpAddr>,
    pub machine_type: String,
    pub zone: String,
    pub network: Option<String>,
    /// Returned as stdout for every blocking command.
    pub stdout: String,
    /// Commands containing this text fail with a transport error.
    pub fail_on: Option<String>,
    pub fail_install: bool,
    pub journal: Journal,
}

impl FakeVm {
    pub fn new(name: &str, internal: &str, external: &str, zone: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            internal_ip: internal.parse().unwrap(),
            external_ip: Some(external.parse().unwrap()),
            machine_type: "n1-standard-1".to_string(),
            zone: zone.to_string(),
            network: Some("default".to_string()),
            stdout: "[  3]  0.0-60.0 sec  3576 MBytes  500 Mbits/sec\n".to_string(),
            fail_on: None,
            fail_install: false,
            journal: journal.clone(),
        }
    }

    fn record(&self, event: Event) {
        self.journal.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl VirtualMachine for FakeVm {
    fn name(&self) -> &str {
        &self.name
    }

    fn internal_ip(&self) -> IpAddr {
        self.internal_ip
    }

    fn ip_address(&self) -> Option<IpAddr> {
        self.external_ip
    }

    fn machine_type(&self) -> &str {
        &self.machine_type
    }

    fn zone(&self) -> &str {
        &self.zone
    }

    fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    async fn remote_command(&self, command: &str, should_log: bool) -> Result<RemoteOutput> {
        self.record(Event::Command {
            vm: self.name.clone(),
            command: command.to_string(),
            should_log,
        });
        if let Some(needle) = &self.fail_on {
            if command.contains(needle.as_str()) {
                anyhow::bail!("ssh: connect to host {}: Connection timed out", self.name);
            }
        }
        Ok(RemoteOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }

    async fn remote_command_detached(&self, command: &str) -> Result<()> {
        self.record(Event::Detached {
            vm: self.name.clone(),
            command: command.to_string(),
        });
        Ok(())
    }

    async fn install_package(&self, package: &str) -> Result<()> {
        self.record(Event::Install {
            vm: self.name.clone(),
            package: package.to_string(),
        });
        if self.fail_install {
            anyhow::bail!("E: Unable to locate package {}", package);
        }
        Ok(())
    }

    async fn uninstall_package(&self, package: &str) -> Result<()> {
        self.record(Event::Uninstall {
            vm: self.name.clone(),
            package: package.to_string(),
        });
        Ok(())
    }
}

pub struct RecordingFirewall {
    pub journal: Journal,
}

#[async_trait::async_trait]
impl Firewall for RecordingFirewall {
    async fn allow_port(&self, vm: &dyn VirtualMachine, port: u16) -> Result<()> {
        self.journal.lock().unwrap().push(Event::AllowPort {
            vm: vm.name().to_string(),
            port,
        });
        Ok(())
    }
}

pub struct FixedPolicy {
    pub external: bool,
    pub internal: bool,
}

impl IpAddressPolicy for FixedPolicy {
    fn should_run_on_external_ip(&self) -> bool {
        self.external
    }

    fn should_run_on_internal_ip(&self, _: &dyn VirtualMachine, _: &dyn VirtualMachine) -> bool {
        self.internal
    }
}

/// vm0 (10.0.0.1 / 1.2.3.4, us-central1-a) and vm1 (10.0.0.2 / 5.6.7.8, us-central1-b).
pub fn fake_pair(journal: &Journal) -> (FakeVm, FakeVm) {
    (
        FakeVm::new("vm0", "10.0.0.1", "1.2.3.4", "us-central1-a", journal),
        FakeVm::new("vm1", "10.0.0.2", "5.6.7.8", "us-central1-b", journal),
    )
}

pub fn spec_from(vm0: FakeVm, vm1: FakeVm, journal: &Journal) -> BenchmarkSpec {
    let vms: Vec<Arc<dyn VirtualMachine>> = vec![Arc::new(vm0), Arc::new(vm1)];
    BenchmarkSpec::new(
        vms,
        Arc::new(RecordingFirewall {
            journal: journal.clone(),
        }),
    )
    .unwrap()
}

pub fn spec(journal: &Journal) -> BenchmarkSpec {
    let (vm0, vm1) = fake_pair(journal);
    spec_from(vm0, vm1, journal)
}
