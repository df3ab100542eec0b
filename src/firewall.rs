//! Firewall handles used to open the iperf port on each machine.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::Result;
use tracing::{debug, info};

use crate::vm::VirtualMachine;

#[async_trait::async_trait]
pub trait Firewall: Send + Sync {
    /// Allow inbound TCP traffic to `port` on `vm`.
    async fn allow_port(&self, vm: &dyn VirtualMachine, port: u16) -> Result<()>;
}

/// For networks whose ports are opened outside this tool.
#[derive(Debug, Default)]
pub struct NoopFirewall;

#[async_trait::async_trait]
impl Firewall for NoopFirewall {
    async fn allow_port(&self, vm: &dyn VirtualMachine, port: u16) -> Result<()> {
        debug!(vm = %vm.name(), %port, "firewall unmanaged, assuming port is open");
        Ok(())
    }
}

/// Opens ports with `iptables` on the machine itself.
#[derive(Debug, Default)]
pub struct IptablesFirewall {
    opened: Mutex<HashSet<(String, u16)>>,
}

impl IptablesFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule_command(port: u16) -> String {
        format!("sudo iptables -A INPUT -p tcp --dport {} -j ACCEPT", port)
    }

    fn is_open(&self, key: &(String, u16)) -> bool {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(key)
    }
}

#[async_trait::async_trait]
impl Firewall for IptablesFirewall {
    async fn allow_port(&self, vm: &dyn VirtualMachine, port: u16) -> Result<()> {
        let key = (vm.name().to_string(), port);
        if self.is_open(&key) {
            debug!(vm = %vm.name(), %port, "port already open");
            return Ok(());
        }

        info!(vm = %vm.name(), %port, "opening firewall port");
        vm.remote_command(&Self::rule_command(port), false).await?;

        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::RemoteOutput;
    use std::net::{IpAddr, Ipv4Addr};

    #[derive(Default)]
    struct RecordingVm {
        name: &'static str,
        commands: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl VirtualMachine for RecordingVm {
        fn name(&self) -> &str {
            self.name
        }
        fn internal_ip(&self) -> IpAddr {
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
        }
        fn ip_address(&self) -> Option<IpAddr> {
            None
        }
        fn machine_type(&self) -> &str {
            "n1-standard-1"
        }
        fn zone(&self) -> &str {
            "us-central1-a"
        }
        async fn remote_command(&self, command: &str, _: bool) -> Result<RemoteOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(RemoteOutput::default())
        }
        async fn remote_command_detached(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn install_package(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn uninstall_package(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_iptables_opens_port_once_per_vm() {
        tokio_test::block_on(async {
            let fw = IptablesFirewall::new();
            let vm0 = RecordingVm {
                name: "vm0",
                ..Default::default()
            };
            let vm1 = RecordingVm {
                name: "vm1",
                ..Default::default()
            };

            fw.allow_port(&vm0, 20000).await.unwrap();
            fw.allow_port(&vm0, 20000).await.unwrap();
            fw.allow_port(&vm1, 20000).await.unwrap();

            assert_eq!(
                *vm0.commands.lock().unwrap(),
                vec!["sudo iptables -A INPUT -p tcp --dport 20000 -j ACCEPT".to_string()]
            );
            assert_eq!(vm1.commands.lock().unwrap().len(), 1);
        });
    }

    #[test]
    fn test_iptables_failure_is_not_remembered() {
        tokio_test::block_on(async {
            let fw = IptablesFirewall::new();
            let vm = RecordingVm {
                name: "vm0",
                fail: true,
                ..Default::default()
            };

            assert!(fw.allow_port(&vm, 20000).await.is_err());
            assert!(fw.allow_port(&vm, 20000).await.is_err());
            assert_eq!(vm.commands.lock().unwrap().len(), 2);
        });
    }

    #[test]
    fn test_noop_never_touches_vm() {
        tokio_test::block_on(async {
            let vm = RecordingVm {
                name: "vm0",
                ..Default::default()
            };
            NoopFirewall.allow_port(&vm, 20000).await.unwrap();
            assert!(vm.commands.lock().unwrap().is_empty());
        });
    }
}
