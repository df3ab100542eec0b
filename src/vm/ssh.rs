//! SSH-backed virtual machine handle.
//!
//! Commands are executed by spawning the system `ssh` client. Blocking
//! commands are interpreted by the remote login shell. Detached commands are
//! wrapped in `bash -c` so bash-only redirections such as `&>` behave the
//! same on hosts whose login shell is dash; the machines therefore need bash
//! installed.

use std::net::IpAddr;
use std::process::Stdio;

use anyhow::Result;
use tokio::process::Command;
use tracing::{debug, info};

use super::{RemoteOutput, VirtualMachine, VmError};
use crate::config::{MachineConfig, PackageManager, SshConfig};

pub struct SshVm {
    name: String,
    host: String,
    internal_ip: IpAddr,
    external_ip: Option<IpAddr>,
    machine_type: String,
    zone: String,
    network: Option<String>,
    package_manager: PackageManager,
    ssh: SshConfig,
}

impl SshVm {
    /// Build a handle from a validated machine entry.
    pub fn from_config(
        machine: &MachineConfig,
        ssh: &SshConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        Ok(Self {
            name: machine.name.clone(),
            host: machine.host.clone(),
            internal_ip: machine.internal_addr()?,
            external_ip: machine.external_addr()?,
            machine_type: machine.machine_type.clone(),
            zone: machine.zone.clone(),
            network: machine.network.clone(),
            package_manager: machine.package_manager,
            ssh: ssh.clone(),
        })
    }

    /// Arguments passed to the `ssh` client, ending with the remote command.
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        let strict = if self.ssh.strict_host_key_checking {
            "yes"
        } else {
            "no"
        };
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", strict),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.ssh.connect_timeout_secs),
            "-p".to_string(),
            self.ssh.port.to_string(),
        ];
        if let Some(key) = &self.ssh.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.push(format!("{}@{}", self.ssh.user, self.host));
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }

    /// Wrap `command` so it runs under bash regardless of the login shell.
    pub fn detached_command(&self, command: &str) -> Result<String, VmError> {
        let quoted = shlex::try_quote(command).map_err(|_| VmError::Unquotable {
            vm: self.name.clone(),
            command: command.to_string(),
        })?;
        Ok(format!("bash -c {}", quoted))
    }

    fn spawn_error(&self, source: std::io::Error) -> VmError {
        VmError::Spawn {
            vm: self.name.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl VirtualMachine for SshVm {
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
        if should_log {
            info!(vm = %self.name, %command, "running remote command");
        } else {
            debug!(vm = %self.name, %command, "running remote command");
        }

        let output = Command::new(&self.ssh.program)
            .args(self.ssh_args(command))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(VmError::CommandFailed {
                vm: self.name.clone(),
                command: command.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        if should_log {
            info!(vm = %self.name, %stdout, "remote command finished");
        } else {
            debug!(vm = %self.name, %stdout, "remote command finished");
        }

        Ok(RemoteOutput { stdout, stderr })
    }

    async fn remote_command_detached(&self, command: &str) -> Result<()> {
        let wrapped = self.detached_command(command)?;
        debug!(vm = %self.name, command = %wrapped, "launching detached remote command");

        // -n keeps ssh off our stdin; with output discarded it returns as
        // soon as the remote shell has backgrounded the process.
        let status = Command::new(&self.ssh.program)
            .arg("-n")
            .args(self.ssh_args(&wrapped))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !status.success() {
            return Err(VmError::CommandFailed {
                vm: self.name.clone(),
                command: command.to_string(),
                code: status.code(),
                stderr: String::new(),
            }
            .into());
        }
        Ok(())
    }

    async fn install_package(&self, package: &str) -> Result<()> {
        info!(vm = %self.name, %package, "installing package");
        self.remote_command(&self.package_manager.install_command(package), false)
            .await?;
        Ok(())
    }

    async fn uninstall_package(&self, package: &str) -> Result<()> {
        info!(vm = %self.name, %package, "uninstalling package");
        self.remote_command(&self.package_manager.uninstall_command(package), false)
            .await?;
        Ok(())
    }
}
