//! Virtual machine handles: remote command execution and package management.
//!
//! The benchmark never creates or destroys machines. It only talks to them
//! through [`VirtualMachine`], which a harness implements for whatever
//! transport it uses. [`ssh::SshVm`] is the implementation used by the CLI.

pub mod ssh;

use std::net::IpAddr;

use anyhow::Result;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("failed to launch ssh for {vm}: {source}")]
    Spawn {
        vm: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote command `{command}` on {vm} exited with {}: {stderr}", exit_label(.code))]
    CommandFailed {
        vm: String,
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command for {vm} cannot be quoted for the remote shell: {command:?}")]
    Unquotable { vm: String, command: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Captured output of a blocking remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A provisioned machine the benchmark can run commands on.
#[async_trait::async_trait]
pub trait VirtualMachine: Send + Sync {
    /// Human readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Address on the private network shared with the other machine.
    fn internal_ip(&self) -> IpAddr;

    /// Public address, if the machine has one.
    fn ip_address(&self) -> Option<IpAddr>;

    fn machine_type(&self) -> &str;

    fn zone(&self) -> &str;

    /// Network segment label. Machines on the same network can reach each
    /// other over their internal addresses.
    fn network(&self) -> Option<&str> {
        None
    }

    /// Run `command` in the machine's shell and wait for it to exit.
    async fn remote_command(&self, command: &str, should_log: bool) -> Result<RemoteOutput>;

    /// Launch a long-lived `command` and return without waiting for it.
    async fn remote_command_detached(&self, command: &str) -> Result<()>;

    async fn install_package(&self, package: &str) -> Result<()>;

    async fn uninstall_package(&self, package: &str) -> Result<()>;
}
