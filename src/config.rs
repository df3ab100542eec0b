//! TOML configuration for the iperf benchmark CLI.
//!
//! Describes the two machines under test, how to reach them over SSH, how
//! ports are opened, and which address types are measured.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::benchmark::NUM_MACHINES;
use crate::policy::IpAddressMode;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "IPERF_BENCH_CONFIG";

/// System-wide config file location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/iperf-bench/iperf-bench.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("exactly {expected} machines must be configured, found {actual}")]
    MachineCount { expected: usize, actual: usize },

    #[error("machine name '{0}' is configured more than once")]
    DuplicateMachine(String),

    #[error("machine '{machine}' has an invalid {field} address '{value}'")]
    InvalidAddress {
        machine: String,
        field: &'static str,
        value: String,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub firewall: FirewallConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

impl BenchConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path in the `IPERF_BENCH_CONFIG` environment variable.
    /// 2. `/etc/iperf-bench/iperf-bench.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "IPERF_BENCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Check the machine list: exactly two, distinct names, valid addresses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machines.len() != NUM_MACHINES {
            return Err(ConfigError::MachineCount {
                expected: NUM_MACHINES,
                actual: self.machines.len(),
            });
        }
        let mut seen = HashSet::new();
        for machine in &self.machines {
            if !seen.insert(machine.name.as_str()) {
                return Err(ConfigError::DuplicateMachine(machine.name.clone()));
            }
            machine.internal_addr()?;
            machine.external_addr()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Which address types to send traffic over.
    pub ip_addresses: IpAddressMode,
}

// ---------------------------------------------------------------------------
// Firewall
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallKind {
    /// Ports are managed outside this tool.
    #[serde(rename = "none")]
    Unmanaged,
    /// Open ports with `iptables` on each machine.
    #[default]
    Iptables,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub kind: FirewallKind,
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// ssh client binary; a bare name is looked up on `PATH`.
    pub program: PathBuf,
    pub user: String,
    /// Private key passed with `-i`. The ssh agent is used when unset.
    pub key_path: Option<PathBuf>,
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub strict_host_key_checking: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            user: "perfkit".to_string(),
            key_path: None,
            port: 22,
            connect_timeout_secs: 10,
            strict_host_key_checking: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Machines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManager {
    #[default]
    Apt,
    Yum,
}

impl PackageManager {
    pub fn install_command(&self, package: &str) -> String {
        match self {
            PackageManager::Apt => format!(
                "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                package
            ),
            PackageManager::Yum => format!("sudo yum install -y {}", package),
        }
    }

    pub fn uninstall_command(&self, package: &str) -> String {
        match self {
            PackageManager::Apt => format!(
                "sudo DEBIAN_FRONTEND=noninteractive apt-get purge -y {}",
                package
            ),
            PackageManager::Yum => format!("sudo yum remove -y {}", package),
        }
    }
}

/// One machine under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    /// Hostname or address used for SSH.
    pub host: String,
    pub internal_ip: String,
    #[serde(default)]
    pub external_ip: Option<String>,
    pub machine_type: String,
    pub zone: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub package_manager: PackageManager,
}

impl MachineConfig {
    pub fn internal_addr(&self) -> Result<IpAddr, ConfigError> {
        self.internal_ip
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                machine: self.name.clone(),
                field: "internal",
                value: self.internal_ip.clone(),
            })
    }

    pub fn external_addr(&self) -> Result<Option<IpAddr>, ConfigError> {
        self.external_ip
            .as_deref()
            .map(|ip| {
                ip.parse().map_err(|_| ConfigError::InvalidAddress {
                    machine: self.name.clone(),
                    field: "external",
                    value: ip.to_string(),
                })
            })
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
