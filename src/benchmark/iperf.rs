//! iperf throughput benchmark between two machines.
//!
//! Prepare installs iperf and starts a server on both machines. Run measures
//! TCP throughput in both directions, over external and/or internal
//! addresses as the [`IpAddressPolicy`] allows. Cleanup stops the server and
//! uninstalls iperf.

use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::{BenchmarkError, BenchmarkInfo, BenchmarkSpec, NUM_MACHINES};
use crate::policy::IpAddressPolicy;
use crate::sample::{Metadata, Sample};
use crate::vm::VirtualMachine;

pub const IPERF_PORT: u16 = 20000;
pub const IPERF_PACKAGE: &str = "iperf";
pub const TEST_DURATION_SECS: u32 = 60;

pub const METRIC: &str = "Throughput";
pub const UNIT: &str = "Mbits/sec";

const BENCHMARK_INFO: BenchmarkInfo = BenchmarkInfo {
    name: "iperf",
    description: "Run iperf",
    scratch_disk: false,
    num_machines: NUM_MACHINES,
};

static THROUGHPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+\.[0-9]+|[0-9]+) Mbits/sec").expect("static regex"));

/// Address family label attached to every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpType {
    External,
    Internal,
}

impl std::fmt::Display for IpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpType::External => write!(f, "external"),
            IpType::Internal => write!(f, "internal"),
        }
    }
}

pub fn get_info() -> BenchmarkInfo {
    BENCHMARK_INFO
}

pub fn server_command() -> String {
    format!("nohup iperf --server --port {} &> /dev/null &", IPERF_PORT)
}

pub fn client_command(target: IpAddr) -> String {
    format!(
        "iperf --client {} --port {} --format m --time {}",
        target, IPERF_PORT, TEST_DURATION_SECS
    )
}

pub fn kill_command() -> &'static str {
    "pkill -9 iperf"
}

/// Extract the first `<number> Mbits/sec` value from iperf client output.
pub fn parse_throughput(stdout: &str) -> Result<f64, BenchmarkError> {
    let caps = THROUGHPUT_RE
        .captures(stdout)
        .ok_or_else(|| BenchmarkError::ResultNotFound {
            stdout: stdout.to_string(),
        })?;
    let value = &caps[1];
    value
        .parse::<f64>()
        .map_err(|_| BenchmarkError::InvalidThroughput {
            value: value.to_string(),
        })
}

/// Install iperf, open the port, and start a background server on every machine.
pub async fn prepare(spec: &BenchmarkSpec) -> Result<(), BenchmarkError> {
    let firewall = spec.firewall();
    for vm in spec.vms() {
        info!(vm = %vm.name(), "preparing iperf server");
        vm.install_package(IPERF_PACKAGE).await?;
        firewall.allow_port(&**vm, IPERF_PORT).await?;
        vm.remote_command_detached(&server_command()).await?;
    }
    Ok(())
}

/// Measure throughput in both directions.
///
/// Samples are ordered by sender (machine 0 first), external before
/// internal. Any failed measurement aborts the whole run.
pub async fn run(
    spec: &BenchmarkSpec,
    policy: &dyn IpAddressPolicy,
) -> Result<Vec<Sample>, BenchmarkError> {
    let mut results = Vec::new();

    info!("Iperf Results:");

    for originator in 0..NUM_MACHINES {
        let sending_vm = spec.vm(originator);
        let receiving_vm = spec.vm(originator ^ 1);

        if policy.should_run_on_external_ip() {
            let target =
                receiving_vm
                    .ip_address()
                    .ok_or_else(|| BenchmarkError::MissingExternalIp {
                        vm: receiving_vm.name().to_string(),
                    })?;
            results.push(run_iperf(sending_vm, receiving_vm, target, IpType::External).await?);
        }

        if policy.should_run_on_internal_ip(sending_vm, receiving_vm) {
            results.push(
                run_iperf(
                    sending_vm,
                    receiving_vm,
                    receiving_vm.internal_ip(),
                    IpType::Internal,
                )
                .await?,
            );
        }
    }

    Ok(results)
}

/// Run one iperf client from `sending_vm` against `target` on `receiving_vm`.
pub async fn run_iperf(
    sending_vm: &dyn VirtualMachine,
    receiving_vm: &dyn VirtualMachine,
    target: IpAddr,
    ip_type: IpType,
) -> Result<Sample, BenchmarkError> {
    let output = sending_vm
        .remote_command(&client_command(target), true)
        .await?;
    let value = parse_throughput(&output.stdout)?;

    info!(
        sender = %sending_vm.name(),
        receiver = %receiving_vm.name(),
        %target,
        %ip_type,
        mbits_per_sec = value,
        "iperf measurement"
    );

    Ok(Sample::new(
        METRIC,
        value,
        UNIT,
        sample_metadata(sending_vm, receiving_vm, ip_type),
    ))
}

fn sample_metadata(
    sending_vm: &dyn VirtualMachine,
    receiving_vm: &dyn VirtualMachine,
    ip_type: IpType,
) -> Metadata {
    let mut metadata = Metadata::new();
    let mut put = |key: &str, value: &str| {
        metadata.insert(key.to_string(), value.to_string());
    };

    // server_*/client_* are the older names for receiving_*/sending_*.
    put("server_machine_type", receiving_vm.machine_type());
    put("server_zone", receiving_vm.zone());
    put("client_machine_type", sending_vm.machine_type());
    put("client_zone", sending_vm.zone());

    put("receiving_machine_type", receiving_vm.machine_type());
    put("receiving_zone", receiving_vm.zone());
    put("sending_machine_type", sending_vm.machine_type());
    put("sending_zone", sending_vm.zone());
    put("ip_type", &ip_type.to_string());

    metadata
}

/// Stop the iperf server and uninstall iperf.
///
/// Only the second machine's server is killed. The first machine's server
/// is left running until the package is removed.
pub async fn cleanup(spec: &BenchmarkSpec) -> Result<(), BenchmarkError> {
    spec.vm(1).remote_command(kill_command(), false).await?;

    for vm in spec.vms() {
        info!(vm = %vm.name(), "uninstalling iperf");
        vm.uninstall_package(IPERF_PACKAGE).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_OUTPUT: &str = "\
------------------------------------------------------------
Client connecting to 10.240.0.3, TCP port 20000
TCP window size: 0.08 MByte (default)
------------------------------------------------------------
[  3] local 10.240.0.2 port 53772 connected with 10.240.0.3 port 20000
[ ID] Interval       Transfer     Bandwidth
[  3]  0.0-60.0 sec  6740 MBytes   942.3 Mbits/sec
";

    #[test]
    fn test_get_info() {
        let info = get_info();
        assert_eq!(info.name, "iperf");
        assert_eq!(info.description, "Run iperf");
        assert!(!info.scratch_disk);
        assert_eq!(info.num_machines, 2);
    }

    #[test]
    fn test_parse_real_client_output() {
        assert_eq!(parse_throughput(CLIENT_OUTPUT).unwrap(), 942.3);
    }

    #[test]
    fn test_parse_decimal_and_integer() {
        assert_eq!(parse_throughput("123.4 Mbits/sec").unwrap(), 123.4);
        assert_eq!(parse_throughput("987 Mbits/sec").unwrap(), 987.0);
    }

    #[test]
    fn test_parse_takes_first_match() {
        let out = "[  4]  0.0-30.0 sec  10 MBytes  2.8 Mbits/sec\n[SUM]  0.0-60.0 sec  20 MBytes  5.6 Mbits/sec";
        assert_eq!(parse_throughput(out).unwrap(), 2.8);
    }

    #[test]
    fn test_parse_ignores_other_units() {
        let err = parse_throughput("[  3]  0.0-60.0 sec  6.6 GBytes  0.94 Gbits/sec").unwrap_err();
        assert!(matches!(err, BenchmarkError::ResultNotFound { .. }));
    }

    #[test]
    fn test_parse_only_ascii_digits() {
        let err = parse_throughput("[  3]  0.0-60.0 sec  3576 MBytes  \u{665}\u{660}\u{660} Mbits/sec")
            .unwrap_err();
        assert!(matches!(err, BenchmarkError::ResultNotFound { .. }));

        let mixed = "\u{665}\u{660}\u{660} Mbits/sec then 500 Mbits/sec";
        assert_eq!(parse_throughput(mixed).unwrap(), 500.0);
    }

    #[test]
    fn test_parse_failure_carries_output() {
        let out = "connect failed: No route to host";
        match parse_throughput(out) {
            Err(BenchmarkError::ResultNotFound { stdout }) => assert_eq!(stdout, out),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_wire_commands() {
        assert_eq!(
            server_command(),
            "nohup iperf --server --port 20000 &> /dev/null &"
        );
        assert_eq!(
            client_command("10.0.0.2".parse().unwrap()),
            "iperf --client 10.0.0.2 --port 20000 --format m --time 60"
        );
        assert_eq!(kill_command(), "pkill -9 iperf");
    }

    #[test]
    fn test_ip_type_labels() {
        assert_eq!(IpType::External.to_string(), "external");
        assert_eq!(IpType::Internal.to_string(), "internal");
    }
}
