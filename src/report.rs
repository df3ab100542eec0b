//! Human-readable formatting of samples and reports.

use crate::runner::BenchmarkReport;
use crate::sample::Sample;

/// Render a Mbits/sec figure, switching to Gbits/sec above 1000.
pub fn format_speed(mbits_per_sec: f64) -> String {
    if mbits_per_sec >= 1000.0 {
        format!("{:.2} Gbits/sec", mbits_per_sec / 1000.0)
    } else {
        format!("{:.1} Mbits/sec", mbits_per_sec)
    }
}

/// One-line summary of a throughput sample.
pub fn format_sample(sample: &Sample) -> String {
    let speed = if sample.unit == "Mbits/sec" {
        format_speed(sample.value)
    } else {
        format!("{} {}", sample.value, sample.unit)
    };
    format!(
        "{} {} -> {} ({}): {}",
        sample.metric,
        sample.meta("sending_zone").unwrap_or("?"),
        sample.meta("receiving_zone").unwrap_or("?"),
        sample.meta("ip_type").unwrap_or("?"),
        speed,
    )
}

/// Tabular summary of a whole run.
pub fn format_report(report: &BenchmarkReport) -> String {
    let mut out = format!(
        "\n=== {} benchmark {} ===\nStarted: {}  Duration: {:.1}s\n",
        report.benchmark,
        report.run_uri,
        report.started_at.to_rfc3339(),
        report.duration_secs,
    );

    if report.samples.is_empty() {
        out.push_str("No samples collected.\n");
        return out;
    }

    out.push_str(&format!(
        "{:<18} | {:<18} | {:<8} | Throughput\n",
        "Sending zone", "Receiving zone", "IP type"
    ));
    out.push_str(&format!("{:-<18}-|-{:-<18}-|-{:-<8}-|-{:-<16}\n", "", "", "", ""));
    for sample in &report.samples {
        out.push_str(&format!(
            "{:<18} | {:<18} | {:<8} | {}\n",
            sample.meta("sending_zone").unwrap_or("?"),
            sample.meta("receiving_zone").unwrap_or("?"),
            sample.meta("ip_type").unwrap_or("?"),
            format_speed(sample.value),
        ));
    }
    out
}
