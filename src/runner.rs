//! Lifecycle driver: Prepare, Run, Cleanup.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::benchmark::{iperf, BenchmarkError, BenchmarkSpec};
use crate::policy::IpAddressPolicy;
use crate::report;
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    Run,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Prepare, Stage::Run, Stage::Cleanup];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Prepare => write!(f, "prepare"),
            Stage::Run => write!(f, "run"),
            Stage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Outcome of one invocation of the lifecycle.
#[derive(Debug, Serialize)]
pub struct BenchmarkReport {
    pub run_uri: Uuid,
    pub benchmark: &'static str,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub stages: Vec<Stage>,
    pub samples: Vec<Sample>,
}

/// Execute the requested stages in lifecycle order.
///
/// If Run fails, Cleanup (when requested) is still attempted and the Run
/// error is returned.
pub async fn execute(
    spec: &BenchmarkSpec,
    policy: &dyn IpAddressPolicy,
    stages: &[Stage],
) -> Result<BenchmarkReport, BenchmarkError> {
    let run_uri = Uuid::new_v4();
    let started_at = Utc::now();
    let clock = Instant::now();
    let benchmark = iperf::get_info().name;
    let wants = |stage: Stage| stages.contains(&stage);

    info!(%run_uri, %benchmark, ?spec, "starting benchmark");

    if wants(Stage::Prepare) {
        info!(%run_uri, stage = %Stage::Prepare, "entering stage");
        iperf::prepare(spec).await?;
    }

    let mut samples = Vec::new();
    if wants(Stage::Run) {
        info!(%run_uri, stage = %Stage::Run, "entering stage");
        match iperf::run(spec, policy).await {
            Ok(s) => {
                for sample in &s {
                    info!(%run_uri, "{}", report::format_sample(sample));
                }
                samples = s;
            }
            Err(e) => {
                error!(%run_uri, error = %e, "run failed");
                if wants(Stage::Cleanup) {
                    if let Err(cleanup_err) = iperf::cleanup(spec).await {
                        warn!(%run_uri, error = %cleanup_err, "cleanup after failed run also failed");
                    }
                }
                return Err(e);
            }
        }
    }

    if wants(Stage::Cleanup) {
        info!(%run_uri, stage = %Stage::Cleanup, "entering stage");
        iperf::cleanup(spec).await?;
    }

    let duration_secs = clock.elapsed().as_secs_f64();
    info!(%run_uri, samples = samples.len(), duration_secs, "benchmark complete");

    Ok(BenchmarkReport {
        run_uri,
        benchmark,
        started_at,
        duration_secs,
        stages: Stage::ALL.into_iter().filter(|s| wants(*s)).collect(),
        samples,
    })
}
