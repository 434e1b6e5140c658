use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pvcbench", about, long_about = None)]
pub struct PvcBenchCli {
    /// Refuse to run unless the current kubeconfig context has this name.
    ///
    /// The benchmark creates and deletes a lot of objects so it should only be pointed at a
    /// disposable cluster.
    #[clap(long, global = true, default_value = "minikube")]
    pub expected_context: String,

    /// Run against whatever the current kubeconfig context is
    #[clap(long, global = true, default_value = "false")]
    pub any_context: bool,

    /// Stop the run after this many seconds
    #[clap(long, global = true)]
    pub timeout: Option<u64>,

    /// Do not show a progress spinner on the CLI.
    ///
    /// This is recommended for CI/CD environments where the spinner isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, global = true, default_value = "false")]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single benchmark scenario
    Benchmark(BenchmarkArgs),
    /// Clean up namespaces created by the tool
    Cleanup(CleanupArgs),
}

#[derive(Args, Debug)]
pub struct BenchmarkArgs {
    /// Scenario to run: burst (all-at-once), staggered (batched)
    #[clap(long, default_value = "burst")]
    pub scenario: String,

    /// Number of replicas, and therefore PVCs
    #[clap(long, default_value_t = 100)]
    pub replicas: u32,

    /// Storage requested by each PVC
    #[clap(long, default_value = "100Mi")]
    pub pvc_size: String,

    /// Replicas removed per step in the staggered scenario
    #[clap(long, default_value_t = 10)]
    pub delete_batch_size: u32,

    /// Interval between steps in the staggered scenario, such as `500ms`, `5s` or `1m`
    #[clap(long, default_value = "5s", value_parser = parse_duration)]
    pub delete_interval: Duration,

    /// Interval between PVC lookups while waiting for deletion
    #[clap(long, default_value = "100ms", value_parser = parse_duration)]
    pub pvc_poll_interval: Duration,

    /// Namespace to run in. Defaults to `pvcbench-<unix seconds>`
    #[clap(long)]
    pub namespace: Option<String>,

    /// Name of the StatefulSet
    #[clap(long, default_value = "pvcbench-sts")]
    pub name: String,

    /// Append a JSON summary of a successful run to this file. Defaults to the `RUN_SUMMARY_PATH`
    /// environment variable, if set
    #[clap(long)]
    pub run_summary_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Force namespace deletion by removing finalizers
    #[clap(long, default_value = "false")]
    pub force: bool,
}

const UNITS: [(&str, Duration); 6] = [
    ("ns", Duration::from_nanos(1)),
    ("us", Duration::from_micros(1)),
    ("ms", Duration::from_millis(1)),
    ("s", Duration::from_secs(1)),
    ("m", Duration::from_secs(60)),
    ("h", Duration::from_secs(60 * 60)),
];

/// Parse a duration written as a sequence of whole numbers with units, such as `500ms`, `5s` or
/// `1m30s`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    if s.is_empty() {
        bail!("No duration specified");
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow!("Missing unit in duration {s:?}"))?;
        if digits_end == 0 {
            bail!("Expected a number in duration {s:?}");
        }
        let value: u32 = rest[..digits_end]
            .parse()
            .map_err(|e| anyhow!("Invalid number in duration {s:?}: {e}"))?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        let (_, scale) = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .ok_or_else(|| anyhow!("Unknown unit {unit:?} in duration {s:?}"))?;
        rest = &rest[unit_end..];

        total = scale
            .checked_mul(value)
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| anyhow!("Duration {s:?} is too large"))?;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_durations() {
        assert_eq!(Duration::from_millis(500), parse_duration("500ms").unwrap());
        assert_eq!(Duration::from_secs(5), parse_duration("5s").unwrap());
        assert_eq!(Duration::from_secs(60), parse_duration("1m").unwrap());
        assert_eq!(Duration::from_secs(90), parse_duration("1m30s").unwrap());
        assert_eq!(Duration::from_micros(250), parse_duration("250us").unwrap());
        assert_eq!(Duration::ZERO, parse_duration("0").unwrap());
    }

    #[test]
    fn reject_bad_durations() {
        for bad in ["", "5", "ms", "5x", "1.5s", "-1s"] {
            assert!(parse_duration(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn defaults() {
        let cli = PvcBenchCli::parse_from(["pvcbench", "benchmark"]);
        assert_eq!("minikube", cli.expected_context);
        assert!(!cli.any_context);

        let Command::Benchmark(args) = cli.command else {
            panic!("expected the benchmark command");
        };
        assert_eq!("burst", args.scenario);
        assert_eq!(100, args.replicas);
        assert_eq!("100Mi", args.pvc_size);
        assert_eq!(10, args.delete_batch_size);
        assert_eq!(Duration::from_secs(5), args.delete_interval);
        assert_eq!(Duration::from_millis(100), args.pvc_poll_interval);
        assert_eq!("pvcbench-sts", args.name);
        assert_eq!(None, args.namespace);
    }

    #[test]
    fn cleanup_rejects_positional_arguments() {
        assert!(PvcBenchCli::try_parse_from(["pvcbench", "cleanup", "extra"]).is_err());

        let cli = PvcBenchCli::parse_from(["pvcbench", "--any-context", "cleanup", "--force"]);
        assert!(cli.any_context);
        assert!(matches!(cli.command, Command::Cleanup(CleanupArgs { force: true })));
    }
}
