use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// Latency statistics for the claims deleted during a run, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

/// Summary of a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The scale-down scenario that was run, `burst` or `staggered`
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The namespace the replica group was created in
    pub namespace: String,
    /// The number of replicas, and therefore claims, in the group
    pub replicas: u32,
    /// The storage requested by each claim, as a Kubernetes quantity such as `100Mi`
    pub pvc_size: String,
    /// Replicas removed per scale step
    ///
    /// Only set for the staggered scenario.
    pub delete_batch_size: Option<u32>,
    /// Delay between scale steps, in milliseconds
    ///
    /// Only set for the staggered scenario.
    pub delete_interval_ms: Option<u64>,
    /// Interval between claim lookups, in milliseconds
    pub pvc_poll_interval_ms: u64,
    /// The version reported by the Kubernetes API server, or `unknown`
    pub kubernetes_version: String,
    /// Wall time from the first scale request until every claim was gone, in milliseconds
    pub total_duration_ms: f64,
    /// Per-claim deletion latency statistics
    ///
    /// Not set if no deletions were recorded.
    pub latency: Option<LatencySummary>,
    /// The version of the benchmark tool that produced this summary
    pub pvc_bench_version: String,
}

impl RunSummary {
    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to identify the configuration used to run the scenario, so
    /// that runs can be compared like for like. It uses the
    ///     - Scenario name
    ///     - Replicas and PVC size
    ///     - Delete batch size and interval
    ///     - PVC poll interval
    ///     - Kubernetes version
    ///     - Benchmark tool version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, self.replicas.to_le_bytes());
        Digest::update(&mut hasher, self.pvc_size.as_bytes());
        if let Some(batch_size) = self.delete_batch_size {
            Digest::update(&mut hasher, batch_size.to_le_bytes());
        }
        if let Some(interval) = self.delete_interval_ms {
            Digest::update(&mut hasher, interval.to_le_bytes());
        }
        Digest::update(&mut hasher, self.pvc_poll_interval_ms.to_le_bytes());
        Digest::update(&mut hasher, self.kubernetes_version.as_bytes());
        Digest::update(&mut hasher, self.pvc_bench_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: impl AsRef<Path>) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(run_id: &str) -> RunSummary {
        RunSummary {
            run_id: run_id.to_string(),
            scenario_name: "staggered".to_string(),
            started_at: 1_700_000_000,
            namespace: "pvcbench-1700000000".to_string(),
            replicas: 10,
            pvc_size: "100Mi".to_string(),
            delete_batch_size: Some(3),
            delete_interval_ms: Some(5000),
            pvc_poll_interval_ms: 100,
            kubernetes_version: "v1.30.11".to_string(),
            total_duration_ms: 21_500.0,
            latency: Some(LatencySummary {
                count: 10,
                avg_ms: 120.0,
                p50_ms: 100.0,
                p90_ms: 300.0,
                p99_ms: 310.0,
            }),
            pvc_bench_version: "0.1.0".to_string(),
        }
    }

    #[test]
    fn fingerprint_ignores_run_identity_and_results() {
        let first = summary("a");
        let mut second = summary("b");
        second.started_at += 60;
        second.namespace = "pvcbench-1700000060".to_string();
        second.total_duration_ms = 1.0;
        second.latency = None;

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_configuration() {
        let first = summary("a");
        let mut second = summary("a");
        second.delete_batch_size = Some(5);

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn append_and_load_jsonl() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("run_summary.jsonl");

        append_run_summary(&summary("a"), &path).expect("append first");
        append_run_summary(&summary("b"), &path).expect("append second");

        let runs = load_summary_runs(&path).expect("load");
        assert_eq!(vec![summary("a"), summary("b")], runs);
    }

    #[test]
    fn store_and_load_single_summary() {
        let mut buf = Vec::new();
        store_run_summary(&summary("a"), &mut buf).expect("store");

        let loaded = load_run_summary(buf.as_slice()).expect("load");
        assert_eq!(summary("a"), loaded);
    }
}
