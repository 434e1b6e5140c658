use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use pvc_bench_instruments::{print_metrics_report, BenchMetrics};
use pvc_bench_kube::prelude::{ClusterApi, KubeCluster};
use pvc_bench_runner::prelude::{
    init_logging, start_progress, BenchResult, Executor, ShutdownSignalError,
};
use pvc_bench_summary_model::append_run_summary;
use pvc_delete::cli::{BenchmarkArgs, CleanupArgs, Command, PvcBenchCli};
use pvc_delete::cleanup::{cleanup_namespaces, NAMESPACE_PREFIX};
use pvc_delete::config::{RunConfig, RunConfigInput};
use pvc_delete::scenario::run_scenario;
use pvc_delete::summary::{print_summary, to_run_summary};

/// Environment variable name to set a run summary file path
const RUN_SUMMARY_PATH_ENV: &str = "RUN_SUMMARY_PATH";

/// Reported when the API server version can't be read.
const UNKNOWN_VERSION: &str = "unknown";

fn main() -> BenchResult<()> {
    init_logging();

    let cli = PvcBenchCli::parse();
    log::debug!("Parsed arguments: {cli:?}");

    let executor = Executor::start(cli.timeout.map(Duration::from_secs))?;

    let expected_context = (!cli.any_context).then_some(cli.expected_context.as_str());
    let cluster = executor.execute_in_place(KubeCluster::connect(expected_context))?;

    let result = match cli.command {
        Command::Benchmark(args) => benchmark(&executor, &cluster, args, cli.no_progress),
        Command::Cleanup(args) => cleanup(&executor, &cluster, args),
    };

    if let Err(e) = &result {
        if e.is::<ShutdownSignalError>() {
            log::warn!("Stopped before completion: {e}");
        }
    }

    result
}

fn benchmark(
    executor: &Executor,
    cluster: &KubeCluster,
    args: BenchmarkArgs,
    no_progress: bool,
) -> BenchResult<()> {
    let namespace = args
        .namespace
        .unwrap_or_else(|| format!("{NAMESPACE_PREFIX}{}", Utc::now().timestamp()));
    let config = RunConfig::new(RunConfigInput {
        name: args.name,
        namespace,
        scenario: args.scenario,
        replicas: args.replicas,
        pvc_size: args.pvc_size,
        delete_batch_size: args.delete_batch_size,
        delete_interval: args.delete_interval,
        pvc_poll_interval: args.pvc_poll_interval,
    })?;

    let kubernetes_version = match executor.execute_in_place(async {
        cluster.server_version().await.map_err(anyhow::Error::from)
    }) {
        Ok(version) => version,
        Err(e) => {
            log::warn!("Could not read the Kubernetes server version: {e}");
            UNKNOWN_VERSION.to_string()
        }
    };

    let metrics = Arc::new(BenchMetrics::new());
    let progress = (!no_progress).then(|| {
        start_progress(metrics.clone(), executor.shutdown_handle().new_listener())
    });

    let started_at = Utc::now();
    let mut shutdown_listener = executor.shutdown_handle().new_listener();
    let outcome = executor.execute_in_place(run_scenario(
        cluster,
        &config,
        &metrics,
        &mut shutdown_listener,
    ));

    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    print_metrics_report(&metrics.snapshot());
    let result = outcome?;

    print_summary(&config, &kubernetes_version, &result);

    let summary_path = args
        .run_summary_path
        .or_else(|| std::env::var(RUN_SUMMARY_PATH_ENV).map(PathBuf::from).ok());
    if let Some(path) = summary_path {
        let run_summary = to_run_summary(
            nanoid::nanoid!(),
            started_at,
            &config,
            &kubernetes_version,
            &result,
        );
        append_run_summary(&run_summary, &path).with_context(|| {
            format!("Failed to write run summary to {}", path.display())
        })?;
        log::info!("Run summary appended to {}", path.display());
    }

    Ok(())
}

fn cleanup(executor: &Executor, cluster: &KubeCluster, args: CleanupArgs) -> BenchResult<()> {
    let mut shutdown_listener = executor.shutdown_handle().new_listener();
    let deleted = executor.execute_in_place(cleanup_namespaces(
        cluster,
        args.force,
        &mut shutdown_listener,
    ))?;

    if deleted.is_empty() {
        println!("No {NAMESPACE_PREFIX}* namespaces found");
    } else {
        for name in deleted {
            println!("Deleted namespace {name}");
        }
    }

    Ok(())
}
