/// Recommended error type for the benchmark `main` function and scenario code. Typed errors such
/// as [pvc_bench_core::prelude::ShutdownSignalError] are carried inside and can be recovered with
/// `downcast_ref`.
pub type BenchResult<T> = anyhow::Result<T>;
