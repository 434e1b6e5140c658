/// Initialise logging for the benchmark.
///
/// Logs at `info` and above unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
