pub mod cleanup;
pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod policy;
pub mod poller;
pub mod retry;
pub mod scenario;
pub mod summary;
pub mod wait;

pub mod prelude {
    pub use crate::cleanup::{cleanup_namespaces, NAMESPACE_PREFIX};
    pub use crate::config::{ConfigError, RunConfig, RunConfigInput, ScenarioKind, ScenarioName};
    pub use crate::poller::{ClaimState, DeletionPoller};
    pub use crate::policy::ScaleDownPolicy;
    pub use crate::retry::RetryPolicy;
    pub use crate::scenario::{run_scenario, run_scenario_with_retry, RunResult, Stage};
    pub use crate::summary::{print_summary, render_summary, to_run_summary};
}
