mod executor;
mod init;
mod progress;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::executor::Executor;
    pub use crate::init::init_logging;
    pub use crate::progress::start_progress;
    pub use crate::types::BenchResult;
    pub use pvc_bench_core::prelude::{
        DelegatedShutdownListener, ShutdownHandle, ShutdownReason, ShutdownSignalError,
        WaitTimeoutError,
    };
}
