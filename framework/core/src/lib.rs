mod shutdown;
mod timeout;

pub mod prelude {
    pub use crate::shutdown::{
        DelegatedShutdownListener, ShutdownHandle, ShutdownReason, ShutdownSignalError,
    };
    pub use crate::timeout::WaitTimeoutError;
}
