pub mod config;
pub mod logging;
pub mod retry;
pub mod telemetry;
pub mod wait;

pub use config::{Environment, Lookup};
pub use logging::setup_logging;
pub use retry::Backoff;
pub use telemetry::{TelemetryGuard, init_observability};
pub use wait::{sleep_unless_stopped, wait_until};
