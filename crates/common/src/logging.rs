use crate::config::Environment;
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Formatting layer for the given environment: JSON lines in production,
/// pretty ANSI output in development.
pub(crate) fn fmt_layer(environment: Environment) -> BoxedLayer {
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .with_target(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .boxed(),
    }
}

pub(crate) fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Initialize the global subscriber without an OTLP exporter.
///
/// Filtering follows `RUST_LOG` (defaults to "info").
pub fn setup_logging(environment: Environment) {
    tracing_subscriber::registry()
        .with(fmt_layer(environment))
        .with(env_filter())
        .init();
}
