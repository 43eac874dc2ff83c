use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Initialize structured logging.
///
/// `RUST_LOG` wins over `level` when set. JSON output carries the current span
/// and span list so correlation ids follow every event.
pub fn init_telemetry(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()?;
    }

    tracing::info!("contractflow telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span carrying the common attributes of a contract operation
pub fn create_contract_span(
    operation: &str,
    contract_id: Option<&str>,
    actor_id: Option<&str>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "contract_operation",
        operation = operation,
        contract.id = contract_id,
        actor.id = actor_id,
        correlation.id = correlation_id,
    )
}

pub fn shutdown_telemetry() {
    tracing::info!("contractflow telemetry shutdown complete");
}
