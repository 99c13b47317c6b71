//! Logging service

use crate::models::LogLevel;

/// Initialize logging with the specified level
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match level {
        LogLevel::Error => "specloop=error,specloop_core=error",
        LogLevel::Warn => "specloop=warn,specloop_core=warn",
        LogLevel::Info => "specloop=info,specloop_core=info",
        LogLevel::Debug => "specloop=debug,specloop_core=debug",
        LogLevel::Trace => "specloop=trace,specloop_core=trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()?;

    Ok(())
}

/// Log a workflow lifecycle event
pub fn log_workflow_event(event_type: &str, workflow: &str, details: Option<&str>) {
    tracing::info!(
        event_type = event_type,
        workflow = workflow,
        details = details.unwrap_or(""),
        "Workflow event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_initialization() {
        // A second call fails because a global subscriber is already set
        let _ = init_logging(LogLevel::Info);
        assert!(init_logging(LogLevel::Debug).is_err());
    }

    #[test]
    fn test_log_functions() {
        log_workflow_event("started", "spec-workflow", Some("mode=spec"));
        log_workflow_event("cancelled", "spec-workflow", None);
    }
}
