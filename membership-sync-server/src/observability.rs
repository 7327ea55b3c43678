//! Observability for the membership sync daemon.
//!
//! Structured logging setup and the health verdict derived from each sweep.

use std::io;

use membership_sync::engine::SweepReport;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log format configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format for development.
    Pretty,
    /// JSON format for production log aggregation.
    Json,
}

impl LogFormat {
    /// Determines log format from environment.
    ///
    /// Checks `LOG_FORMAT` environment variable:
    /// - `json` => JSON format
    /// - `pretty` or unset => Pretty format
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initializes structured logging on stderr.
///
/// # Environment Variables
///
/// - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
/// - `RUST_LOG`: Log level filter (default: `info`). Audit events use the
///   `audit` target, so `RUST_LOG=warn,audit=info` keeps only those.
pub fn init_observability(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Json => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_thread_names(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(io::stderr),
                )
                .init();
        }
    }
}

/// Health of the last sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Every examined user was reconciled.
    Healthy,
    /// Some users failed and will be retried.
    Degraded,
    /// Every examined user failed.
    Unhealthy,
}

impl HealthStatus {
    /// Derives the health of a finished sweep.
    #[must_use]
    pub fn from_report(report: &SweepReport) -> Self {
        if report.failed == 0 {
            Self::Healthy
        } else if report.failed < report.examined {
            Self::Degraded
        } else {
            Self::Unhealthy
        }
    }

    /// Returns string representation for JSON serialization.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Serializes a sweep report with its health verdict.
///
/// # Errors
///
/// Returns error if JSON serialization fails.
pub fn report_json(report: &SweepReport) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_value(report)?;
    json["status"] = serde_json::Value::from(HealthStatus::from_report(report).as_str());
    json["version"] = serde_json::Value::from(env!("CARGO_PKG_VERSION"));
    serde_json::to_string_pretty(&json)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn report(examined: usize, failed: usize) -> SweepReport {
        SweepReport {
            run_id: Uuid::nil(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            examined,
            active: examined - failed,
            inactive: 0,
            unresolved: 0,
            reminders_sent: 0,
            expired: 0,
            skipped: 0,
            failed,
            role_mutations: 0,
        }
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Pretty);
    }

    #[test]
    fn test_health_from_report() {
        assert_eq!(HealthStatus::from_report(&report(0, 0)), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_report(&report(10, 0)), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_report(&report(10, 3)), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_report(&report(10, 10)), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_report_json() {
        let json = report_json(&report(4, 1)).expect("JSON serialization should succeed");
        assert!(json.contains("\"status\": \"degraded\""));
        assert!(json.contains("\"examined\": 4"));
        assert!(json.contains("\"run_id\": \"00000000-0000-0000-0000-000000000000\""));
    }
}
