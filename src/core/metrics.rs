use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) const ATTEMPTS_CREATED: &str = "test_attempts_created_total";
pub(crate) const ATTEMPTS_COMPLETED: &str = "test_attempts_completed_total";
pub(crate) const ATTEMPT_SAVES: &str = "test_attempt_saves_total";
pub(crate) const ARCHIVE_FAILURES: &str = "test_attempt_archive_failures_total";

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    metrics::describe_counter!(ATTEMPTS_CREATED, "Test attempts opened, by reason");
    metrics::describe_counter!(ATTEMPTS_COMPLETED, "Test attempts moved to completed");
    metrics::describe_counter!(ATTEMPT_SAVES, "Answer saves applied to live snapshots");
    metrics::describe_counter!(ARCHIVE_FAILURES, "Failed archival snapshot writes");
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
