//! Long-running services: command dispatch, the Telegram update reconciler,
//! the daily digest reporter, and the system-health monitor.

pub mod app_context;
pub mod command_dispatch;
pub mod scheduled_reporter;
pub mod service_handle;
pub mod system_health;
pub mod update_reconciler;

pub use app_context::AppContext;
pub use command_dispatch::{
    parse_command, render_stats, Command, CommandDispatcher, DispatchOutcome,
};
pub use scheduled_reporter::{
    parse_report_time, render_digest, ReportDigest, ReportTickOutcome, ReporterConfig,
    ScheduledReporter,
};
pub use service_handle::{spawn_service, ServiceHandle, ShutdownSignal};
pub use system_health::{
    evaluate_health, HealthMetric, HealthMonitor, HealthMonitorConfig, HealthThresholds,
    MetricsError, ProcfsSystemMetrics, SystemMetrics, SystemMetricsSnapshot,
};
pub use update_reconciler::{
    Cursor, ReconcileCycleReport, ReconcilerConfig, ReconcilerHealth, ReconcilerHealthSnapshot,
    ReconcilerState, UpdateReconciler,
};
