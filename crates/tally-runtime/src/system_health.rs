//! Structured host metrics and the threshold monitor that alerts on breach
//! and recovery transitions.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tally_channels::Notifier;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::service_handle::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemMetricsSnapshot {
    pub uptime_seconds: u64,
    pub memory_used_percent: f64,
    pub disk_used_percent: f64,
    pub load_average_1m: f64,
}

impl SystemMetricsSnapshot {
    pub fn render(&self) -> String {
        format!(
            "System health\nUptime: {}\nMemory used: {:.1}%\nDisk used: {:.1}%\nLoad (1m): {:.2}",
            render_uptime(self.uptime_seconds),
            self.memory_used_percent,
            self.disk_used_percent,
            self.load_average_1m
        )
    }
}

fn render_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error("disk statistics unavailable for {path}: {detail}")]
    Disk { path: String, detail: String },
}

/// Source of host metrics. Implementations return numbers, never raw text.
pub trait SystemMetrics: Send + Sync {
    fn sample(&self) -> Result<SystemMetricsSnapshot, MetricsError>;
}

/// Reads Linux procfs and `statvfs`.
#[derive(Debug, Clone)]
pub struct ProcfsSystemMetrics {
    proc_root: PathBuf,
    disk_path: PathBuf,
}

impl ProcfsSystemMetrics {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self::with_proc_root("/proc", disk_path)
    }

    pub fn with_proc_root(proc_root: impl Into<PathBuf>, disk_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            disk_path: disk_path.into(),
        }
    }

    fn read_proc(&self, name: &str) -> Result<String, MetricsError> {
        let path = self.proc_root.join(name);
        std::fs::read_to_string(&path).map_err(|source| MetricsError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

impl SystemMetrics for ProcfsSystemMetrics {
    fn sample(&self) -> Result<SystemMetricsSnapshot, MetricsError> {
        Ok(SystemMetricsSnapshot {
            uptime_seconds: parse_uptime(&self.read_proc("uptime")?)?,
            memory_used_percent: parse_meminfo_used_percent(&self.read_proc("meminfo")?)?,
            disk_used_percent: disk_used_percent(&self.disk_path)?,
            load_average_1m: parse_loadavg_1m(&self.read_proc("loadavg")?)?,
        })
    }
}

pub(crate) fn parse_uptime(raw: &str) -> Result<u64, MetricsError> {
    let first = raw.split_whitespace().next().unwrap_or_default();
    let seconds = first.parse::<f64>().map_err(|error| MetricsError::Parse {
        what: "uptime",
        detail: format!("'{first}': {error}"),
    })?;
    Ok(seconds.max(0.0) as u64)
}

pub(crate) fn parse_meminfo_used_percent(raw: &str) -> Result<f64, MetricsError> {
    let mut total = None;
    let mut available = None;
    for line in raw.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default();
        let value = parts.next().and_then(|value| value.parse::<u64>().ok());
        match key {
            "MemTotal:" => total = value,
            "MemAvailable:" => available = value,
            _ => {}
        }
    }
    let (Some(total), Some(available)) = (total, available) else {
        return Err(MetricsError::Parse {
            what: "meminfo",
            detail: "missing MemTotal or MemAvailable".to_string(),
        });
    };
    if total == 0 {
        return Err(MetricsError::Parse {
            what: "meminfo",
            detail: "MemTotal is zero".to_string(),
        });
    }
    let used = total.saturating_sub(available);
    Ok(used as f64 * 100.0 / total as f64)
}

pub(crate) fn parse_loadavg_1m(raw: &str) -> Result<f64, MetricsError> {
    let first = raw.split_whitespace().next().unwrap_or_default();
    first.parse::<f64>().map_err(|error| MetricsError::Parse {
        what: "loadavg",
        detail: format!("'{first}': {error}"),
    })
}

/// Used percentage as `df` reports it: blocks reserved for root are excluded.
fn disk_used_percent(path: &Path) -> Result<f64, MetricsError> {
    let stats = nix::sys::statvfs::statvfs(path).map_err(|error| MetricsError::Disk {
        path: path.display().to_string(),
        detail: error.to_string(),
    })?;
    let total = stats.blocks() as u64;
    let free = stats.blocks_free() as u64;
    let available = stats.blocks_available() as u64;
    let used = total.saturating_sub(free);
    let usable = used.saturating_add(available);
    if usable == 0 {
        return Ok(0.0);
    }
    Ok(used as f64 * 100.0 / usable as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMetric {
    Memory,
    Disk,
    Load,
}

impl fmt::Display for HealthMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Load => "load",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub load_1m: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            memory_percent: 90.0,
            disk_percent: 90.0,
            load_1m: 4.0,
        }
    }
}

/// Metrics at or above their threshold.
pub fn evaluate_health(
    snapshot: &SystemMetricsSnapshot,
    thresholds: &HealthThresholds,
) -> BTreeSet<HealthMetric> {
    let mut breaches = BTreeSet::new();
    if snapshot.memory_used_percent >= thresholds.memory_percent {
        breaches.insert(HealthMetric::Memory);
    }
    if snapshot.disk_used_percent >= thresholds.disk_percent {
        breaches.insert(HealthMetric::Disk);
    }
    if snapshot.load_average_1m >= thresholds.load_1m {
        breaches.insert(HealthMetric::Load);
    }
    breaches
}

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub alert_chat_id: i64,
    pub interval: Duration,
    pub thresholds: HealthThresholds,
}

pub struct HealthMonitor {
    metrics: Arc<dyn SystemMetrics>,
    notifier: Notifier,
    config: HealthMonitorConfig,
    breached: BTreeSet<HealthMetric>,
}

impl HealthMonitor {
    pub fn new(
        metrics: Arc<dyn SystemMetrics>,
        notifier: Notifier,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            metrics,
            notifier,
            config,
            breached: BTreeSet::new(),
        }
    }

    /// Samples once and notifies on every breach or recovery transition.
    /// Returns the messages that were sent.
    pub async fn check_once(&mut self) -> Vec<String> {
        let snapshot = match self.metrics.sample() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(%error, "system metrics sample failed");
                return Vec::new();
            }
        };
        let current = evaluate_health(&snapshot, &self.config.thresholds);
        let mut messages = Vec::new();
        for metric in current.difference(&self.breached) {
            messages.push(format!(
                "ALERT: {metric} threshold breached\n{}",
                snapshot.render()
            ));
        }
        for metric in self.breached.difference(&current) {
            messages.push(format!("RECOVERED: {metric} back below threshold"));
        }
        self.breached = current;

        for message in &messages {
            self.notifier
                .notify_channel(self.config.alert_chat_id, message)
                .await;
        }
        messages
    }

    pub async fn run(mut self, mut shutdown_rx: ShutdownSignal) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("health monitor stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let sent = self.check_once().await;
                    if !sent.is_empty() {
                        tracing::info!(alerts = sent.len(), "health monitor sent notifications");
                    }
                }
            }
        }
    }
}
