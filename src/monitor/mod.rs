//! Sync health monitoring and alerting
//!
//! The monitor reads the SyncRun history independently of the engine and
//! aggregates it into per-database health signals and global 24h totals. A
//! database is `critical` when it has never synced, is overdue beyond the
//! alert threshold, or has failed too many consecutive runs; `warning` when
//! moderately overdue or its 24h success rate is below the threshold.
//! Alerts are deduplicated through the shared state store with a
//! per-severity suppression window before reaching the notification
//! channel.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::coordination::StateStore;
use crate::database::SyncStore;
use crate::error::SyncError;
use crate::models::{RemoteDatabase, SyncRunStatus};

/// Health classification for a database or the whole deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything within thresholds
    #[default]
    Ok,
    /// Degraded but functioning
    Warning,
    /// Needs attention now
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Health evaluation for one database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    /// Database id
    pub database_id: String,

    /// Database title, for readable alerts
    pub title: String,

    /// Classification
    pub status: HealthStatus,

    /// Human-readable reasons behind the classification
    pub reasons: Vec<String>,

    /// When the database last synced successfully
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Consecutive failed runs, newest backwards
    pub consecutive_failures: u32,
}

/// Global totals over the trailing 24 hours
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Runs started
    pub runs: u64,
    /// Runs that completed (fully or partially)
    pub successes: u64,
    /// Runs that failed
    pub failures: u64,
    /// Average terminal-run duration in milliseconds
    pub average_duration_ms: i64,
    /// Pages created plus updated across all runs
    pub pages_synced: u64,
}

/// Full monitor evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Overall status: the worst per-database status
    pub overall: HealthStatus,

    /// Per-database evaluations
    pub databases: Vec<DatabaseHealth>,

    /// Global 24h totals
    pub global: GlobalStats,
}

/// A deduplicated alert emitted to the notification channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Alert severity
    pub severity: HealthStatus,

    /// Summary message
    pub message: String,

    /// Databases behind the alert, with their reasons
    pub details: Vec<String>,
}

/// Notification delivery errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NotifyError {
    /// The channel could not deliver the alert
    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}

/// Destination for emitted alerts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver one alert
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Notification channel that writes alerts to the log
///
/// The default channel for deployments without an external alert sink.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationChannel for LogNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        match alert.severity {
            HealthStatus::Critical => {
                error!(message = %alert.message, details = ?alert.details, "Sync health critical")
            }
            _ => warn!(message = %alert.message, details = ?alert.details, "Sync health degraded"),
        }
        Ok(())
    }
}

/// Aggregates run history into health signals and alerts
pub struct Monitor {
    store: Arc<dyn SyncStore>,
    state: Arc<dyn StateStore>,
    channel: Arc<dyn NotificationChannel>,
    config: MonitorConfig,
}

impl Monitor {
    const ALERT_KEY_PREFIX: &'static str = "alert:";

    /// Create a monitor
    pub fn new(
        store: Arc<dyn SyncStore>,
        state: Arc<dyn StateStore>,
        channel: Arc<dyn NotificationChannel>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            state,
            channel,
            config,
        }
    }

    /// Evaluate one database's health at `now`
    pub async fn database_health(
        &self,
        database: &RemoteDatabase,
        now: DateTime<Utc>,
    ) -> Result<DatabaseHealth, SyncError> {
        let mut status = HealthStatus::Ok;
        let mut reasons = Vec::new();
        let mut raise = |current: &mut HealthStatus, level: HealthStatus, reason: String| {
            if level > *current {
                *current = level;
            }
            reasons.push(reason);
        };

        // Never synced is critical outright
        match database.last_synced_at {
            None => raise(
                &mut status,
                HealthStatus::Critical,
                "never synced".to_string(),
            ),
            Some(last) => {
                let overdue = (now - last).num_seconds() as f64;
                let interval = database.sync_interval_secs as f64;
                if overdue >= interval * self.config.critical_overdue_factor {
                    raise(
                        &mut status,
                        HealthStatus::Critical,
                        format!("overdue by {:.0}s", overdue - interval),
                    );
                } else if overdue >= interval * self.config.warning_overdue_factor {
                    raise(
                        &mut status,
                        HealthStatus::Warning,
                        format!("overdue by {:.0}s", overdue - interval),
                    );
                }
            }
        }

        // Consecutive failures, newest backwards. The fetch window also
        // feeds the 24h success rate below.
        let recent = self
            .store
            .list_runs_for_database(
                &database.id,
                (self.config.max_consecutive_failures.max(1) * 2).max(50),
            )
            .await?;
        let consecutive_failures = recent
            .iter()
            .filter(|run| run.is_terminal())
            .take_while(|run| run.status == SyncRunStatus::Failed)
            .count() as u32;
        if consecutive_failures >= self.config.max_consecutive_failures {
            raise(
                &mut status,
                HealthStatus::Critical,
                format!("{} consecutive failed runs", consecutive_failures),
            );
        }

        // 24h success rate
        let day_runs: Vec<_> = recent
            .iter()
            .filter(|run| run.started_at >= now - Duration::hours(24) && run.is_terminal())
            .collect();
        if !day_runs.is_empty() {
            let successes = day_runs
                .iter()
                .filter(|run| run.status != SyncRunStatus::Failed)
                .count();
            let rate = (successes as f64 / day_runs.len() as f64) * 100.0;
            if rate < self.config.success_rate_threshold {
                raise(
                    &mut status,
                    HealthStatus::Warning,
                    format!("24h success rate {:.0}%", rate),
                );
            }
        }

        Ok(DatabaseHealth {
            database_id: database.id.clone(),
            title: database.title.clone(),
            status,
            reasons,
            last_synced_at: database.last_synced_at,
            consecutive_failures,
        })
    }

    /// Global 24h totals across all databases
    pub async fn global_stats(&self, now: DateTime<Utc>) -> Result<GlobalStats, SyncError> {
        let runs = self.store.list_runs_since(now - Duration::hours(24)).await?;

        let mut stats = GlobalStats {
            runs: runs.len() as u64,
            ..GlobalStats::default()
        };

        let mut duration_total: i64 = 0;
        let mut duration_count: i64 = 0;

        for run in &runs {
            match run.status {
                SyncRunStatus::Completed | SyncRunStatus::Partial => stats.successes += 1,
                SyncRunStatus::Failed => stats.failures += 1,
                _ => {}
            }
            stats.pages_synced +=
                (run.counters.pages_created + run.counters.pages_updated) as u64;
            if let Some(ms) = run.duration_ms() {
                duration_total += ms;
                duration_count += 1;
            }
        }

        if duration_count > 0 {
            stats.average_duration_ms = duration_total / duration_count;
        }
        Ok(stats)
    }

    /// Full evaluation: every active database plus global totals
    pub async fn evaluate(&self, now: DateTime<Utc>) -> Result<MonitorReport, SyncError> {
        let mut databases = Vec::new();
        let mut overall = HealthStatus::Ok;

        for database in self.store.list_active_databases().await? {
            let health = self.database_health(&database, now).await?;
            if health.status > overall {
                overall = health.status;
            }
            databases.push(health);
        }

        Ok(MonitorReport {
            overall,
            databases,
            global: self.global_stats(now).await?,
        })
    }

    /// Evaluate and, when degraded, emit one deduplicated alert
    ///
    /// Repeat alerts of the same severity are suppressed for the configured
    /// window. Returns the alert that was sent, if any.
    pub async fn check_and_alert(&self, now: DateTime<Utc>) -> Result<Option<Alert>, SyncError> {
        let report = self.evaluate(now).await?;
        if report.overall == HealthStatus::Ok {
            return Ok(None);
        }

        let dedup_key = format!("{}{}", Self::ALERT_KEY_PREFIX, report.overall);
        if self.state.get(&dedup_key).await?.is_some() {
            info!(severity = %report.overall, "Alert suppressed (within dedup window)");
            return Ok(None);
        }

        let degraded: Vec<&DatabaseHealth> = report
            .databases
            .iter()
            .filter(|health| health.status != HealthStatus::Ok)
            .collect();
        let alert = Alert {
            severity: report.overall,
            message: format!(
                "Sync health {}: {} of {} databases degraded",
                report.overall,
                degraded.len(),
                report.databases.len()
            ),
            details: degraded
                .iter()
                .map(|health| format!("{}: {}", health.title, health.reasons.join(", ")))
                .collect(),
        };

        self.state
            .put(
                &dedup_key,
                &now.to_rfc3339(),
                std::time::Duration::from_secs(self.config.alert_suppression_secs),
            )
            .await?;

        if let Err(err) = self.channel.send(&alert).await {
            warn!(error = %err, "Alert delivery failed");
        }
        Ok(Some(alert))
    }
}
