//! Post-execution monitoring: raises alerts on individual executions and
//! rolls a trailing window of them into a single quality score.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use qtx_config::MonitorConfig;
use qtx_schemas::{Alert, AlertSeverity};

const HISTORY_CAP: usize = 100;
const FAILED_ORDER_WINDOW: usize = 20;

/// One completed (or failed) execution, as reported by the caller after
/// a plan reaches a terminal status.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub succeeded: bool,
    pub slippage_bps: f64,
    pub duration_minutes: f64,
    pub vwap_deviation: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityScore {
    pub score: f64,
    pub grade: char,
}

impl QualityScore {
    fn from_score(score: f64) -> Self {
        let grade = if score >= 90.0 {
            'A'
        } else if score >= 80.0 {
            'B'
        } else if score >= 70.0 {
            'C'
        } else if score >= 60.0 {
            'D'
        } else {
            'F'
        };
        QualityScore { score, grade }
    }
}

/// `Execution { executions, successes, failures }` rolled up for one
/// calendar day, as returned by [`ExecutionMonitor::daily_summary`].
#[derive(Clone, Debug, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
    pub success_rate: f64,
    pub alerts_generated: usize,
}

/// Aggregated view over today's activity plus the trailing windows used
/// for the success rate, as returned by [`ExecutionMonitor::performance_dashboard`].
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceDashboard {
    pub today: DailySummary,
    pub recent_executions: Vec<ExecutionRecord>,
    pub success_rate_last_50: f64,
    pub critical_alerts: usize,
    pub warning_alerts: usize,
    pub info_alerts: usize,
}

pub struct ExecutionMonitor {
    config: MonitorConfig,
    history: VecDeque<(DateTime<Utc>, ExecutionRecord)>,
    failures: VecDeque<bool>,
    alerts: Vec<Alert>,
}

impl ExecutionMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        ExecutionMonitor {
            config,
            history: VecDeque::new(),
            failures: VecDeque::new(),
            alerts: Vec::new(),
        }
    }

    /// Record one completed execution, evaluate every alert condition
    /// against it and the trailing failure window, and return the
    /// alerts this call raised.
    pub fn record_execution(&mut self, record: ExecutionRecord, now: DateTime<Utc>) -> Vec<Alert> {
        let mut raised = Vec::new();

        if record.slippage_bps > self.config.slippage_threshold_bps {
            raised.push(alert(
                now,
                AlertSeverity::Warning,
                "EXCESSIVE_SLIPPAGE",
                format!(
                    "execution {} slipped {:.1}bps (threshold {:.1}bps)",
                    record.execution_id, record.slippage_bps, self.config.slippage_threshold_bps
                ),
                [("execution_id".to_string(), record.execution_id.clone())].into(),
            ));
        }

        if let Some(deviation) = record.vwap_deviation {
            let abs_dev = deviation.abs();
            let critical = self.config.vwap_deviation_threshold * 2.0;
            if abs_dev > critical {
                raised.push(alert(
                    now,
                    AlertSeverity::Critical,
                    "VWAP_DEVIATION",
                    format!("execution {} deviated {:.3}% from vwap", record.execution_id, deviation * 100.0),
                    [("execution_id".to_string(), record.execution_id.clone())].into(),
                ));
            } else if abs_dev > self.config.vwap_deviation_threshold {
                raised.push(alert(
                    now,
                    AlertSeverity::Warning,
                    "VWAP_DEVIATION",
                    format!("execution {} deviated {:.3}% from vwap", record.execution_id, deviation * 100.0),
                    [("execution_id".to_string(), record.execution_id.clone())].into(),
                ));
            }
        }

        if record.duration_minutes > self.config.slow_execution_threshold_minutes as f64 {
            raised.push(alert(
                now,
                AlertSeverity::Warning,
                "SLOW_EXECUTION",
                format!(
                    "execution {} took {:.1} minutes (threshold {})",
                    record.execution_id, record.duration_minutes, self.config.slow_execution_threshold_minutes
                ),
                [("execution_id".to_string(), record.execution_id.clone())].into(),
            ));
        }

        self.failures.push_back(!record.succeeded);
        if self.failures.len() > FAILED_ORDER_WINDOW {
            self.failures.pop_front();
        }
        let failed_count = self.failures.iter().filter(|f| **f).count();
        if failed_count >= self.config.failed_order_threshold {
            raised.push(alert(
                now,
                AlertSeverity::Critical,
                "FAILED_ORDERS",
                format!(
                    "{} failed executions in the last {} ({})",
                    failed_count,
                    self.failures.len(),
                    self.config.failed_order_threshold
                ),
                BTreeMap::new(),
            ));
        }

        self.history.push_back((now, record));
        if self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }

        self.alerts.extend(raised.iter().cloned());
        raised
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Unacknowledged alerts, optionally filtered to a single severity.
    pub fn active_alerts(&self, severity: Option<AlertSeverity>) -> Vec<&Alert> {
        self.alerts
            .iter()
            .filter(|a| !a.acknowledged)
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .collect()
    }

    /// Mark an alert acknowledged by id. Returns whether one was found.
    pub fn acknowledge(&mut self, alert_id: &str) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Roll up one calendar day's executions and alerts. `date` defaults
    /// to `now`'s date when not given.
    pub fn daily_summary(&self, date: Option<NaiveDate>, now: DateTime<Utc>) -> DailySummary {
        let date = date.unwrap_or_else(|| now.date_naive());
        let day_records: Vec<&ExecutionRecord> = self
            .history
            .iter()
            .filter(|(ts, _)| ts.date_naive() == date)
            .map(|(_, r)| r)
            .collect();

        let total_executions = day_records.len();
        let successful_executions = day_records.iter().filter(|r| r.succeeded).count();
        let failed_executions = total_executions - successful_executions;
        let success_rate = if total_executions > 0 {
            successful_executions as f64 / total_executions as f64
        } else {
            0.0
        };
        let alerts_generated = self.alerts.iter().filter(|a| a.timestamp.date_naive() == date).count();

        DailySummary {
            date,
            total_executions,
            successful_executions,
            failed_executions,
            success_rate,
            alerts_generated,
        }
    }

    /// Comprehensive snapshot: today's summary, the last 10 executions,
    /// the success rate over the trailing 50, and active alert counts by
    /// severity.
    pub fn performance_dashboard(&self, now: DateTime<Utc>) -> PerformanceDashboard {
        let today = self.daily_summary(None, now);

        let recent_executions: Vec<ExecutionRecord> =
            self.history.iter().rev().take(10).map(|(_, r)| r.clone()).rev().collect();

        let last_50: Vec<&ExecutionRecord> = self.history.iter().rev().take(50).map(|(_, r)| r).collect();
        let success_rate_last_50 = if last_50.is_empty() {
            0.0
        } else {
            last_50.iter().filter(|r| r.succeeded).count() as f64 / last_50.len() as f64
        };

        PerformanceDashboard {
            today,
            recent_executions,
            success_rate_last_50,
            critical_alerts: self.active_alerts(Some(AlertSeverity::Critical)).len(),
            warning_alerts: self.active_alerts(Some(AlertSeverity::Warning)).len(),
            info_alerts: self.active_alerts(Some(AlertSeverity::Info)).len(),
        }
    }

    /// Drop executions and alerts older than `days_to_keep` relative to `now`.
    pub fn clear_old_data(&mut self, days_to_keep: i64, now: DateTime<Utc>) {
        let cutoff = now - chrono::Duration::days(days_to_keep);
        self.history.retain(|(ts, _)| *ts > cutoff);
        self.alerts.retain(|a| a.timestamp > cutoff);
    }

    /// Quality score over the trailing (up to [`HISTORY_CAP`]) executions:
    /// success rate worth 40 points, slippage worth 30, speed worth 20,
    /// and the alert rate worth up to 10 — all four scaled down to zero
    /// as the underlying metric worsens.
    pub fn quality_score(&self) -> Option<QualityScore> {
        let total = self.history.len();
        if total == 0 {
            return None;
        }

        let successes = self.history.iter().filter(|(_, r)| r.succeeded).count();
        let success_points = 40.0 * successes as f64 / total as f64;

        let avg_slippage_bps = self.history.iter().map(|(_, r)| r.slippage_bps).sum::<f64>() / total as f64;
        let slippage_ratio = if self.config.slippage_threshold_bps > 0.0 {
            avg_slippage_bps / self.config.slippage_threshold_bps
        } else {
            0.0
        };
        let slippage_points = if slippage_ratio <= 1.0 {
            30.0
        } else {
            (30.0 * (2.0 - slippage_ratio)).max(0.0)
        };

        let avg_duration = self.history.iter().map(|(_, r)| r.duration_minutes).sum::<f64>() / total as f64;
        let duration_ratio = if self.config.slow_execution_threshold_minutes > 0 {
            avg_duration / self.config.slow_execution_threshold_minutes as f64
        } else {
            0.0
        };
        let speed_points = (20.0 * (1.0 - duration_ratio)).max(0.0);

        let alert_rate = self.alerts.len() as f64 / total as f64;
        let alert_points = (10.0 - alert_rate * 10.0).max(0.0);

        Some(QualityScore::from_score(
            success_points + slippage_points + speed_points + alert_points,
        ))
    }
}

fn alert(
    now: DateTime<Utc>,
    severity: AlertSeverity,
    kind: &str,
    message: String,
    details: BTreeMap<String, String>,
) -> Alert {
    Alert {
        id: format!("{}-{}", kind.to_lowercase(), now.timestamp_micros()),
        timestamp: now,
        severity,
        kind: kind.to_string(),
        message,
        details,
        acknowledged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    fn record(succeeded: bool, slippage_bps: f64) -> ExecutionRecord {
        ExecutionRecord {
            execution_id: "e1".to_string(),
            succeeded,
            slippage_bps,
            duration_minutes: 5.0,
            vwap_deviation: None,
        }
    }

    #[test]
    fn excessive_slippage_raises_a_warning() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        let alerts = monitor.record_execution(record(true, 50.0), now());
        assert!(alerts.iter().any(|a| a.kind == "EXCESSIVE_SLIPPAGE"));
    }

    #[test]
    fn vwap_deviation_escalates_to_critical_past_double_threshold() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        let mut r = record(true, 0.0);
        r.vwap_deviation = Some(0.03);
        let alerts = monitor.record_execution(r, now());
        let dev = alerts.iter().find(|a| a.kind == "VWAP_DEVIATION").unwrap();
        assert_eq!(dev.severity, AlertSeverity::Critical);
    }

    #[test]
    fn three_failures_in_window_raise_failed_orders_alert() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        monitor.record_execution(record(false, 0.0), now());
        monitor.record_execution(record(false, 0.0), now());
        let alerts = monitor.record_execution(record(false, 0.0), now());
        assert!(alerts.iter().any(|a| a.kind == "FAILED_ORDERS"));
    }

    #[test]
    fn slow_execution_raises_a_warning() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        let mut r = record(true, 0.0);
        r.duration_minutes = 200.0;
        let alerts = monitor.record_execution(r, now());
        assert!(alerts.iter().any(|a| a.kind == "SLOW_EXECUTION"));
    }

    #[test]
    fn perfect_history_scores_an_a() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        for _ in 0..5 {
            monitor.record_execution(record(true, 1.0), now());
        }
        let score = monitor.quality_score().unwrap();
        assert_eq!(score.grade, 'A');
    }

    #[test]
    fn no_history_has_no_score() {
        let monitor = ExecutionMonitor::new(MonitorConfig::default());
        assert!(monitor.quality_score().is_none());
    }

    #[test]
    fn active_alerts_excludes_acknowledged_ones() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        monitor.record_execution(record(true, 50.0), now());
        let id = monitor.alerts()[0].id.clone();

        assert_eq!(monitor.active_alerts(None).len(), 1);
        assert!(monitor.acknowledge(&id));
        assert!(monitor.active_alerts(None).is_empty());
    }

    #[test]
    fn acknowledge_unknown_id_returns_false() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        assert!(!monitor.acknowledge("not-a-real-id"));
    }

    #[test]
    fn active_alerts_filters_by_severity() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        monitor.record_execution(record(true, 50.0), now());
        monitor.record_execution(record(false, 0.0), now());
        monitor.record_execution(record(false, 0.0), now());
        monitor.record_execution(record(false, 0.0), now());

        assert!(monitor.active_alerts(Some(AlertSeverity::Warning)).iter().any(|a| a.kind == "EXCESSIVE_SLIPPAGE"));
        assert!(monitor.active_alerts(Some(AlertSeverity::Critical)).iter().any(|a| a.kind == "FAILED_ORDERS"));
    }

    #[test]
    fn daily_summary_rolls_up_only_matching_executions() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        monitor.record_execution(record(true, 1.0), now());
        monitor.record_execution(record(false, 1.0), now());

        let tomorrow = now() + chrono::Duration::days(1);
        let summary = monitor.daily_summary(None, now());
        assert_eq!(summary.total_executions, 2);
        assert_eq!(summary.successful_executions, 1);
        assert_eq!(summary.failed_executions, 1);
        assert_eq!(summary.success_rate, 0.5);

        let empty = monitor.daily_summary(Some(tomorrow.date_naive()), now());
        assert_eq!(empty.total_executions, 0);
    }

    #[test]
    fn performance_dashboard_aggregates_today_and_recent_history() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        for _ in 0..3 {
            monitor.record_execution(record(true, 1.0), now());
        }
        let dashboard = monitor.performance_dashboard(now());
        assert_eq!(dashboard.today.total_executions, 3);
        assert_eq!(dashboard.recent_executions.len(), 3);
        assert_eq!(dashboard.success_rate_last_50, 1.0);
    }

    #[test]
    fn clear_old_data_drops_entries_past_the_cutoff() {
        let mut monitor = ExecutionMonitor::new(MonitorConfig::default());
        monitor.record_execution(record(true, 1.0), now());
        let later = now() + chrono::Duration::days(40);

        monitor.clear_old_data(30, later);

        assert_eq!(monitor.daily_summary(Some(now().date_naive()), now()).total_executions, 0);
        assert!(monitor.alerts().is_empty());
    }
}
