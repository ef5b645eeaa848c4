//! Global trading circuit breaker.
//!
//! Six independent breaker kinds ([`BreakerKind`]), each ARMED or
//! TRIPPED. [`CircuitBreaker::check`] evaluates all of them against the
//! current portfolio value and returns a single allow/deny verdict plus
//! any warnings at 80-90% of a threshold. Tripping is one-way except
//! through [`CircuitBreaker::reset`] (exact confirmation code match) or
//! the automatic day/cooldown reset eligible kinds.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use qtx_config::BreakerConfig;
use qtx_schemas::{Alert, AlertSeverity, BreakerKind, BreakerState, Micros, TradeRecord};
use rand::RngCore;
use sha2::{Digest, Sha256};

const RECENT_TRADES_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerError {
    WrongConfirmationCode,
    NotTripped,
}

impl std::fmt::Display for BreakerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerError::WrongConfirmationCode => write!(f, "confirmation code does not match"),
            BreakerError::NotTripped => write!(f, "breaker is not tripped"),
        }
    }
}

impl std::error::Error for BreakerError {}

/// Outcome of one [`CircuitBreaker::check`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub allowed: bool,
    pub tripped: Vec<BreakerKind>,
    pub reasons: Vec<String>,
    pub warnings: Vec<Alert>,
}

impl CheckResult {
    fn fail_safe(reason: impl Into<String>) -> Self {
        CheckResult {
            allowed: false,
            tripped: Vec::new(),
            reasons: vec![reason.into()],
            warnings: Vec::new(),
        }
    }
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    states: BTreeMap<BreakerKind, BreakerState>,

    current_day: Option<NaiveDate>,
    day_start_value: Micros,
    peak_value: Micros,
    portfolio_history: VecDeque<(DateTime<Utc>, Micros)>,

    consecutive_wins: u32,
    consecutive_losses: u32,
    total_trades: u32,
    recent_trades: VecDeque<TradeRecord>,

    volatility_tripped_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, now: DateTime<Utc>, initial_value: Micros) -> Self {
        let mut states = BTreeMap::new();
        for kind in BreakerKind::ALL {
            states.insert(kind, BreakerState::armed(kind));
        }

        CircuitBreaker {
            config,
            states,
            current_day: Some(now.date_naive()),
            day_start_value: initial_value,
            peak_value: initial_value,
            portfolio_history: VecDeque::new(),
            consecutive_wins: 0,
            consecutive_losses: 0,
            total_trades: 0,
            recent_trades: VecDeque::new(),
            volatility_tripped_at: None,
        }
    }

    pub fn status(&self) -> &BTreeMap<BreakerKind, BreakerState> {
        &self.states
    }

    pub fn is_tripped(&self, kind: BreakerKind) -> bool {
        self.states.get(&kind).map(|s| s.tripped).unwrap_or(false)
    }

    pub fn any_tripped(&self) -> bool {
        self.states.values().any(|s| s.tripped)
    }

    /// Current high-water mark used as the drawdown baseline.
    pub fn peak_value(&self) -> Micros {
        self.peak_value
    }

    /// Manual entry point for raising the peak outside of `record_portfolio_value`,
    /// e.g. when a caller learns of a mark-to-market high between samples.
    /// Monotonic: a value at or below the current peak is a no-op.
    pub fn update_peak_portfolio_value(&mut self, value: Micros) {
        if value.raw() > self.peak_value.raw() {
            self.peak_value = value;
        }
    }

    /// Record a closed trade's outcome, updating streak counters and the
    /// bounded recent-trades history.
    pub fn record_trade(&mut self, trade: TradeRecord) {
        self.total_trades += 1;
        if trade.pnl.raw() < 0 {
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        } else if trade.pnl.raw() > 0 {
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        }

        self.recent_trades.push_back(trade);
        if self.recent_trades.len() > RECENT_TRADES_CAP {
            self.recent_trades.pop_front();
        }
    }

    /// Feed a portfolio value sample, maintaining the peak and the
    /// rapid-drawdown trailing-window history, and rolling `DAILY_LOSS`
    /// over at the local date boundary.
    pub fn record_portfolio_value(&mut self, now: DateTime<Utc>, value: Micros) {
        let today = now.date_naive();
        if self.current_day != Some(today) {
            self.current_day = Some(today);
            self.day_start_value = value;
            self.auto_reset(BreakerKind::DailyLoss, now);
        }

        if value.raw() > self.peak_value.raw() {
            self.peak_value = value;
        }

        self.portfolio_history.push_back((now, value));
        let window = chrono::Duration::minutes(self.config.rapid_drawdown_window_minutes * 2);
        while let Some((ts, _)) = self.portfolio_history.front() {
            if now.signed_duration_since(*ts) > window {
                self.portfolio_history.pop_front();
            } else {
                break;
            }
        }

        self.check_volatility_auto_reset(now);
    }

    /// Evaluate every breaker kind against `current_value` (and an
    /// optional VIX reading) and return a single verdict.
    ///
    /// Fail-safe: a negative or non-finite `current_value` halts
    /// trading immediately without evaluating the individual breakers.
    pub fn check(&mut self, now: DateTime<Utc>, current_value: Micros, vix: Option<f64>) -> CheckResult {
        if current_value.raw() < 0 {
            return CheckResult::fail_safe("FAIL-SAFE halt: negative portfolio value");
        }

        self.record_portfolio_value(now, current_value);

        let mut tripped = Vec::new();
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        self.check_daily_loss(now, current_value, &mut tripped, &mut reasons, &mut warnings);
        self.check_max_drawdown(now, current_value, &mut tripped, &mut reasons, &mut warnings);
        self.check_consecutive_losses(now, &mut tripped, &mut reasons, &mut warnings);
        if let Some(vix) = vix {
            self.check_volatility(now, vix, &mut tripped, &mut reasons, &mut warnings);
        }
        self.check_rapid_drawdown(now, current_value, &mut tripped, &mut reasons, &mut warnings);

        CheckResult {
            allowed: tripped.is_empty(),
            tripped,
            reasons,
            warnings,
        }
    }

    /// Operator-invoked trip, bypassing threshold evaluation.
    pub fn manual_trip(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> String {
        self.trip(BreakerKind::Manual, reason.into(), now)
    }

    /// Reset a tripped breaker. `CONSECUTIVE_LOSSES` additionally zeros
    /// its counter.
    pub fn reset(
        &mut self,
        kind: BreakerKind,
        confirmation_code: &str,
        reason: impl Into<String>,
    ) -> Result<(), BreakerError> {
        let state = self.states.get_mut(&kind).ok_or(BreakerError::NotTripped)?;
        if !state.tripped {
            return Err(BreakerError::NotTripped);
        }
        if state.confirmation_code.as_deref() != Some(confirmation_code) {
            return Err(BreakerError::WrongConfirmationCode);
        }

        *state = BreakerState::armed(kind);
        state.reason = Some(reason.into());

        if kind == BreakerKind::ConsecutiveLosses {
            self.consecutive_losses = 0;
        }
        Ok(())
    }

    fn trip(&mut self, kind: BreakerKind, reason: String, now: DateTime<Utc>) -> String {
        let code = confirmation_code(kind, now);
        let state = self.states.entry(kind).or_insert_with(|| BreakerState::armed(kind));
        state.tripped = true;
        state.tripped_at = Some(now);
        state.reason = Some(reason);
        state.confirmation_code = Some(code.clone());
        code
    }

    fn auto_reset(&mut self, kind: BreakerKind, now: DateTime<Utc>) {
        if let Some(state) = self.states.get_mut(&kind) {
            if state.tripped {
                *state = BreakerState::armed(kind);
                state.reason = Some("auto-reset".to_string());
            }
        }
        if kind == BreakerKind::VolatilitySpike {
            self.volatility_tripped_at = None;
        }
        let _ = now;
    }

    fn check_volatility_auto_reset(&mut self, now: DateTime<Utc>) {
        if let Some(tripped_at) = self.volatility_tripped_at {
            let cooldown = chrono::Duration::hours(self.config.auto_reset_hours);
            if now.signed_duration_since(tripped_at) >= cooldown {
                self.auto_reset(BreakerKind::VolatilitySpike, now);
            }
        }
    }

    fn check_daily_loss(
        &mut self,
        now: DateTime<Utc>,
        current_value: Micros,
        tripped: &mut Vec<BreakerKind>,
        reasons: &mut Vec<String>,
        warnings: &mut Vec<Alert>,
    ) {
        if self.day_start_value.raw() <= 0 {
            return;
        }
        let loss_fraction = fraction_drop(self.day_start_value, current_value);
        evaluate_threshold(
            BreakerKind::DailyLoss,
            loss_fraction,
            self.config.daily_loss_limit,
            "daily loss limit breached",
            self,
            now,
            tripped,
            reasons,
            warnings,
        );
    }

    fn check_max_drawdown(
        &mut self,
        now: DateTime<Utc>,
        current_value: Micros,
        tripped: &mut Vec<BreakerKind>,
        reasons: &mut Vec<String>,
        warnings: &mut Vec<Alert>,
    ) {
        if self.peak_value.raw() <= 0 {
            return;
        }
        let drawdown_fraction = fraction_drop(self.peak_value, current_value);
        evaluate_threshold(
            BreakerKind::MaxDrawdown,
            drawdown_fraction,
            self.config.max_drawdown_limit,
            "max drawdown limit breached",
            self,
            now,
            tripped,
            reasons,
            warnings,
        );
    }

    fn check_consecutive_losses(
        &mut self,
        now: DateTime<Utc>,
        tripped: &mut Vec<BreakerKind>,
        reasons: &mut Vec<String>,
        warnings: &mut Vec<Alert>,
    ) {
        let limit = self.config.consecutive_loss_limit;
        if limit == 0 {
            return;
        }
        let ratio = self.consecutive_losses as f64 / limit as f64;
        if self.consecutive_losses >= limit {
            self.trip_and_record(
                BreakerKind::ConsecutiveLosses,
                format!("{} consecutive losing trades >= limit {limit}", self.consecutive_losses),
                now,
                tripped,
                reasons,
            );
        } else if ratio >= 0.8 {
            warnings.push(warning_alert(
                BreakerKind::ConsecutiveLosses,
                now,
                format!("{}/{} consecutive losses", self.consecutive_losses, limit),
            ));
        }
    }

    fn check_volatility(
        &mut self,
        now: DateTime<Utc>,
        vix: f64,
        tripped: &mut Vec<BreakerKind>,
        reasons: &mut Vec<String>,
        warnings: &mut Vec<Alert>,
    ) {
        let threshold = self.config.volatility_threshold;
        if threshold <= 0.0 {
            return;
        }
        if vix >= threshold {
            self.volatility_tripped_at = Some(now);
            self.trip_and_record(
                BreakerKind::VolatilitySpike,
                format!("VIX {vix} >= threshold {threshold}"),
                now,
                tripped,
                reasons,
            );
        } else if vix / threshold >= 0.9 {
            warnings.push(warning_alert(
                BreakerKind::VolatilitySpike,
                now,
                format!("VIX {vix} approaching threshold {threshold}"),
            ));
        }
    }

    fn check_rapid_drawdown(
        &mut self,
        now: DateTime<Utc>,
        current_value: Micros,
        tripped: &mut Vec<BreakerKind>,
        reasons: &mut Vec<String>,
        warnings: &mut Vec<Alert>,
    ) {
        let window = chrono::Duration::minutes(self.config.rapid_drawdown_window_minutes);
        let window_start = now - window;
        let window_peak = self
            .portfolio_history
            .iter()
            .filter(|(ts, _)| *ts >= window_start)
            .map(|(_, v)| v.raw())
            .max();

        let Some(window_peak) = window_peak else {
            return;
        };
        if window_peak <= 0 {
            return;
        }
        let drop_fraction = fraction_drop(Micros::new(window_peak), current_value);
        evaluate_threshold(
            BreakerKind::RapidDrawdown,
            drop_fraction,
            self.config.rapid_drawdown_limit,
            "rapid drawdown limit breached",
            self,
            now,
            tripped,
            reasons,
            warnings,
        );
    }

    fn trip_and_record(
        &mut self,
        kind: BreakerKind,
        reason: String,
        now: DateTime<Utc>,
        tripped: &mut Vec<BreakerKind>,
        reasons: &mut Vec<String>,
    ) {
        if self.is_tripped(kind) {
            tripped.push(kind);
            reasons.push(reason);
            return;
        }
        self.trip(kind, reason.clone(), now);
        tripped.push(kind);
        reasons.push(reason);
    }
}

fn fraction_drop(reference: Micros, current: Micros) -> f64 {
    (reference.to_f64() - current.to_f64()) / reference.to_f64()
}

#[allow(clippy::too_many_arguments)]
fn evaluate_threshold(
    kind: BreakerKind,
    fraction: f64,
    limit: f64,
    message: &str,
    breaker: &mut CircuitBreaker,
    now: DateTime<Utc>,
    tripped: &mut Vec<BreakerKind>,
    reasons: &mut Vec<String>,
    warnings: &mut Vec<Alert>,
) {
    if limit <= 0.0 {
        return;
    }
    if fraction >= limit {
        breaker.trip_and_record(kind, message.to_string(), now, tripped, reasons);
    } else if fraction / limit >= 0.8 {
        warnings.push(warning_alert(
            kind,
            now,
            format!("{:.2}% toward {message} ({:.1}% of limit)", fraction * 100.0, fraction / limit * 100.0),
        ));
    }
}

fn warning_alert(kind: BreakerKind, now: DateTime<Utc>, message: String) -> Alert {
    Alert {
        id: format!("{kind}-{}", now.timestamp_millis()),
        timestamp: now,
        severity: AlertSeverity::Warning,
        kind: kind.to_string(),
        message,
        details: Default::default(),
        acknowledged: false,
    }
}

/// `sha256(f"{kind}:{timestamp}:{salt}")[:16]`, uppercased.
fn confirmation_code(kind: BreakerKind, now: DateTime<Utc>) -> String {
    let mut salt = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut salt);
    let payload = format!("{kind}:{}:{}", now.timestamp_micros(), hex::encode(salt));
    let digest = Sha256::digest(payload.as_bytes());
    hex::encode(digest)[..16].to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
    }

    fn config() -> BreakerConfig {
        BreakerConfig {
            daily_loss_limit: 0.03,
            max_drawdown_limit: 0.10,
            consecutive_loss_limit: 3,
            volatility_threshold: 40.0,
            rapid_drawdown_limit: 0.05,
            rapid_drawdown_window_minutes: 60,
            auto_reset_hours: 24,
        }
    }

    #[test]
    fn fresh_breaker_is_fully_armed() {
        let cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        assert!(!cb.any_tripped());
        assert_eq!(cb.status().len(), 6);
    }

    #[test]
    fn daily_loss_trips_when_threshold_breached() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        let result = cb.check(now(), Micros::from_f64(96_000.0), None);
        assert!(!result.allowed);
        assert!(result.tripped.contains(&BreakerKind::DailyLoss));
        assert!(cb.is_tripped(BreakerKind::DailyLoss));
    }

    #[test]
    fn warning_emitted_before_trip_threshold() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        // 2.5% drop is 83% of the 3% daily loss limit: a warning, not a trip.
        let result = cb.check(now(), Micros::from_f64(97_500.0), None);
        assert!(result.allowed);
        assert!(result.warnings.iter().any(|a| a.kind == "daily_loss"));
    }

    #[test]
    fn fail_safe_on_negative_portfolio_value() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        let result = cb.check(now(), Micros::new(-1), None);
        assert!(!result.allowed);
        assert!(result.reasons[0].contains("FAIL-SAFE"));
    }

    #[test]
    fn consecutive_losses_trip_at_limit() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        for _ in 0..3 {
            cb.record_trade(TradeRecord {
                symbol: "AAPL".to_string(),
                pnl: Micros::from_f64(-10.0),
                opened_at: now(),
                closed_at: now(),
                entry_price: Micros::from_f64(100.0),
                exit_price: Micros::from_f64(90.0),
            });
        }
        let result = cb.check(now(), Micros::from_f64(100_000.0), None);
        assert!(result.tripped.contains(&BreakerKind::ConsecutiveLosses));
    }

    #[test]
    fn wrong_confirmation_code_is_rejected() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        cb.check(now(), Micros::from_f64(96_000.0), None);
        let err = cb.reset(BreakerKind::DailyLoss, "WRONGCODE00000000", "operator override");
        assert_eq!(err, Err(BreakerError::WrongConfirmationCode));
        assert!(cb.is_tripped(BreakerKind::DailyLoss));
    }

    #[test]
    fn correct_confirmation_code_resets() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        cb.check(now(), Micros::from_f64(96_000.0), None);
        let code = cb
            .status()
            .get(&BreakerKind::DailyLoss)
            .unwrap()
            .confirmation_code
            .clone()
            .unwrap();

        cb.reset(BreakerKind::DailyLoss, &code, "operator override").unwrap();
        assert!(!cb.is_tripped(BreakerKind::DailyLoss));
    }

    #[test]
    fn new_day_auto_resets_daily_loss() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        cb.check(now(), Micros::from_f64(96_000.0), None);
        assert!(cb.is_tripped(BreakerKind::DailyLoss));

        let tomorrow = now() + chrono::Duration::days(1);
        cb.record_portfolio_value(tomorrow, Micros::from_f64(96_000.0));
        assert!(!cb.is_tripped(BreakerKind::DailyLoss));
    }

    #[test]
    fn manual_trip_does_not_need_threshold_breach() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        cb.manual_trip("operator halted trading", now());
        assert!(cb.is_tripped(BreakerKind::Manual));
    }

    #[test]
    fn peak_value_is_non_decreasing_across_manual_updates() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        assert_eq!(cb.peak_value(), Micros::from_f64(100_000.0));

        cb.update_peak_portfolio_value(Micros::from_f64(110_000.0));
        assert_eq!(cb.peak_value(), Micros::from_f64(110_000.0));

        cb.update_peak_portfolio_value(Micros::from_f64(95_000.0));
        assert_eq!(cb.peak_value(), Micros::from_f64(110_000.0));
    }

    #[test]
    fn record_portfolio_value_and_manual_update_share_the_same_peak() {
        let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));
        cb.record_portfolio_value(now(), Micros::from_f64(105_000.0));
        assert_eq!(cb.peak_value(), Micros::from_f64(105_000.0));

        cb.update_peak_portfolio_value(Micros::from_f64(120_000.0));
        cb.record_portfolio_value(now(), Micros::from_f64(90_000.0));
        assert_eq!(cb.peak_value(), Micros::from_f64(120_000.0));
    }
}
