use chrono::{DateTime, TimeZone, Utc};
use qtx_config::BreakerConfig;
use qtx_risk::{BreakerError, CircuitBreaker};
use qtx_schemas::{BreakerKind, Micros};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap()
}

fn config() -> BreakerConfig {
    BreakerConfig {
        daily_loss_limit: 0.03,
        ..BreakerConfig::default()
    }
}

#[test]
fn scenario_daily_loss_breaker_trip() {
    let mut cb = CircuitBreaker::new(config(), now(), Micros::from_f64(100_000.0));

    // A 3.001% drop from the 100,000 start-of-day value breaches the
    // 3% daily loss limit.
    let result = cb.check(now(), Micros::from_f64(96_999.0), None);
    assert!(!result.allowed);
    assert!(result.tripped.contains(&BreakerKind::DailyLoss));
    assert!(result.reasons.iter().any(|r| r.contains("daily loss limit")));

    let wrong = cb.reset(BreakerKind::DailyLoss, "WRONG", "manual review");
    assert_eq!(wrong, Err(BreakerError::WrongConfirmationCode));
    assert!(cb.is_tripped(BreakerKind::DailyLoss));

    let code = cb
        .status()
        .get(&BreakerKind::DailyLoss)
        .unwrap()
        .confirmation_code
        .clone()
        .expect("trip always records a confirmation code");

    cb.reset(BreakerKind::DailyLoss, &code, "manual review").unwrap();
    assert!(!cb.is_tripped(BreakerKind::DailyLoss));
}
