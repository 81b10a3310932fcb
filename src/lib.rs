pub mod agent;
pub mod checksum;
pub mod error;
pub mod metric;
pub mod prom_metrics;
pub mod repository;
pub mod server;
pub mod snapshot;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock a mutex, recovering from poisoning.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse an interval given either as a humantime string (`10s`, `1m30s`) or
/// as a bare number of seconds (`10`). `0` is valid and means "synchronous"
/// where the setting supports it.
pub fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid interval '{}': {}", s, e))
}

/// [`parse_interval`] for periods that drive a ticker, where zero is invalid.
pub fn parse_period(s: &str) -> Result<Duration, String> {
    let period = parse_interval(s)?;
    if period.is_zero() {
        return Err(format!("invalid interval '{}': must be greater than zero", s.trim()));
    }
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_interval_accepts_bare_seconds() {
        assert_eq!(parse_interval("300").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_interval_accepts_humantime() {
        assert_eq!(parse_interval("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_interval("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_interval("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn parse_interval_rejects_garbage() {
        assert!(parse_interval("soon").is_err());
        assert!(parse_interval("-5").is_err());
    }

    #[test]
    fn parse_period_rejects_zero() {
        assert!(parse_period("0").unwrap_err().contains("greater than zero"));
        assert!(parse_period("0s").is_err());
        assert_eq!(parse_period("2s").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn lock_or_recover_survives_poison() {
        let m = std::sync::Arc::new(Mutex::new(1));
        let poisoner = std::sync::Arc::clone(&m);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(m.is_poisoned());
        *lock_or_recover(&m) += 1;
        assert_eq!(*lock_or_recover(&m), 2);
    }
}
