//! Timeout validation shared by `request`-style calls (§8 boundary: `timeout`
//! <= 0 or > 5 minutes is rejected).

use crate::error::CoreError;
use std::time::Duration;

pub const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub fn validate_timeout(timeout: Duration) -> Result<Duration, CoreError> {
    if timeout.is_zero() {
        return Err(CoreError::InvalidTimeout("timeout must be > 0".into()));
    }
    if timeout > MAX_TIMEOUT {
        return Err(CoreError::InvalidTimeout(format!(
            "timeout {:?} exceeds maximum of {:?}",
            timeout, MAX_TIMEOUT
        )));
    }
    Ok(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero() {
        assert!(validate_timeout(Duration::ZERO).is_err());
    }

    #[test]
    fn accepts_exactly_five_minutes() {
        assert!(validate_timeout(MAX_TIMEOUT).is_ok());
    }

    #[test]
    fn rejects_over_five_minutes() {
        assert!(validate_timeout(MAX_TIMEOUT + Duration::from_millis(1)).is_err());
    }
}
