use chrono::{DateTime, SubsecRound, Utc};

pub trait Clock {
    /// Current time, truncated to microseconds so it survives a Postgres round trip.
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone)]
pub struct SystemClock {}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn system_clock_has_microsecond_precision() {
        let now = SystemClock {}.now();
        assert_eq!(now.nanosecond() % 1_000, 0);
    }
}
