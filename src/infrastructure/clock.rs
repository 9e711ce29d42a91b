use crate::domain::ports::Clock;
use chrono::{DateTime, Utc};

/// Wall-clock time source used outside of tests.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
