//! IdGenerator port.
//!
//! Ids are ULIDs: sortable by creation time and unique without coordination.
//! The timestamp part comes from a `Clock`, so a `FixedClock` gives ids with a
//! predictable prefix.

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> JobId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate(&self) -> JobId {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generated_job_ids_do_not_repeat() {
        let ids = UlidGenerator::new(SystemClock);
        let seen: HashSet<JobId> = (0..1_000).map(|_| ids.generate()).collect();
        assert_eq!(seen.len(), 1_000);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let at = Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap();
        let ids = UlidGenerator::new(FixedClock::new(at));

        let first = ids.generate();
        let second = ids.generate();
        assert_ne!(first, second);

        for id in [&first, &second] {
            let ulid = Ulid::from_string(id.as_str()).unwrap();
            assert_eq!(ulid.timestamp_ms(), at.timestamp_millis() as u64);
        }
    }
}
