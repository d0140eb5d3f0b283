use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Id;

/// Display format of comment timestamps (day/month/year, 24h clock).
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Frozen clock for tests; `advance` moves it forward.
#[derive(Debug, Clone)]
pub struct FixedClock {
    millis: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn at_millis(millis: i64) -> Self {
        Self { millis: Arc::new(AtomicI64::new(millis)) }
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::SeqCst))
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// Raw creation time in ms. Two creations within the same millisecond
    /// produce the same id.
    Timestamp,
    /// Creation time in ms, bumped past the last issued id when it would
    /// not be strictly greater.
    #[default]
    Monotonic,
}

impl std::str::FromStr for IdStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(IdStrategy::Timestamp),
            "monotonic" => Ok(IdStrategy::Monotonic),
            other => Err(format!("unknown id strategy '{other}'")),
        }
    }
}

/// Every id up to `i64::MAX` is already taken.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("id space exhausted after {0}")]
pub struct IdsExhausted(pub Id);

/// Mints ids and human readable timestamps from one clock.
#[derive(Clone)]
pub struct IdGenerator {
    clock: Arc<dyn Clock>,
    strategy: IdStrategy,
    last: Arc<AtomicI64>,
}

impl IdGenerator {
    pub fn new(clock: Arc<dyn Clock>, strategy: IdStrategy) -> Self {
        Self { clock, strategy, last: Arc::new(AtomicI64::new(i64::MIN)) }
    }

    pub fn system(strategy: IdStrategy) -> Self {
        Self::new(Arc::new(SystemClock), strategy)
    }

    pub fn strategy(&self) -> IdStrategy { self.strategy }

    pub fn next_id(&self) -> Result<Id, IdsExhausted> {
        let now = self.clock.now().timestamp_millis();
        match self.strategy {
            IdStrategy::Timestamp => Ok(now),
            IdStrategy::Monotonic => {
                let step = |last: Id| if now > last { Some(now) } else { last.checked_add(1) };
                self.last
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, step)
                    .map_err(IdsExhausted)
                    .and_then(|prev| step(prev).ok_or(IdsExhausted(prev)))
            }
        }
    }

    /// Keeps monotonic ids ahead of ids already present after a load.
    pub fn observe(&self, id: Id) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }

    pub fn timestamp(&self) -> String {
        self.clock.now().with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
    }
}

impl Default for IdGenerator {
    fn default() -> Self { Self::system(IdStrategy::default()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_ids_collide_within_one_millisecond() {
        let clock = FixedClock::at_millis(1_700_000_000_000);
        let ids = IdGenerator::new(Arc::new(clock.clone()), IdStrategy::Timestamp);
        let a = ids.next_id().unwrap();
        let b = ids.next_id().unwrap();
        assert_eq!(a, b, "timestamp ids are only as unique as the clock");
        clock.advance(1);
        assert_eq!(ids.next_id().unwrap(), a + 1);
    }

    #[test]
    fn monotonic_ids_never_repeat() {
        let clock = FixedClock::at_millis(1_700_000_000_000);
        let ids = IdGenerator::new(Arc::new(clock.clone()), IdStrategy::Monotonic);
        let a = ids.next_id().unwrap();
        let b = ids.next_id().unwrap();
        let c = ids.next_id().unwrap();
        assert_eq!(a, 1_700_000_000_000);
        assert!(a < b && b < c);
        // clock catching up does not reuse ids
        clock.advance(1);
        assert!(ids.next_id().unwrap() > c);
    }

    #[test]
    fn observe_moves_past_loaded_ids() {
        let ids = IdGenerator::new(Arc::new(FixedClock::at_millis(10)), IdStrategy::Monotonic);
        ids.observe(500);
        assert_eq!(ids.next_id().unwrap(), 501);
    }

    #[test]
    fn monotonic_ids_stop_at_the_top_of_the_range() {
        let ids = IdGenerator::new(Arc::new(FixedClock::at_millis(10)), IdStrategy::Monotonic);
        ids.observe(i64::MAX - 1);
        assert_eq!(ids.next_id(), Ok(i64::MAX));
        assert_eq!(ids.next_id(), Err(IdsExhausted(i64::MAX)));
        assert_eq!(ids.next_id(), Err(IdsExhausted(i64::MAX)));
    }

    #[test]
    fn timestamps_are_not_empty() {
        assert!(!IdGenerator::default().timestamp().is_empty());
    }
}
