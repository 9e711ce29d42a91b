//! Bounded, two-tier in-memory store of observed market values.
//!
//! The minutely tier holds coin-pair values in one-day buckets of 1440 slots;
//! the daily tier holds marketcap values in one-year buckets of 366 slots.
//! A slot holding 0.0 means "unobserved", which is why a real cached value
//! must never be exactly zero. Eviction is capacity-driven LRU per tier,
//! never time-based.

use crate::domain::errors::CacheError;
use crate::domain::types::{Operand, Tick};
use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

pub const MINUTELY_SLOTS: usize = 1440;
pub const DAILY_SLOTS: usize = 366;

pub const DEFAULT_MINUTELY_CAPACITY: usize = 128;
pub const DEFAULT_DAILY_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Minutely,
    Daily,
}

impl Granularity {
    fn interval_secs(self) -> i64 {
        match self {
            Granularity::Minutely => 60,
            Granularity::Daily => 86_400,
        }
    }

    fn slots_per_bucket(self) -> usize {
        match self {
            Granularity::Minutely => MINUTELY_SLOTS,
            Granularity::Daily => DAILY_SLOTS,
        }
    }

    /// Start of the bucket containing `ts`: midnight of the UTC day for
    /// minutely data, January 1st of the UTC year for daily data.
    fn bucket_start(self, ts: i64) -> i64 {
        match self {
            Granularity::Minutely => ts - ts.rem_euclid(86_400),
            Granularity::Daily => {
                let year = Utc
                    .timestamp_opt(ts, 0)
                    .single()
                    .map(|dt| dt.year())
                    .unwrap_or(1970);
                NaiveDate::from_ymd_opt(year, 1, 1)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc().timestamp())
                    .unwrap_or(0)
            }
        }
    }
}

#[derive(Debug)]
struct Bucket {
    slots: Vec<f64>,
    last_used: u64,
}

#[derive(Debug)]
struct Tier {
    granularity: Granularity,
    capacity: usize,
    counter: u64,
    buckets: HashMap<(String, i64), Bucket>,
}

impl Tier {
    fn new(granularity: Granularity, capacity: usize) -> Self {
        Self {
            granularity,
            capacity: capacity.max(1),
            counter: 0,
            buckets: HashMap::new(),
        }
    }

    fn validate(&self, ticks: &[Tick]) -> Result<(), CacheError> {
        let interval = self.granularity.interval_secs();
        let first = ticks.first().ok_or(CacheError::EmptyInput)?;
        if first.timestamp <= 0 || first.timestamp % interval != 0 {
            return Err(CacheError::MisalignedTimestamp {
                timestamp: first.timestamp,
                interval_secs: interval,
            });
        }
        let mut expected = first.timestamp;
        for tick in ticks {
            if tick.value == 0.0 {
                return Err(CacheError::ZeroValue {
                    timestamp: tick.timestamp,
                });
            }
            if tick.timestamp != expected {
                return Err(CacheError::NonContiguousTimestamp {
                    expected,
                    actual: tick.timestamp,
                });
            }
            expected += interval;
        }
        Ok(())
    }

    fn put(&mut self, operand_key: &str, ticks: &[Tick]) -> Result<(), CacheError> {
        // Validate the whole batch before touching any bucket so a failed put
        // leaves the cache unchanged.
        self.validate(ticks)?;

        let interval = self.granularity.interval_secs();
        for tick in ticks {
            let bucket_start = self.granularity.bucket_start(tick.timestamp);
            let index = ((tick.timestamp - bucket_start) / interval) as usize;
            let bucket = self.bucket_mut(operand_key, bucket_start);
            bucket.slots[index] = tick.value;
        }
        Ok(())
    }

    fn get(&mut self, operand_key: &str, from_ts: i64) -> Option<Vec<Tick>> {
        let interval = self.granularity.interval_secs();
        // Normalize up to the next exact boundary.
        let rem = from_ts.rem_euclid(interval);
        let start = if rem == 0 { from_ts } else { from_ts - rem + interval };

        let bucket_start = self.granularity.bucket_start(start);
        let key = (operand_key.to_string(), bucket_start);
        let counter = self.next_use();
        let bucket = self.buckets.get_mut(&key)?;
        bucket.last_used = counter;

        let mut index = ((start - bucket_start) / interval) as usize;
        let mut run = Vec::new();
        let mut ts = start;
        // The run never crosses the bucket boundary, even if the next bucket
        // continues contiguously.
        while index < bucket.slots.len() && bucket.slots[index] != 0.0 {
            run.push(Tick {
                timestamp: ts,
                value: bucket.slots[index],
            });
            index += 1;
            ts += interval;
        }
        if run.is_empty() { None } else { Some(run) }
    }

    fn bucket_mut(&mut self, operand_key: &str, bucket_start: i64) -> &mut Bucket {
        let key = (operand_key.to_string(), bucket_start);
        if !self.buckets.contains_key(&key) && self.buckets.len() >= self.capacity {
            self.evict_least_recently_used();
        }
        let counter = self.next_use();
        let slots = self.granularity.slots_per_bucket();
        let bucket = self.buckets.entry(key).or_insert_with(|| Bucket {
            slots: vec![0.0; slots],
            last_used: 0,
        });
        bucket.last_used = counter;
        bucket
    }

    fn evict_least_recently_used(&mut self) {
        if let Some(key) = self
            .buckets
            .iter()
            .min_by_key(|(_, bucket)| bucket.last_used)
            .map(|(key, _)| key.clone())
        {
            self.buckets.remove(&key);
        }
    }

    fn next_use(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

/// Thread-safe two-tier tick cache, shared by every market iterator.
pub struct TickCache {
    minutely: RwLock<Tier>,
    daily: RwLock<Tier>,
}

impl TickCache {
    pub fn new(minutely_capacity: usize, daily_capacity: usize) -> Self {
        Self {
            minutely: RwLock::new(Tier::new(Granularity::Minutely, minutely_capacity)),
            daily: RwLock::new(Tier::new(Granularity::Daily, daily_capacity)),
        }
    }

    /// Store a strictly contiguous, aligned, non-zero batch of ticks.
    /// Fails without mutating state on any violation.
    pub fn put(&self, operand: &Operand, ticks: &[Tick]) -> Result<(), CacheError> {
        let tier = self.tier_for(operand).ok_or(CacheError::UnsupportedOperand)?;
        lock_write(tier).put(&operand.to_string(), ticks)
    }

    /// Contiguous non-zero run starting at the boundary at or after
    /// `from_ts`, or `None` on a miss. A miss is the expected trigger for the
    /// provider-fallback path, not an error.
    pub fn get(&self, operand: &Operand, from_ts: i64) -> Option<Vec<Tick>> {
        let tier = self.tier_for(operand)?;
        lock_write(tier).get(&operand.to_string(), from_ts)
    }

    fn tier_for(&self, operand: &Operand) -> Option<&RwLock<Tier>> {
        match operand {
            Operand::Coin { .. } => Some(&self.minutely),
            Operand::MarketCap { .. } => Some(&self.daily),
            Operand::Number(_) => None,
        }
    }
}

impl Default for TickCache {
    fn default() -> Self {
        Self::new(DEFAULT_MINUTELY_CAPACITY, DEFAULT_DAILY_CAPACITY)
    }
}

fn lock_write(lock: &RwLock<Tier>) -> RwLockWriteGuard<'_, Tier> {
    // A poisoned lock only means another thread panicked mid-operation; the
    // tick data itself is still structurally valid.
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
