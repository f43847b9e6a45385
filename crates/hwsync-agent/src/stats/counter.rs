//! Monotonic hardware counters with SUM and RATE derivation.

use chrono::{DateTime, TimeZone, Utc};
use log::warn;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

/// Samples kept for the RATE window.
pub const DEFAULT_RATE_WINDOW: usize = 60;

/// Exported view of one counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterSnapshot {
    pub name: String,
    pub sum: u64,
    pub rate: f64,
    pub last_value: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Series {
    last_value: Option<u64>,
    last_updated: Option<i64>,
    sum: u64,
    /// (second, running sum) pairs, oldest first.
    window: VecDeque<(i64, u64)>,
    capacity: usize,
}

impl Series {
    fn record(&mut self, now: i64, value: u64) -> bool {
        if let Some(prev_ts) = self.last_updated {
            if now < prev_ts {
                return false;
            }
        }

        if let Some(prev) = self.last_value {
            // A value below the previous one means the hardware counter was
            // reset; everything counted since then is new.
            let delta = if value >= prev { value - prev } else { value };
            self.sum = self.sum.saturating_add(delta);
        }

        self.last_value = Some(value);
        self.last_updated = Some(now);

        match self.window.back_mut() {
            Some(last) if last.0 == now => last.1 = self.sum,
            _ => self.window.push_back((now, self.sum)),
        }
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        true
    }

    fn rate(&self) -> f64 {
        match (self.window.front(), self.window.back()) {
            (Some(first), Some(last)) if last.0 > first.0 => {
                (last.1 - first.1) as f64 / (last.0 - first.0) as f64
            }
            _ => 0.0,
        }
    }
}

/// A cumulative counter read from hardware.
///
/// The first sample sets the baseline. Later samples add their increase to
/// the SUM. Timestamps have second granularity; samples older than the last
/// one are ignored. The series has its own lock so values can be updated
/// while the owning registry is only read-locked.
#[derive(Debug)]
pub struct MonotonicCounter {
    name: String,
    series: Mutex<Series>,
}

impl MonotonicCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_window(name, DEFAULT_RATE_WINDOW)
    }

    pub fn with_window(name: impl Into<String>, window: usize) -> Self {
        let capacity = window.max(2);
        Self {
            name: name.into(),
            series: Mutex::new(Series {
                last_value: None,
                last_updated: None,
                sum: 0,
                window: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records the hardware value observed at `now`.
    pub fn update_value(&self, now: DateTime<Utc>, value: u64) {
        let secs = now.timestamp();
        if !self.series.lock().record(secs, value) {
            warn!("{}: ignoring sample at {} older than the last one", self.name, now);
        }
    }

    pub fn sum(&self) -> u64 {
        self.series.lock().sum
    }

    /// Average increase per second over the sample window.
    pub fn rate(&self) -> f64 {
        self.series.lock().rate()
    }

    pub fn last_value(&self) -> Option<u64> {
        self.series.lock().last_value
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let series = self.series.lock();
        CounterSnapshot {
            name: self.name.clone(),
            sum: series.sum,
            rate: series.rate(),
            last_value: series.last_value,
            last_updated: series
                .last_updated
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        }
    }
}
