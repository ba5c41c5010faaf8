//! Lexicographically sortable identities and a monotonic clock.
//!
//! Identities are ULIDs rendered as 26-character Crockford base32 strings.
//! Both id generation and timestamps go through [`Clock`], which never
//! returns the same millisecond twice within a process: ids created
//! back-to-back sort in creation order even if wall time stalls or regresses.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Mutex;
use std::time::SystemTime;
use ulid::Ulid;

/// Length of the short display form used for tables and prefix lookup.
pub const SHORT_LEN: usize = 8;

/// The leading characters of an identity, for human display.
pub fn short(id: &str) -> &str {
    if id.len() > SHORT_LEN {
        &id[..SHORT_LEN]
    } else {
        id
    }
}

/// Monotonic wall-clock source shared by id generation and row timestamps.
pub struct Clock {
    last: Mutex<DateTime<Utc>>,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Current time, strictly greater than every previous reading.
    /// If wall time has not advanced (or regressed), steps forward by 1 ms.
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::milliseconds(1);
        }
        *last = now;
        now
    }

    /// RFC 3339 UTC timestamp with millisecond precision.
    pub fn timestamp(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// A fresh ULID whose time component comes from this clock.
    pub fn new_id(&self) -> String {
        let at: SystemTime = self.now().into();
        Ulid::from_datetime(at).to_string()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_sort_in_creation_order() {
        let clock = Clock::new();
        let ids: Vec<String> = (0..64).map(|_| clock.new_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn ids_are_26_chars() {
        let clock = Clock::new();
        assert_eq!(clock.new_id().len(), 26);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let clock = Clock::new();
        let a = clock.timestamp();
        let b = clock.timestamp();
        assert!(b > a, "{b} should sort after {a}");
    }

    #[test]
    fn short_form() {
        assert_eq!(short("01ARZ3NDEKTSV4RRFFQ69G5FAV"), "01ARZ3ND");
        assert_eq!(short("abc"), "abc");
    }
}
