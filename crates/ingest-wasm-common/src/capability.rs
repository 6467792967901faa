//! Capabilities supplied by the embedding application.
//!
//! - [`Event`]: the record a guest reads and mutates during one `process` call
//! - [`Host`]: host services that are not tied to a single event (the clock)

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Value;

/// A structured record processed by a guest module.
///
/// Events are moved into a session for the duration of a single call, so
/// implementations must be `Send + 'static`.
pub trait Event: Send + 'static {
    /// Look up a field. Returns `None` when the field is absent.
    fn get_field(&self, key: &str) -> Option<Value>;

    /// Create or replace a field.
    fn put_field(&mut self, key: &str, value: Value);
}

impl Event for BTreeMap<String, Value> {
    fn get_field(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn put_field(&mut self, key: &str, value: Value) {
        self.insert(key.to_string(), value);
    }
}

impl<S> Event for HashMap<String, Value, S>
where
    S: std::hash::BuildHasher + Send + 'static,
{
    fn get_field(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn put_field(&mut self, key: &str, value: Value) {
        self.insert(key.to_string(), value);
    }
}

/// Host services available to every session.
///
/// Time is read through this trait rather than the system clock so tests can
/// run guests against a fixed or virtual clock.
pub trait Host: Send + Sync {
    /// Current time in nanoseconds since the Unix epoch.
    fn current_time_nanos(&self) -> i64;
}

/// [`Host`] backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn current_time_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}
