//! Fixed-window request throttling keyed by caller.

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Buckets beyond this count trigger a sweep of expired windows.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny { retry_after_secs: u64 },
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Counts requests per caller inside fixed windows.
///
/// A window opens on a caller's first request and resets once it expires.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    per_window: u32,
    window: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl FixedWindowLimiter {
    pub fn new(per_window: u32, window: Duration) -> Self {
        Self {
            per_window,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request from `caller` at `now`.
    pub fn admit(&self, caller: &str, now: Instant) -> Admission {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if buckets.len() > PRUNE_THRESHOLD {
            buckets.retain(|_, b| b.reset_at > now);
        }

        match buckets.get_mut(caller) {
            Some(bucket) if bucket.reset_at > now => {
                bucket.count = bucket.count.saturating_add(1);
                if bucket.count > self.per_window {
                    let remaining = bucket.reset_at.saturating_duration_since(now);
                    Admission::Deny {
                        retry_after_secs: ceil_secs(remaining).max(1),
                    }
                } else {
                    Admission::Allow
                }
            }
            _ => {
                buckets.insert(
                    caller.to_string(),
                    Bucket {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                Admission::Allow
            }
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then `"unknown"`.
pub fn caller_id(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded.or_else(real_ip).unwrap_or("unknown").to_string()
}
