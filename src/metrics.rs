//! Per-method call metrics.
//!
//! Counts, error counts, and duration aggregates for outgoing calls,
//! keyed by method name. Recorded on the `call()` path; `start_call()`
//! users are not tracked. Snapshot and reset only — no exporter, no
//! background collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Aggregated timings for one method.
#[derive(Debug, Clone, Default)]
pub struct MethodStats {
    /// Total calls, successful or not.
    pub calls: u64,
    /// Calls that resolved with an error.
    pub errors: u64,
    /// Shortest observed call.
    pub min: Duration,
    /// Longest observed call.
    pub max: Duration,
    total: Duration,
}

impl MethodStats {
    /// Mean call duration; zero when nothing was recorded.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total / self.calls as u32
        }
    }

    fn record(&mut self, duration: Duration, success: bool) {
        // ---
        if self.calls == 0 {
            self.min = duration;
            self.max = duration;
        } else {
            self.min = self.min.min(duration);
            self.max = self.max.max(duration);
        }
        self.calls += 1;
        self.total += duration;
        if !success {
            self.errors += 1;
        }
    }
}

/// Point-in-time view of a node's call metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub total_calls: u64,
    pub total_errors: u64,
    pub methods: HashMap<String, MethodStats>,
}

struct Registry {
    started_at: Instant,
    methods: HashMap<String, MethodStats>,
}

/// Shared metrics store; cheap to clone.
#[derive(Clone)]
pub(crate) struct MetricsRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl MetricsRegistry {
    pub(crate) fn new() -> Self {
        // ---
        Self {
            inner: Arc::new(Mutex::new(Registry {
                started_at: Instant::now(),
                methods: HashMap::new(),
            })),
        }
    }

    pub(crate) fn record(&self, method: &str, duration: Duration, success: bool) {
        // ---
        let mut registry = lock_ignore_poison(&self.inner);
        registry
            .methods
            .entry(method.to_string())
            .or_default()
            .record(duration, success);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        // ---
        let registry = lock_ignore_poison(&self.inner);
        MetricsSnapshot {
            uptime: registry.started_at.elapsed(),
            total_calls: registry.methods.values().map(|s| s.calls).sum(),
            total_errors: registry.methods.values().map(|s| s.errors).sum(),
            methods: registry.methods.clone(),
        }
    }

    pub(crate) fn reset(&self) {
        // ---
        let mut registry = lock_ignore_poison(&self.inner);
        registry.methods.clear();
        registry.started_at = Instant::now();
    }
}
