//! Lightweight global metrics for ceserver.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - соединения и команды протокола
//! - движок чтения (запросы, коалесинг, батчи)
//! - запись
//! - handle table

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Connections / commands -----
static CONNECTIONS_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_CLOSED: AtomicU64 = AtomicU64::new(0);
static COMMANDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static COMMANDS_UNSUPPORTED: AtomicU64 = AtomicU64::new(0);

// ----- Reads -----
static READ_REQUESTS: AtomicU64 = AtomicU64::new(0);
static READ_COALESCED: AtomicU64 = AtomicU64::new(0);
static READ_BYTES: AtomicU64 = AtomicU64::new(0);
static READ_FAILURES: AtomicU64 = AtomicU64::new(0);
static BATCHES_SEQUENTIAL: AtomicU64 = AtomicU64::new(0);
static BATCHES_SCATTER: AtomicU64 = AtomicU64::new(0);
static BATCH_ITEMS: AtomicU64 = AtomicU64::new(0);

// ----- Writes -----
static WRITES_TOTAL: AtomicU64 = AtomicU64::new(0);
static WRITE_BYTES: AtomicU64 = AtomicU64::new(0);
static WRITE_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Handles -----
static SNAPSHOTS_CREATED: AtomicU64 = AtomicU64::new(0);
static HANDLES_CLOSED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_closed: u64,
    pub commands_total: u64,
    pub commands_unsupported: u64,

    pub read_requests: u64,
    pub read_coalesced: u64,
    pub read_bytes: u64,
    pub read_failures: u64,
    pub batches_sequential: u64,
    pub batches_scatter: u64,
    pub batch_items: u64,

    pub writes_total: u64,
    pub write_bytes: u64,
    pub write_failures: u64,

    pub snapshots_created: u64,
    pub handles_closed: u64,
}

impl MetricsSnapshot {
    pub fn connections_active(&self) -> u64 {
        self.connections_accepted.saturating_sub(self.connections_closed)
    }

    pub fn avg_batch_items(&self) -> f64 {
        let batches = self.batches_sequential + self.batches_scatter;
        if batches == 0 {
            0.0
        } else {
            self.batch_items as f64 / batches as f64
        }
    }

    pub fn coalesce_ratio(&self) -> f64 {
        if self.read_requests == 0 {
            0.0
        } else {
            self.read_coalesced as f64 / self.read_requests as f64
        }
    }
}

// ----- Recorders (connections) -----
pub fn record_connection_accepted() {
    CONNECTIONS_ACCEPTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_connection_closed() {
    CONNECTIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_command(supported: bool) {
    COMMANDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    if !supported {
        COMMANDS_UNSUPPORTED.fetch_add(1, Ordering::Relaxed);
    }
}

// ----- Recorders (reads) -----
pub fn record_read_request(coalesced: bool) {
    READ_REQUESTS.fetch_add(1, Ordering::Relaxed);
    if coalesced {
        READ_COALESCED.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_read_bytes(n: usize) {
    READ_BYTES.fetch_add(n as u64, Ordering::Relaxed);
}

pub fn record_read_failure() {
    READ_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_batch(scatter: bool, items: usize) {
    if scatter {
        BATCHES_SCATTER.fetch_add(1, Ordering::Relaxed);
    } else {
        BATCHES_SEQUENTIAL.fetch_add(1, Ordering::Relaxed);
    }
    BATCH_ITEMS.fetch_add(items as u64, Ordering::Relaxed);
}

// ----- Recorders (writes) -----
pub fn record_write(bytes: usize, ok: bool) {
    WRITES_TOTAL.fetch_add(1, Ordering::Relaxed);
    if ok {
        WRITE_BYTES.fetch_add(bytes as u64, Ordering::Relaxed);
    } else {
        WRITE_FAILURES.fetch_add(1, Ordering::Relaxed);
    }
}

// ----- Recorders (handles) -----
pub fn record_snapshot_created() {
    SNAPSHOTS_CREATED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_handle_closed() {
    HANDLES_CLOSED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn metrics_snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        connections_accepted: CONNECTIONS_ACCEPTED.load(Ordering::Relaxed),
        connections_closed: CONNECTIONS_CLOSED.load(Ordering::Relaxed),
        commands_total: COMMANDS_TOTAL.load(Ordering::Relaxed),
        commands_unsupported: COMMANDS_UNSUPPORTED.load(Ordering::Relaxed),

        read_requests: READ_REQUESTS.load(Ordering::Relaxed),
        read_coalesced: READ_COALESCED.load(Ordering::Relaxed),
        read_bytes: READ_BYTES.load(Ordering::Relaxed),
        read_failures: READ_FAILURES.load(Ordering::Relaxed),
        batches_sequential: BATCHES_SEQUENTIAL.load(Ordering::Relaxed),
        batches_scatter: BATCHES_SCATTER.load(Ordering::Relaxed),
        batch_items: BATCH_ITEMS.load(Ordering::Relaxed),

        writes_total: WRITES_TOTAL.load(Ordering::Relaxed),
        write_bytes: WRITE_BYTES.load(Ordering::Relaxed),
        write_failures: WRITE_FAILURES.load(Ordering::Relaxed),

        snapshots_created: SNAPSHOTS_CREATED.load(Ordering::Relaxed),
        handles_closed: HANDLES_CLOSED.load(Ordering::Relaxed),
    }
}

pub fn reset_metrics() {
    CONNECTIONS_ACCEPTED.store(0, Ordering::Relaxed);
    CONNECTIONS_CLOSED.store(0, Ordering::Relaxed);
    COMMANDS_TOTAL.store(0, Ordering::Relaxed);
    COMMANDS_UNSUPPORTED.store(0, Ordering::Relaxed);

    READ_REQUESTS.store(0, Ordering::Relaxed);
    READ_COALESCED.store(0, Ordering::Relaxed);
    READ_BYTES.store(0, Ordering::Relaxed);
    READ_FAILURES.store(0, Ordering::Relaxed);
    BATCHES_SEQUENTIAL.store(0, Ordering::Relaxed);
    BATCHES_SCATTER.store(0, Ordering::Relaxed);
    BATCH_ITEMS.store(0, Ordering::Relaxed);

    WRITES_TOTAL.store(0, Ordering::Relaxed);
    WRITE_BYTES.store(0, Ordering::Relaxed);
    WRITE_FAILURES.store(0, Ordering::Relaxed);

    SNAPSHOTS_CREATED.store(0, Ordering::Relaxed);
    HANDLES_CLOSED.store(0, Ordering::Relaxed);
}
