//! Исполнение батча: последовательное чтение или scatter.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{error, trace, warn};

use super::backlog::{BacklogItem, ReadOutcome};
use super::EngineStats;
use crate::backend::{MemoryBackend, ScatterItem};
use crate::metrics::{record_batch, record_read_failure};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Scatter,
}

pub fn choose_strategy(batch_len: usize, scatter_threshold: usize) -> Strategy {
    if batch_len <= scatter_threshold {
        Strategy::Sequential
    } else {
        Strategy::Scatter
    }
}

/// Выполнить батч одного pid. Каждый item получает результат ровно один раз,
/// даже если backend упал (тогда 0 байт).
pub(crate) fn execute_batch(
    backend: &dyn MemoryBackend,
    stats: &EngineStats,
    pid: u32,
    batch: &[Arc<BacklogItem>],
    scatter_threshold: usize,
) {
    let strategy = choose_strategy(batch.len(), scatter_threshold);
    let requested: usize = batch.iter().map(|it| it.key.size).sum();
    trace!(
        "batch pid={} items={} bytes={} strategy={:?}",
        pid,
        batch.len(),
        requested,
        strategy
    );

    stats.batches.fetch_add(1, Ordering::Relaxed);
    match strategy {
        Strategy::Sequential => {
            stats.sequential_batches.fetch_add(1, Ordering::Relaxed);
            read_sequential(backend, stats, pid, batch);
        }
        Strategy::Scatter => {
            stats.scatter_batches.fetch_add(1, Ordering::Relaxed);
            read_scatter(backend, stats, pid, batch);
        }
    }
    record_batch(strategy == Strategy::Scatter, batch.len());
}

fn finish(stats: &EngineStats, item: &BacklogItem, bytes_read: usize, data: Vec<u8>) {
    stats.items_served.fetch_add(1, Ordering::Relaxed);
    stats.bytes_served.fetch_add(bytes_read as u64, Ordering::Relaxed);
    item.complete(ReadOutcome { bytes_read, data });
}

fn fail(stats: &EngineStats, item: &BacklogItem) {
    stats.failed_items.fetch_add(1, Ordering::Relaxed);
    record_read_failure();
    finish(stats, item, 0, Vec::new());
}

fn read_sequential(backend: &dyn MemoryBackend, stats: &EngineStats, pid: u32, batch: &[Arc<BacklogItem>]) {
    for item in batch {
        let mut buf = vec![0u8; item.key.size];
        match backend.read(pid, item.key.address, &mut buf) {
            Ok(n) => {
                let n = n.min(buf.len());
                finish(stats, item, n, buf);
            }
            Err(e) => {
                error!("read {} failed: {:#}", item.key, e);
                fail(stats, item);
            }
        }
    }
}

fn read_scatter(backend: &dyn MemoryBackend, stats: &EngineStats, pid: u32, batch: &[Arc<BacklogItem>]) {
    let mut items: Vec<ScatterItem> = batch
        .iter()
        .map(|it| ScatterItem::new(it.key.address, it.key.size))
        .collect();

    if let Err(e) = backend.scatter_read(pid, &mut items) {
        error!("scatter read for pid {} ({} items) failed: {:#}", pid, batch.len(), e);
        for item in batch {
            fail(stats, item);
        }
        return;
    }

    for (item, s) in batch.iter().zip(items) {
        if s.failed {
            error!("scatter item {} failed", item.key);
            stats.failed_items.fetch_add(1, Ordering::Relaxed);
            record_read_failure();
        } else if s.bytes_read < s.size {
            warn!("scatter item {}: partial read {} of {}", item.key, s.bytes_read, s.size);
        }
        let n = s.bytes_read.min(s.data.len());
        finish(stats, item, n, s.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_boundary() {
        assert_eq!(choose_strategy(0, 1), Strategy::Sequential);
        assert_eq!(choose_strategy(1, 1), Strategy::Sequential);
        assert_eq!(choose_strategy(2, 1), Strategy::Scatter);
        assert_eq!(choose_strategy(4, 4), Strategy::Sequential);
    }
}
