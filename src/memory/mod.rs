//! Memory Access Engine — коалесинг и батчинг чтений поверх backend'а.
//!
//! Назначение:
//! - `read()` из любых потоков: одинаковые (pid,address,size) склеиваются в
//!   один BacklogItem, backend трогается один раз, результат видят все;
//! - фоновый dispatch loop набирает батч (один pid, <= max items / bytes)
//!   и запускает его в отдельном потоке;
//! - батчи и `write()` делят один mutex "устройства": в каждый момент
//!   к backend'у идёт максимум одна операция чтения-батча или записи.
//!
//! Notes:
//! - Порядок обслуживания разных ключей не гарантируется (HashMap).
//! - Потоки батчей отслеживаются и join'ятся в `shutdown()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, error, info, warn};

use crate::backend::MemoryBackend;
use crate::consts::{
    DEFAULT_BACKOFF_EXTEND_US, DEFAULT_DISPATCH_BUILD_US, DEFAULT_MAX_DISPATCH_BYTES,
    DEFAULT_MAX_DISPATCH_SIZE, DEFAULT_SCATTER_THRESHOLD,
};
use crate::metrics::{record_read_bytes, record_read_request, record_write};
use crate::model::{MemoryModel, MemoryRegion, ProcessInfo, ThreadInfo};

pub mod backlog;
pub mod dispatch;

pub use backlog::{BacklogItem, BacklogKey, ReadOutcome};
pub use dispatch::{choose_strategy, Strategy};

use backlog::Backlog;

// ---------- config ----------

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Сколько даём backlog'у расти после предыдущего dispatch'а.
    pub dispatch_build_time: Duration,
    /// На сколько сдвигается дедлайн следующего dispatch'а.
    pub backoff_extend: Duration,
    pub max_dispatch_size: usize,
    pub max_dispatch_bytes: usize,
    pub scatter_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_build_time: Duration::from_micros(DEFAULT_DISPATCH_BUILD_US),
            backoff_extend: Duration::from_micros(DEFAULT_BACKOFF_EXTEND_US),
            max_dispatch_size: DEFAULT_MAX_DISPATCH_SIZE,
            max_dispatch_bytes: DEFAULT_MAX_DISPATCH_BYTES,
            scatter_threshold: DEFAULT_SCATTER_THRESHOLD,
        }
    }
}

// ---------- stats ----------

#[derive(Debug, Default)]
pub struct EngineStats {
    pub requests: AtomicU64,
    pub coalesced: AtomicU64,
    pub rejected: AtomicU64,
    pub batches: AtomicU64,
    pub sequential_batches: AtomicU64,
    pub scatter_batches: AtomicU64,
    pub items_served: AtomicU64,
    pub bytes_served: AtomicU64,
    pub failed_items: AtomicU64,
    /// Максимальный размер батча за время жизни движка.
    pub max_batch_items: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub requests: u64,
    pub coalesced: u64,
    pub rejected: u64,
    pub batches: u64,
    pub sequential_batches: u64,
    pub scatter_batches: u64,
    pub items_served: u64,
    pub bytes_served: u64,
    pub failed_items: u64,
    pub max_batch_items: u64,
}

impl EngineStats {
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            sequential_batches: self.sequential_batches.load(Ordering::Relaxed),
            scatter_batches: self.scatter_batches.load(Ordering::Relaxed),
            items_served: self.items_served.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
            failed_items: self.failed_items.load(Ordering::Relaxed),
            max_batch_items: self.max_batch_items.load(Ordering::Relaxed),
        }
    }
}

// ---------- shared state ----------

#[derive(Default)]
struct EngineState {
    backlog: Backlog,
    stop: bool,
}

struct Shared {
    backend: Arc<dyn MemoryBackend>,
    cfg: EngineConfig,
    state: Mutex<EngineState>,
    pushed: Condvar,
    /// Токен устройства (mutex на 1): батч или запись.
    device: Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stats: EngineStats,
}

/// Гарантирует, что каждый item батча получит результат, даже если поток
/// батча запаниковал. `complete()` идемпотентен.
struct CompleteOnDrop(Vec<Arc<BacklogItem>>);

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        for it in &self.0 {
            it.complete(ReadOutcome::empty());
        }
    }
}

pub struct MemoryEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryEngine {
    /// Создать движок. Dispatch loop не запущен до `start()`.
    pub fn new(backend: Arc<dyn MemoryBackend>, cfg: EngineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                cfg,
                state: Mutex::new(EngineState::default()),
                pushed: Condvar::new(),
                device: Mutex::new(()),
                tasks: Mutex::new(Vec::new()),
                stats: EngineStats::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.cfg
    }

    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.shared.backend
    }

    /// Запустить dispatch loop (повторный вызов — no-op).
    pub fn start(&self) -> Result<()> {
        let mut w = self.worker.lock().unwrap();
        if w.is_some() {
            return Ok(());
        }
        self.shared.state.lock().unwrap().stop = false;
        let shared = Arc::clone(&self.shared);
        let h = thread::Builder::new()
            .name("ce-dispatch".into())
            .spawn(move || dispatch_loop(shared))?;
        *w = Some(h);
        debug!("memory engine: dispatch loop started");
        Ok(())
    }

    /// Остановить loop, дождаться батчей, завершить ожидающих пустым результатом.
    pub fn shutdown(&self) {
        {
            let mut st = self.shared.state.lock().unwrap();
            st.stop = true;
        }
        self.shared.pushed.notify_all();

        if let Some(h) = self.worker.lock().unwrap().take() {
            if h.join().is_err() {
                error!("memory engine: dispatch loop panicked");
            }
        }

        let tasks = std::mem::take(&mut *self.shared.tasks.lock().unwrap());
        for t in tasks {
            let _ = t.join();
        }

        let pending = self.shared.state.lock().unwrap().backlog.drain();
        if !pending.is_empty() {
            warn!("memory engine: {} pending reads dropped on shutdown", pending.len());
        }
        for it in pending {
            it.complete(ReadOutcome::empty());
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().unwrap().is_some()
    }

    pub fn backlog_len(&self) -> usize {
        self.shared.state.lock().unwrap().backlog.len()
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn log_summary(&self) {
        let s = self.stats();
        info!(
            "memory engine: requests={} coalesced={} batches={} (seq={}, scatter={}) failed={}",
            s.requests, s.coalesced, s.batches, s.sequential_batches, s.scatter_batches, s.failed_items
        );
    }

    // ---------- read / write ----------

    /// Блокирующее чтение через backlog.
    pub fn read(&self, pid: u32, address: u64, size: usize) -> ReadOutcome {
        if size == 0 {
            return ReadOutcome::empty();
        }
        if size > self.shared.cfg.max_dispatch_bytes {
            warn!(
                "read {}:{:#x}: size {} exceeds dispatch budget {}, rejected",
                pid, address, size, self.shared.cfg.max_dispatch_bytes
            );
            self.shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return ReadOutcome::empty();
        }

        let key = BacklogKey { pid, address, size };
        let item = {
            let mut st = self.shared.state.lock().unwrap();
            if st.stop {
                return ReadOutcome::empty();
            }
            let (item, created) = st.backlog.attach(key);
            self.shared.stats.requests.fetch_add(1, Ordering::Relaxed);
            record_read_request(!created);
            if created {
                self.shared.pushed.notify_all();
            } else {
                self.shared.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            }
            item
        };

        let r = item.wait();
        record_read_bytes(r.bytes_read);
        (*r).clone()
    }

    /// Синхронная запись; эксклюзивна относительно батчей чтения.
    pub fn write(&self, pid: u32, address: u64, data: &[u8]) -> Result<usize> {
        let _token = self.shared.device.lock().unwrap();
        match self.shared.backend.write(pid, address, data) {
            Ok(()) => {
                record_write(data.len(), true);
                Ok(data.len())
            }
            Err(e) => {
                record_write(data.len(), false);
                Err(e.context(format!("write {} bytes at {}:{:#x}", data.len(), pid, address)))
            }
        }
    }

    // ---------- enumeration pass-through ----------

    pub fn get_process_snapshot(&self) -> Vec<ProcessInfo> {
        self.shared.backend.process_list().unwrap_or_else(|e| {
            error!("failed to get process list: {:#}", e);
            Vec::new()
        })
    }

    pub fn get_module_snapshot(&self, pid: u32) -> Vec<MemoryRegion> {
        match self.shared.backend.vad_map(pid) {
            Ok(vads) => vads.iter().map(MemoryRegion::from).collect(),
            Err(e) => {
                error!("failed to get VAD map for pid {}: {:#}", pid, e);
                Vec::new()
            }
        }
    }

    pub fn get_thread_snapshot(&self, pid: u32) -> Vec<ThreadInfo> {
        self.shared.backend.thread_map(pid).unwrap_or_else(|e| {
            error!("failed to get thread map for pid {}: {:#}", pid, e);
            Vec::new()
        })
    }

    pub fn get_memory_model(&self, pid: u32) -> MemoryModel {
        self.shared.backend.memory_model(pid).unwrap_or_else(|e| {
            error!("failed to get process information for pid {}: {:#}", pid, e);
            MemoryModel::Unknown
        })
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------- dispatch loop ----------

fn dispatch_loop(shared: Arc<Shared>) {
    let cfg = shared.cfg.clone();
    let mut last_dispatch = Instant::now();
    let mut next_dispatch = last_dispatch;

    loop {
        let mut st = shared.state.lock().unwrap();
        while st.backlog.is_empty() && !st.stop {
            st = shared.pushed.wait(st).unwrap();
        }
        if st.stop {
            break;
        }

        // даём backlog'у подрасти, пока не истёк бюджет с прошлого dispatch'а
        loop {
            let now = Instant::now();
            let window_end = (last_dispatch + cfg.dispatch_build_time).min(next_dispatch);
            if st.stop || st.backlog.len() >= cfg.max_dispatch_size || now >= window_end {
                break;
            }
            st = shared.pushed.wait_timeout(st, window_end - now).unwrap().0;
        }
        if st.stop {
            break;
        }

        let batch = st
            .backlog
            .take_batch(cfg.max_dispatch_size, cfg.max_dispatch_bytes);
        last_dispatch = Instant::now();
        next_dispatch = last_dispatch + cfg.backoff_extend;
        drop(st);

        if batch.is_empty() {
            continue;
        }
        spawn_batch(&shared, batch);
    }
    debug!("memory engine: dispatch loop stopped");
}

fn spawn_batch(shared: &Arc<Shared>, batch: Vec<Arc<BacklogItem>>) {
    let pid = batch[0].key.pid;
    shared
        .stats
        .max_batch_items
        .fetch_max(batch.len() as u64, Ordering::Relaxed);

    let sh = Arc::clone(shared);
    let guard = CompleteOnDrop(batch);
    let spawned = thread::Builder::new()
        .name("ce-batch".into())
        .spawn(move || {
            let guard = guard;
            let _token = sh.device.lock().unwrap();
            dispatch::execute_batch(
                sh.backend.as_ref(),
                &sh.stats,
                pid,
                &guard.0,
                sh.cfg.scatter_threshold,
            );
        });

    match spawned {
        Ok(h) => {
            let mut tasks = shared.tasks.lock().unwrap();
            // подчищаем завершившиеся
            let (done, live): (Vec<_>, Vec<_>) =
                std::mem::take(&mut *tasks).into_iter().partition(|t| t.is_finished());
            *tasks = live;
            tasks.push(h);
            drop(tasks);
            for t in done {
                let _ = t.join();
            }
        }
        // closure (и guard) уже дропнуты -> ожидающие получили пустой результат
        Err(e) => error!("failed to spawn batch thread for pid {}: {}", pid, e),
    }
}
