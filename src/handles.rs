//! Handle & Snapshot Table — общая для всех соединений таблица хэндлов.
//!
//! Назначение:
//! - выдача уникальных (в пределах процесса) хэндлов;
//! - хранение process/module snapshot'ов с курсорами итерации;
//! - отображение open-process хэндлов на pid.
//!
//! Notes:
//! - Один и тот же хэндл может одновременно присутствовать в process- и
//!   module-картах (разные виды snapshot'ов в разных map'ах).
//! - Итерация возвращает копию записи (copy-out), а не ссылку внутрь таблицы.
//! - Все операции на неизвестном хэндле возвращают None/false, без ошибок.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{MemoryRegion, ProcessInfo};

pub type Handle = i32;

/// Условно невалидный хэндл протокола.
pub const INVALID_HANDLE: Handle = -1;

#[derive(Debug)]
struct Snapshot<T> {
    entries: Vec<T>,
    cursor: usize,
}

impl<T: Clone> Snapshot<T> {
    fn new(entries: Vec<T>) -> Self {
        Self { entries, cursor: 0 }
    }

    fn next(&mut self) -> Option<T> {
        let e = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(e)
    }
}

#[derive(Debug, Default)]
struct Tables {
    last_handle: Handle,
    processes: HashMap<Handle, Snapshot<ProcessInfo>>,
    modules: HashMap<Handle, Snapshot<MemoryRegion>>,
    open: HashMap<Handle, u32>,
}

impl Tables {
    fn generate(&mut self) -> Handle {
        self.last_handle = if self.last_handle == Handle::MAX {
            0
        } else {
            self.last_handle + 1
        };
        self.last_handle
    }
}

#[derive(Debug, Default)]
pub struct HandleTable {
    inner: Mutex<Tables>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Следующий хэндл. После Handle::MAX счётчик уходит в 0.
    pub fn generate_handle(&self) -> Handle {
        self.inner.lock().unwrap().generate()
    }

    // ---------- store ----------

    pub fn store_process_snapshot(&self, entries: Vec<ProcessInfo>) -> Handle {
        let mut t = self.inner.lock().unwrap();
        let h = t.generate();
        t.processes.insert(h, Snapshot::new(entries));
        h
    }

    /// Положить (или заменить) process snapshot под уже существующим хэндлом.
    pub fn store_process_snapshot_at(&self, handle: Handle, entries: Vec<ProcessInfo>) {
        let mut t = self.inner.lock().unwrap();
        t.processes.insert(handle, Snapshot::new(entries));
    }

    pub fn store_module_snapshot(&self, entries: Vec<MemoryRegion>) -> Handle {
        let mut t = self.inner.lock().unwrap();
        let h = t.generate();
        t.modules.insert(h, Snapshot::new(entries));
        h
    }

    pub fn store_module_snapshot_at(&self, handle: Handle, entries: Vec<MemoryRegion>) {
        let mut t = self.inner.lock().unwrap();
        t.modules.insert(handle, Snapshot::new(entries));
    }

    pub fn store_open_process(&self, pid: u32) -> Handle {
        let mut t = self.inner.lock().unwrap();
        let h = t.generate();
        t.open.insert(h, pid);
        h
    }

    /// Удаляет хэндл из всех карт за один захват лока.
    pub fn close_handle(&self, handle: Handle) {
        let mut t = self.inner.lock().unwrap();
        t.processes.remove(&handle);
        t.modules.remove(&handle);
        t.open.remove(&handle);
    }

    // ---------- iteration ----------

    pub fn next_process_entry(&self, handle: Handle) -> Option<ProcessInfo> {
        let mut t = self.inner.lock().unwrap();
        t.processes.get_mut(&handle)?.next()
    }

    pub fn next_memory_region(&self, handle: Handle) -> Option<MemoryRegion> {
        let mut t = self.inner.lock().unwrap();
        t.modules.get_mut(&handle)?.next()
    }

    pub fn reset_process_cursor(&self, handle: Handle) {
        let mut t = self.inner.lock().unwrap();
        if let Some(s) = t.processes.get_mut(&handle) {
            s.cursor = 0;
        }
    }

    pub fn reset_module_cursor(&self, handle: Handle) {
        let mut t = self.inner.lock().unwrap();
        if let Some(s) = t.modules.get_mut(&handle) {
            s.cursor = 0;
        }
    }

    // ---------- lookups ----------

    pub fn get_pid(&self, handle: Handle) -> Option<u32> {
        self.inner.lock().unwrap().open.get(&handle).copied()
    }

    /// Хэндл для legacy-клиентов, которые не присылают его явно:
    /// самый свежий из открытых процессов.
    pub fn legacy_fallback_handle(&self) -> Option<Handle> {
        self.inner.lock().unwrap().open.keys().max().copied()
    }

    pub fn legacy_fallback_pid(&self) -> Option<u32> {
        let t = self.inner.lock().unwrap();
        let h = t.open.keys().max()?;
        t.open.get(h).copied()
    }

    pub fn has_process_snapshot(&self, handle: Handle) -> bool {
        self.inner.lock().unwrap().processes.contains_key(&handle)
    }

    pub fn has_module_snapshot(&self, handle: Handle) -> bool {
        self.inner.lock().unwrap().modules.contains_key(&handle)
    }

    pub fn has_open_process(&self, handle: Handle) -> bool {
        self.inner.lock().unwrap().open.contains_key(&handle)
    }

    /// (process snapshots, module snapshots, open processes)
    pub fn counts(&self) -> (usize, usize, usize) {
        let t = self.inner.lock().unwrap();
        (t.processes.len(), t.modules.len(), t.open.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_wraps_to_zero() {
        let t = HandleTable::new();
        t.inner.lock().unwrap().last_handle = Handle::MAX - 1;
        assert_eq!(t.generate_handle(), Handle::MAX);
        assert_eq!(t.generate_handle(), 0);
        assert_eq!(t.generate_handle(), 1);
    }

    #[test]
    fn both_snapshot_kinds_under_one_handle() {
        let t = HandleTable::new();
        let h = t.store_process_snapshot(vec![ProcessInfo::new("a.exe", 1)]);
        t.store_module_snapshot_at(h, Vec::new());
        assert!(t.has_process_snapshot(h));
        assert!(t.has_module_snapshot(h));
        assert!(!t.has_open_process(h));
        t.close_handle(h);
        assert!(!t.has_process_snapshot(h));
        assert!(!t.has_module_snapshot(h));
    }

    #[test]
    fn legacy_fallback_is_latest_open() {
        let t = HandleTable::new();
        assert_eq!(t.legacy_fallback_pid(), None);
        t.store_open_process(10);
        let h2 = t.store_open_process(20);
        assert_eq!(t.legacy_fallback_handle(), Some(h2));
        assert_eq!(t.legacy_fallback_pid(), Some(20));
        t.close_handle(h2);
        assert_eq!(t.legacy_fallback_pid(), Some(10));
    }
}
