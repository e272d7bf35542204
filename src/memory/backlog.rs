//! Backlog: ожидающие чтения, ключ (pid, address, size).
//!
//! `BacklogItem` — одноразовая ячейка результата + Condvar (broadcast-once).
//! Сколько бы потоков ни ждали один item, результат записывается ровно
//! один раз и все ждущие видят одни и те же байты.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BacklogKey {
    pub pid: u32,
    pub address: u64,
    pub size: usize,
}

impl fmt::Display for BacklogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.pid, self.address, self.size)
    }
}

/// Результат чтения; `data.len() == bytes_read`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ReadOutcome {
    pub bytes_read: usize,
    pub data: Vec<u8>,
}

impl ReadOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct BacklogItem {
    pub key: BacklogKey,
    cell: Mutex<Option<Arc<ReadOutcome>>>,
    ready: Condvar,
}

impl BacklogItem {
    pub fn new(key: BacklogKey) -> Self {
        Self {
            key,
            cell: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Записать результат. Повторная запись игнорируется (возвращает false).
    pub fn complete(&self, mut outcome: ReadOutcome) -> bool {
        let mut g = self.cell.lock().unwrap();
        if g.is_some() {
            return false;
        }
        outcome.data.truncate(outcome.bytes_read);
        *g = Some(Arc::new(outcome));
        self.ready.notify_all();
        true
    }

    pub fn is_complete(&self) -> bool {
        self.cell.lock().unwrap().is_some()
    }

    /// Ждать результат. Готовый результат читается из кэша без ожидания.
    pub fn wait(&self) -> Arc<ReadOutcome> {
        let mut g = self.cell.lock().unwrap();
        loop {
            if let Some(r) = g.as_ref() {
                return Arc::clone(r);
            }
            g = self.ready.wait(g).unwrap();
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Backlog {
    pub(crate) items: HashMap<BacklogKey, Arc<BacklogItem>>,
}

impl Backlog {
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Вернуть (item, created). created=false — подцепились к уже ожидающему.
    pub(crate) fn attach(&mut self, key: BacklogKey) -> (Arc<BacklogItem>, bool) {
        if let Some(it) = self.items.get(&key) {
            return (Arc::clone(it), false);
        }
        let it = Arc::new(BacklogItem::new(key));
        self.items.insert(key, Arc::clone(&it));
        (it, true)
    }

    /// Выбрать батч: все элементы одного pid (первого встреченного),
    /// не больше `max_items` штук и `max_bytes` суммарно. Выбранное удаляется.
    pub(crate) fn take_batch(&mut self, max_items: usize, max_bytes: usize) -> Vec<Arc<BacklogItem>> {
        let pid = match self.items.keys().next() {
            Some(k) => k.pid,
            None => return Vec::new(),
        };

        let mut keys = Vec::new();
        let mut requested = 0usize;
        for k in self.items.keys() {
            if keys.len() >= max_items {
                break;
            }
            if k.pid != pid {
                continue;
            }
            if requested.saturating_add(k.size) > max_bytes {
                break;
            }
            requested += k.size;
            keys.push(*k);
        }

        keys.iter()
            .filter_map(|k| self.items.remove(k))
            .collect()
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<BacklogItem>> {
        self.items.drain().map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(pid: u32, address: u64, size: usize) -> BacklogKey {
        BacklogKey { pid, address, size }
    }

    #[test]
    fn key_display() {
        assert_eq!(key(4, 4096, 8).to_string(), "4:4096:8");
    }

    #[test]
    fn single_assignment_many_waiters() {
        let item = Arc::new(BacklogItem::new(key(1, 0x10, 4)));
        let mut hs = Vec::new();
        for _ in 0..8 {
            let it = Arc::clone(&item);
            hs.push(thread::spawn(move || it.wait()));
        }
        assert!(item.complete(ReadOutcome {
            bytes_read: 2,
            data: vec![1, 2, 0, 0]
        }));
        assert!(!item.complete(ReadOutcome {
            bytes_read: 4,
            data: vec![9; 4]
        }));
        for h in hs {
            let r = h.join().unwrap();
            assert_eq!(r.bytes_read, 2);
            assert_eq!(r.data, vec![1, 2]);
        }
        // кэшированное значение читается повторно
        assert_eq!(item.wait().data, vec![1, 2]);
    }

    #[test]
    fn attach_dedups_identical_keys() {
        let mut b = Backlog::default();
        let (a, created_a) = b.attach(key(1, 0x1000, 8));
        let (c, created_c) = b.attach(key(1, 0x1000, 8));
        let (_, created_d) = b.attach(key(1, 0x1000, 16));
        assert!(created_a && !created_c && created_d);
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn batch_is_single_pid_and_bounded() {
        let mut b = Backlog::default();
        for i in 0..10u64 {
            b.attach(key(1, i * 0x100, 0x10));
            b.attach(key(2, i * 0x100, 0x10));
        }
        let batch = b.take_batch(4, usize::MAX);
        assert_eq!(batch.len(), 4);
        let pid = batch[0].key.pid;
        assert!(batch.iter().all(|it| it.key.pid == pid));
        assert_eq!(b.len(), 16);

        let batch = b.take_batch(256, 0x30);
        assert!(batch.len() <= 3);
        let total: usize = batch.iter().map(|it| it.key.size).sum();
        assert!(total <= 0x30);
    }
}
