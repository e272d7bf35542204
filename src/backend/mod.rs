//! Backend — доступ к памяти целевой машины (DMA / MemProcFS или фикстура).
//!
//! Движок памяти и диспетчер видят backend только через `MemoryBackend`,
//! который инжектится как `Arc<dyn MemoryBackend>`.

use anyhow::Result;

use crate::model::{MemoryModel, ProcessInfo, ThreadInfo, VadEntry};

pub mod fixture;
#[cfg(feature = "memprocfs")]
pub mod memprocfs;

pub use fixture::FixtureBackend;

/// Один элемент scatter-чтения. Backend заполняет `data`, `bytes_read`, `failed`.
#[derive(Clone, Debug)]
pub struct ScatterItem {
    pub address: u64,
    pub size: usize,
    pub data: Vec<u8>,
    pub bytes_read: usize,
    pub failed: bool,
}

impl ScatterItem {
    pub fn new(address: u64, size: usize) -> Self {
        Self {
            address,
            size,
            data: vec![0u8; size],
            bytes_read: 0,
            failed: false,
        }
    }
}

pub trait MemoryBackend: Send + Sync {
    fn process_list(&self) -> Result<Vec<ProcessInfo>>;

    fn vad_map(&self, pid: u32) -> Result<Vec<VadEntry>>;

    fn thread_map(&self, pid: u32) -> Result<Vec<ThreadInfo>>;

    fn memory_model(&self, pid: u32) -> Result<MemoryModel>;

    /// Прочитать в `buf`, вернуть число прочитанных байт (может быть < buf.len()).
    fn read(&self, pid: u32, address: u64, buf: &mut [u8]) -> Result<usize>;

    fn write(&self, pid: u32, address: u64, data: &[u8]) -> Result<()>;

    /// Scatter: зарегистрировать все (address,size), выполнить один раз,
    /// затем забрать результат каждого элемента отдельно.
    /// Ошибка отдельного элемента отмечается в `failed`, а не через Err.
    fn scatter_read(&self, pid: u32, items: &mut [ScatterItem]) -> Result<()>;

    fn describe(&self) -> String {
        "memory backend".to_string()
    }
}

/// Текст memory map'а для `-memmap`: одна строка на физический диапазон
/// `(base, size)`, формат `IIII  start  -  end  ->  start` (hex).
pub fn format_memory_map(ranges: &[(u64, u64)]) -> String {
    let mut out = String::new();
    for (i, &(pa, cb)) in ranges.iter().enumerate() {
        let end = pa.wrapping_add(cb).wrapping_sub(1);
        out.push_str(&format!("{:04x}  {:x}  -  {:x}  ->  {:x}\n", i, pa, end, pa));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_map_lines() {
        let text = format_memory_map(&[(0x123, 0x133), (0x213, 0x432)]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["0000  123  -  255  ->  123", "0001  213  -  644  ->  213"]);
    }

    #[test]
    fn memory_map_index_is_hex() {
        let ranges: Vec<(u64, u64)> = (0..17u64).map(|i| (i * 0x1000, 0x1000)).collect();
        let text = format_memory_map(&ranges);
        assert!(text.lines().nth(16).unwrap().starts_with("0010  10000  -  10fff"));
    }
}
