//! Fixture backend: целевая машина, описанная JSON-документом.
//!
//! Формат:
//! ```json
//! {
//!   "processes": [
//!     {
//!       "pid": 123, "name": "explorer.exe", "memory_model": "x64",
//!       "threads": [4100, 4104],
//!       "vads": [ { "start": 65536, "end": 69631, "flags": 2098, "text": "" } ],
//!       "memory": [ { "address": 65536, "data": "<base64>" } ]
//!     }
//!   ]
//! }
//! ```
//! Чтение копирует непрерывный кусок сегмента начиная с адреса (может быть
//! частичным); запись проходит только если диапазон целиком внутри сегмента.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{MemoryBackend, ScatterItem};
use crate::model::{MemoryModel, ProcessInfo, ThreadInfo, VadEntry};

// ---------- on-disk document ----------

#[derive(Serialize, Deserialize, Default)]
struct FixtureDoc {
    #[serde(default)]
    processes: Vec<ProcessDoc>,
}

#[derive(Serialize, Deserialize)]
struct ProcessDoc {
    pid: u32,
    name: String,
    #[serde(default)]
    memory_model: MemoryModel,
    #[serde(default)]
    threads: Vec<u32>,
    #[serde(default)]
    vads: Vec<VadEntry>,
    #[serde(default)]
    memory: Vec<SegmentDoc>,
}

#[derive(Serialize, Deserialize)]
struct SegmentDoc {
    address: u64,
    /// base64 (standard alphabet)
    data: String,
}

// ---------- in-memory model ----------

/// Процесс фикстуры; заодно fluent-builder для тестов.
#[derive(Clone, Debug)]
pub struct FixtureProcess {
    pub pid: u32,
    pub name: String,
    pub memory_model: MemoryModel,
    pub threads: Vec<u32>,
    pub vads: Vec<VadEntry>,
    segments: BTreeMap<u64, Vec<u8>>,
}

impl FixtureProcess {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            memory_model: MemoryModel::X64,
            threads: Vec::new(),
            vads: Vec::new(),
            segments: BTreeMap::new(),
        }
    }

    pub fn model(mut self, m: MemoryModel) -> Self {
        self.memory_model = m;
        self
    }

    pub fn thread(mut self, tid: u32) -> Self {
        self.threads.push(tid);
        self
    }

    pub fn vad(mut self, v: VadEntry) -> Self {
        self.vads.push(v);
        self
    }

    pub fn memory(mut self, address: u64, bytes: impl Into<Vec<u8>>) -> Self {
        self.segments.insert(address, bytes.into());
        self
    }

    /// Сегмент, в который попадает `address`: (base, bytes).
    fn segment_at(&self, address: u64) -> Option<(u64, &Vec<u8>)> {
        let (&base, bytes) = self.segments.range(..=address).next_back()?;
        let off = address - base;
        if off < bytes.len() as u64 {
            Some((base, bytes))
        } else {
            None
        }
    }

    fn read_at(&self, address: u64, buf: &mut [u8]) -> Result<usize> {
        let (base, bytes) = self
            .segment_at(address)
            .ok_or_else(|| anyhow!("pid {}: address {:#x} is not mapped", self.pid, address))?;
        let off = (address - base) as usize;
        let n = buf.len().min(bytes.len() - off);
        buf[..n].copy_from_slice(&bytes[off..off + n]);
        Ok(n)
    }

    fn write_at(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let pid = self.pid;
        let base = self
            .segment_at(address)
            .map(|(b, _)| b)
            .ok_or_else(|| anyhow!("pid {}: address {:#x} is not mapped", pid, address))?;
        let bytes = self
            .segments
            .get_mut(&base)
            .ok_or_else(|| anyhow!("pid {}: segment {:#x} vanished", pid, base))?;
        let off = (address - base) as usize;
        if off + data.len() > bytes.len() {
            return Err(anyhow!(
                "pid {}: write of {} bytes at {:#x} crosses segment end",
                pid,
                data.len(),
                address
            ));
        }
        bytes[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FixtureBackend {
    procs: Mutex<BTreeMap<u32, FixtureProcess>>,
}

impl FixtureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(self, p: FixtureProcess) -> Self {
        self.procs.lock().unwrap().insert(p.pid, p);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read fixture {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse fixture {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: FixtureDoc = serde_json::from_str(text).context("fixture json")?;
        let mut backend = Self::new();
        for p in doc.processes {
            let mut fp = FixtureProcess::new(p.pid, p.name).model(p.memory_model);
            fp.threads = p.threads;
            fp.vads = p.vads;
            for seg in p.memory {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(seg.data.trim())
                    .map_err(|e| anyhow!("pid {} segment {:#x}: base64: {}", fp.pid, seg.address, e))?;
                fp = fp.memory(seg.address, bytes);
            }
            backend = backend.with_process(fp);
        }
        Ok(backend)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let procs = self.procs.lock().unwrap();
        let doc = FixtureDoc {
            processes: procs
                .values()
                .map(|p| ProcessDoc {
                    pid: p.pid,
                    name: p.name.clone(),
                    memory_model: p.memory_model,
                    threads: p.threads.clone(),
                    vads: p.vads.clone(),
                    memory: p
                        .segments
                        .iter()
                        .map(|(&address, bytes)| SegmentDoc {
                            address,
                            data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        })
                        .collect(),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&doc).context("serialize fixture")
    }

    fn with_proc<T>(&self, pid: u32, f: impl FnOnce(&FixtureProcess) -> Result<T>) -> Result<T> {
        let procs = self.procs.lock().unwrap();
        let p = procs
            .get(&pid)
            .ok_or_else(|| anyhow!("no such process: pid {}", pid))?;
        f(p)
    }
}

impl MemoryBackend for FixtureBackend {
    fn process_list(&self) -> Result<Vec<ProcessInfo>> {
        let procs = self.procs.lock().unwrap();
        Ok(procs
            .values()
            .map(|p| ProcessInfo::new(p.name.clone(), p.pid))
            .collect())
    }

    fn vad_map(&self, pid: u32) -> Result<Vec<VadEntry>> {
        self.with_proc(pid, |p| Ok(p.vads.clone()))
    }

    fn thread_map(&self, pid: u32) -> Result<Vec<ThreadInfo>> {
        self.with_proc(pid, |p| {
            Ok(p.threads
                .iter()
                .map(|&thread_id| ThreadInfo { thread_id, pid })
                .collect())
        })
    }

    fn memory_model(&self, pid: u32) -> Result<MemoryModel> {
        self.with_proc(pid, |p| Ok(p.memory_model))
    }

    fn read(&self, pid: u32, address: u64, buf: &mut [u8]) -> Result<usize> {
        self.with_proc(pid, |p| p.read_at(address, buf))
    }

    fn write(&self, pid: u32, address: u64, data: &[u8]) -> Result<()> {
        let mut procs = self.procs.lock().unwrap();
        let p = procs
            .get_mut(&pid)
            .ok_or_else(|| anyhow!("no such process: pid {}", pid))?;
        p.write_at(address, data)
    }

    fn scatter_read(&self, pid: u32, items: &mut [ScatterItem]) -> Result<()> {
        self.with_proc(pid, |p| {
            for it in items.iter_mut() {
                match p.read_at(it.address, &mut it.data) {
                    Ok(n) => it.bytes_read = n,
                    Err(_) => {
                        it.bytes_read = 0;
                        it.failed = true;
                    }
                }
            }
            Ok(())
        })
    }

    fn describe(&self) -> String {
        let n = self.procs.lock().unwrap().len();
        format!("fixture backend ({} processes)", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FixtureBackend {
        FixtureBackend::new().with_process(
            FixtureProcess::new(7, "game.exe")
                .thread(70)
                .vad(VadEntry::new(0x1000, 0x1fff).with_kind(0, 4))
                .memory(0x1000, (0u8..32).collect::<Vec<u8>>()),
        )
    }

    #[test]
    fn partial_and_unmapped_reads() -> Result<()> {
        let b = sample();
        let mut buf = [0u8; 8];
        assert_eq!(b.read(7, 0x1004, &mut buf)?, 8);
        assert_eq!(buf, [4, 5, 6, 7, 8, 9, 10, 11]);

        let mut big = [0u8; 64];
        assert_eq!(b.read(7, 0x1010, &mut big)?, 16);

        assert!(b.read(7, 0x5000, &mut buf).is_err());
        assert!(b.read(8, 0x1000, &mut buf).is_err());
        Ok(())
    }

    #[test]
    fn write_must_fit_segment() -> Result<()> {
        let b = sample();
        b.write(7, 0x1000, &[0xaa, 0xbb])?;
        let mut buf = [0u8; 2];
        b.read(7, 0x1000, &mut buf)?;
        assert_eq!(buf, [0xaa, 0xbb]);
        assert!(b.write(7, 0x101f, &[1, 2]).is_err());
        Ok(())
    }

    #[test]
    fn json_reload_keeps_everything() -> Result<()> {
        let text = sample().to_json_string()?;
        let b = FixtureBackend::from_json_str(&text)?;
        assert_eq!(b.process_list()?, vec![ProcessInfo::new("game.exe", 7)]);
        assert_eq!(b.thread_map(7)?.len(), 1);
        assert_eq!(b.vad_map(7)?[0].protection(), 4);
        let mut buf = [0u8; 4];
        assert_eq!(b.read(7, 0x101c, &mut buf)?, 4);
        assert_eq!(buf, [28, 29, 30, 31]);
        Ok(())
    }
}
