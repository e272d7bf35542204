#![allow(dead_code)]

use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use ceserver_dma::backend::fixture::FixtureProcess;
use ceserver_dma::backend::{MemoryBackend, ScatterItem};
use ceserver_dma::model::{
    MemoryModel, ProcessInfo, ThreadInfo, VadEntry, VAD_F_HEAP, VAD_F_PRIVATE_MEMORY, VAD_F_STACK,
};
use ceserver_dma::{EngineConfig, FixtureBackend, MemoryEngine, Transport};

pub const EXPLORER_PID: u32 = 123;
pub const CHROME_PID: u32 = 124;

pub const HEAP_BASE: u64 = 0x10000;
pub const HEAP_LEN: usize = 0x1000;
pub const IMAGE_BASE: u64 = 0x7ff6_0000;
pub const IMAGE_END: u64 = 0x7ff6_ffff;
pub const LONG_BASE: u64 = 0x20000;
pub const LONG_END: u64 = 0x20fff;

pub fn long_region_name() -> String {
    format!("\\Device\\HarddiskVolume3\\{}.dll", "x".repeat(200))
}

/// Байт шаблона по адресу в heap-сегменте explorer.exe.
pub fn heap_byte(address: u64) -> u8 {
    ((address - HEAP_BASE) % 251) as u8
}

/// explorer.exe (pid 123, x64) и chrome.exe (pid 124, x86).
pub fn sample_target() -> FixtureBackend {
    let heap: Vec<u8> = (0..HEAP_LEN as u64).map(|i| heap_byte(HEAP_BASE + i)).collect();
    let image: Vec<u8> = b"MZ\x90\x00".iter().copied().chain(std::iter::repeat(0xcc).take(0x1000 - 4)).collect();

    FixtureBackend::new()
        .with_process(
            FixtureProcess::new(EXPLORER_PID, "explorer.exe")
                .model(MemoryModel::X64)
                .thread(4100)
                .thread(4104)
                .vad(
                    VadEntry::new(HEAP_BASE, HEAP_BASE + HEAP_LEN as u64 - 1)
                        .with_kind(0, 4)
                        .with_flag(VAD_F_PRIVATE_MEMORY)
                        .with_flag(VAD_F_HEAP),
                )
                .vad(
                    VadEntry::new(LONG_BASE, LONG_END)
                        .with_kind(1, 1)
                        .with_text(long_region_name()),
                )
                .vad(
                    VadEntry::new(0x30000, 0x3ffff)
                        .with_kind(0, 4)
                        .with_flag(VAD_F_PRIVATE_MEMORY)
                        .with_flag(VAD_F_STACK),
                )
                .vad(
                    VadEntry::new(IMAGE_BASE, IMAGE_END)
                        .with_kind(2, 3)
                        .with_text("\\Windows\\explorer.exe"),
                )
                .memory(HEAP_BASE, heap)
                .memory(IMAGE_BASE, image),
        )
        .with_process(
            FixtureProcess::new(CHROME_PID, "chrome.exe")
                .model(MemoryModel::X86)
                .thread(8000)
                .memory(0x40_0000, vec![0x42u8; 64]),
        )
}

// ---------- counting backend ----------

/// Обёртка над backend'ом: считает вызовы и пересечения операций.
pub struct CountingBackend {
    inner: FixtureBackend,
    delay: Duration,
    pub reads: AtomicUsize,
    pub scatters: AtomicUsize,
    pub scatter_items: AtomicUsize,
    pub writes: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl CountingBackend {
    pub fn new(inner: FixtureBackend) -> Self {
        Self {
            inner,
            delay: Duration::ZERO,
            reads: AtomicUsize::new(0),
            scatters: AtomicUsize::new(0),
            scatter_items: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Каждая операция с памятью длится не меньше `d`.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn backend_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.scatters.load(Ordering::SeqCst)
    }
}

impl MemoryBackend for CountingBackend {
    fn process_list(&self) -> Result<Vec<ProcessInfo>> {
        self.inner.process_list()
    }

    fn vad_map(&self, pid: u32) -> Result<Vec<VadEntry>> {
        self.inner.vad_map(pid)
    }

    fn thread_map(&self, pid: u32) -> Result<Vec<ThreadInfo>> {
        self.inner.thread_map(pid)
    }

    fn memory_model(&self, pid: u32) -> Result<MemoryModel> {
        self.inner.memory_model(pid)
    }

    fn read(&self, pid: u32, address: u64, buf: &mut [u8]) -> Result<usize> {
        self.enter();
        self.reads.fetch_add(1, Ordering::SeqCst);
        let r = self.inner.read(pid, address, buf);
        self.leave();
        r
    }

    fn write(&self, pid: u32, address: u64, data: &[u8]) -> Result<()> {
        self.enter();
        self.writes.fetch_add(1, Ordering::SeqCst);
        let r = self.inner.write(pid, address, data);
        self.leave();
        r
    }

    fn scatter_read(&self, pid: u32, items: &mut [ScatterItem]) -> Result<()> {
        self.enter();
        self.scatters.fetch_add(1, Ordering::SeqCst);
        self.scatter_items.fetch_add(items.len(), Ordering::SeqCst);
        let r = self.inner.scatter_read(pid, items);
        self.leave();
        r
    }
}

pub fn engine_over(backend: Arc<CountingBackend>, cfg: EngineConfig) -> Arc<MemoryEngine> {
    Arc::new(MemoryEngine::new(backend, cfg))
}

/// Ждать, пока `cond` не станет true (или таймаут).
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

// ---------- in-memory transport ----------

/// Транспорт со сценарием: вход заранее записан, выход копится в буфер.
pub struct ScriptTransport {
    input: Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

impl ScriptTransport {
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input: Cursor::new(input),
            output: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        let len = self.input.get_ref().len() as u64;
        len.saturating_sub(self.input.position()) as usize
    }
}

impl Read for ScriptTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptTransport {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        if self.remaining() > 0 {
            return Ok(true);
        }
        // сценарий исчерпан: клиент "молчит"
        thread::sleep(timeout);
        Ok(false)
    }
}
