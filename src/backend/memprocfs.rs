//! Реальный DMA backend поверх MemProcFS (PCILeech FPGA).
//!
//! Инициализация в два шага:
//! 1) открыть устройство с `-device fpga://algo=0`, снять физическую карту
//!    памяти и записать её в текстовый memmap-файл;
//! 2) переоткрыть устройство уже с `-memmap <file>`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use memprocfs::{
    Vmm, VmmMemoryModelType, FLAG_NOCACHE, FLAG_NOCACHEPUT, FLAG_ZEROPAD_ON_FAIL,
};

use super::{format_memory_map, MemoryBackend, ScatterItem};
use crate::model::{MemoryModel, ProcessInfo, ThreadInfo, VadEntry};

const READ_FLAGS: u64 = FLAG_NOCACHE | FLAG_NOCACHEPUT | FLAG_ZEROPAD_ON_FAIL;

pub struct MemProcFsBackend {
    vmm: Vmm<'static>,
    memmap_path: PathBuf,
}

impl MemProcFsBackend {
    /// `lib_path` — путь к vmm.so / vmm.dll, `device` — например `fpga`.
    pub fn open(lib_path: &str, device: &str, memmap_path: &Path) -> Result<Self> {
        generate_memory_map(lib_path, memmap_path)?;

        let memmap = memmap_path.to_string_lossy().to_string();
        let args = vec!["-printf", "-v", "-device", device, "-memmap", memmap.as_str()];
        let vmm = Vmm::new(lib_path, &args).context("initialize MemProcFS with memory map")?;
        info!("MemProcFS ready: device={}, memmap={}", device, memmap_path.display());
        Ok(Self {
            vmm,
            memmap_path: memmap_path.to_path_buf(),
        })
    }
}

/// Шаг 1: снять карту физической памяти и сохранить в `path`.
pub fn generate_memory_map(lib_path: &str, path: &Path) -> Result<()> {
    info!("Generating memory map...");
    let args = vec!["", "-v", "-printf", "-device", "fpga://algo=0"];
    let vmm = Vmm::new(lib_path, &args).context("initialize MemProcFS for memory map")?;
    let map = vmm.map_memory().context("get physical memory map")?;
    if map.is_empty() {
        return Err(anyhow!("physical memory map is empty"));
    }
    let ranges: Vec<(u64, u64)> = map.iter().map(|e| (e.pa, e.cb)).collect();
    fs::write(path, format_memory_map(&ranges))
        .with_context(|| format!("write memory map {}", path.display()))?;
    info!("memory map: {} ranges -> {}", ranges.len(), path.display());
    Ok(())
}

fn map_model(m: VmmMemoryModelType) -> MemoryModel {
    match m {
        VmmMemoryModelType::NA => MemoryModel::Na,
        VmmMemoryModelType::X86 => MemoryModel::X86,
        VmmMemoryModelType::X86PAE => MemoryModel::X86Pae,
        VmmMemoryModelType::X64 => MemoryModel::X64,
    }
}

impl MemoryBackend for MemProcFsBackend {
    fn process_list(&self) -> Result<Vec<ProcessInfo>> {
        let procs = self.vmm.process_list().context("process list")?;
        let mut out = Vec::with_capacity(procs.len());
        for p in procs {
            // процессы без user-пути (system, idle и т.п.) пропускаем
            match p.get_path_user() {
                Ok(name) => out.push(ProcessInfo::new(name, p.pid)),
                Err(_) => continue,
            }
        }
        Ok(out)
    }

    fn vad_map(&self, pid: u32) -> Result<Vec<VadEntry>> {
        let p = self.vmm.process_from_pid(pid)?;
        let vads = p
            .map_vad(true)
            .with_context(|| format!("VAD map for pid {}", pid))?;
        Ok(vads
            .into_iter()
            .map(|v| VadEntry {
                start: v.va_start,
                end: v.va_end,
                flags: v.u0,
                text: v.info,
            })
            .collect())
    }

    fn thread_map(&self, pid: u32) -> Result<Vec<ThreadInfo>> {
        let p = self.vmm.process_from_pid(pid)?;
        let threads = p
            .map_thread()
            .with_context(|| format!("thread map for pid {}", pid))?;
        Ok(threads
            .into_iter()
            .map(|t| ThreadInfo {
                thread_id: t.thread_id,
                pid,
            })
            .collect())
    }

    fn memory_model(&self, pid: u32) -> Result<MemoryModel> {
        let p = self.vmm.process_from_pid(pid)?;
        let info = p.info().with_context(|| format!("process info for pid {}", pid))?;
        Ok(map_model(info.tp_memorymodel))
    }

    fn read(&self, pid: u32, address: u64, buf: &mut [u8]) -> Result<usize> {
        let p = self.vmm.process_from_pid(pid)?;
        p.mem_read_into(address, READ_FLAGS, buf)
    }

    fn write(&self, pid: u32, address: u64, data: &[u8]) -> Result<()> {
        let p = self.vmm.process_from_pid(pid)?;
        p.mem_write(address, data)
    }

    fn scatter_read(&self, pid: u32, items: &mut [ScatterItem]) -> Result<()> {
        let p = self.vmm.process_from_pid(pid)?;
        let scatter = p.mem_scatter(READ_FLAGS).context("scatter init")?;
        for it in items.iter() {
            if let Err(e) = scatter.prepare(it.address, it.size) {
                warn!("scatter prepare {:#x}+{} failed: {}", it.address, it.size, e);
            }
        }
        scatter.execute().context("scatter execute")?;
        for it in items.iter_mut() {
            match scatter.read_into(it.address, &mut it.data) {
                Ok(n) => it.bytes_read = n,
                Err(_) => {
                    it.bytes_read = 0;
                    it.failed = true;
                }
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("MemProcFS backend (memmap {})", self.memmap_path.display())
    }
}
