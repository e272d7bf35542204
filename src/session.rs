//! Connection Dispatcher — протокольная state machine одного соединения.
//!
//! Цикл: прочитать 1 байт команды -> разобрать аргументы фиксированного
//! layout'а -> обратиться к HandleTable / MemoryEngine -> отправить ответ.
//!
//! Исход каждой команды:
//! - `Ok(true)`  — соединение остаётся открытым;
//! - `Ok(false)` — протокольная ошибка / невалидный хэндл, закрываем;
//! - `Err(_)`    — ошибка транспорта, закрываем.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, error, info, trace, warn};

use crate::consts::{
    ABI_WINDOWS, ARCH_ARM64, ARCH_UNKNOWN, ARCH_X64, ARCH_X86, CESERVER_VERSION,
    CESERVER_VERSION_NAME, DEFAULT_LEGACY_PROBE_MS, DEFAULT_LEGACY_PROBE_STEP_MS, MAX_WRITE_SIZE,
    REGION_NAME_MAX, TH32CS_SNAPMODULE, TH32CS_SNAPPROCESS, TH32CS_SNAPTHREAD,
};
use crate::handles::{Handle, HandleTable, INVALID_HANDLE};
use crate::memory::MemoryEngine;
use crate::metrics::{record_command, record_handle_closed, record_snapshot_created};
use crate::model::{MemoryModel, MemoryRegion};
use crate::protocol::{
    Command, ModuleEntry, ProcessEntry, VersionReply, VirtualQueryFullRecord, VirtualQueryResult,
};
use crate::region::{truncated_name, win32_protection, win32_type};

/// Максимальная длина имени соединения (SET_CONNECTION_NAME).
const MAX_CONNECTION_NAME: usize = 4096;
/// Максимальная длина пути (GETSYMBOLLISTFROMFILE).
const MAX_SYMBOL_PATH: usize = 64 * 1024;

// ---------- transport ----------

/// Транспорт соединения: блокирующие Read/Write + ожидание входных данных.
pub trait Transport: Read + Write {
    /// Ждать данные не дольше `timeout`. `true` — можно читать (или EOF).
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;
}

impl Transport for TcpStream {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let timeout = timeout.max(Duration::from_millis(1));
        self.set_read_timeout(Some(timeout))?;
        let mut b = [0u8; 1];
        let r = self.peek(&mut b);
        self.set_read_timeout(None)?;
        match r {
            Ok(_) => Ok(true),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

// ---------- config ----------

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Сколько ждать явный хэндл в GETARCHITECTURE.
    pub legacy_probe: Duration,
    pub legacy_probe_step: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            legacy_probe: Duration::from_millis(DEFAULT_LEGACY_PROBE_MS),
            legacy_probe_step: Duration::from_millis(DEFAULT_LEGACY_PROBE_STEP_MS),
        }
    }
}

// ---------- session ----------

pub struct Session<T: Transport> {
    io: T,
    label: String,
    handles: Arc<HandleTable>,
    engine: Arc<MemoryEngine>,
    cfg: SessionConfig,
}

impl<T: Transport> Session<T> {
    pub fn new(
        io: T,
        label: impl Into<String>,
        handles: Arc<HandleTable>,
        engine: Arc<MemoryEngine>,
        cfg: SessionConfig,
    ) -> Self {
        Self {
            io,
            label: label.into(),
            handles,
            engine,
            cfg,
        }
    }

    /// Метка соединения для логов (peer, либо имя из SET_CONNECTION_NAME).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    /// Обслуживать команды до закрытия соединения.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let code = match self.io.read_u8() {
                Ok(c) => c,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("[{}] peer closed the connection", self.label);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            if !self.dispatch(code)? {
                return Ok(());
            }
        }
    }

    /// Обработать одну команду (байт кода уже прочитан).
    pub fn dispatch(&mut self, code: u8) -> Result<bool> {
        let cmd = match Command::from_u8(code) {
            Some(c) => c,
            None => {
                record_command(false);
                warn!("[{}] unknown command {}, closing connection", self.label, code);
                return Ok(false);
            }
        };
        record_command(cmd.is_implemented());
        trace!("[{}] handling command: {}", self.label, cmd);

        let keep = match cmd {
            Command::GetVersion => self.get_version()?,
            Command::GetAbi => self.send_u8(ABI_WINDOWS)?,
            Command::CloseConnection => {
                debug!("[{}] client requested close", self.label);
                false
            }
            Command::TerminateServer => {
                warn!(
                    "[{}] received request to terminate server. Refusing to obey",
                    self.label
                );
                false
            }
            Command::SetConnectionName => self.set_connection_name()?,
            Command::CreateToolhelp32Snapshot => {
                let (flags, pid) = self.read_snapshot_args()?;
                self.create_snapshot(flags, pid)?
            }
            Command::CreateToolhelp32SnapshotEx => self.create_snapshot_ex()?,
            Command::Process32First => self.process_iter(true)?,
            Command::Process32Next => self.process_iter(false)?,
            Command::Module32First => self.module_iter(true)?,
            Command::Module32Next => self.module_iter(false)?,
            Command::CloseHandle => self.close_handle()?,
            Command::OpenProcess => self.open_process()?,
            Command::ReadProcessMemory => self.read_process_memory()?,
            Command::WriteProcessMemory => self.write_process_memory()?,
            Command::GetArchitecture => self.get_architecture()?,
            Command::GetRegionInfo => self.region_info(true)?,
            Command::VirtualQueryEx => self.region_info(false)?,
            Command::VirtualQueryExFull => self.virtual_query_full()?,
            Command::GetSymbolListFromFile => self.get_symbol_list()?,
            Command::StartDebug => {
                let h = self.read_handle()?;
                self.send_i32(h)?
            }
            Command::GetOptions => {
                let mut out = Vec::with_capacity(2);
                out.write_u16::<NativeEndian>(0)?;
                self.send(&out)?
            }
            other => {
                warn!(
                    "[{}] command {} is not implemented, closing connection",
                    self.label, other
                );
                false
            }
        };

        trace!("[{}] finished command: {} keep={}", self.label, cmd, keep);
        Ok(keep)
    }

    // ---------- io helpers ----------

    fn send(&mut self, bytes: &[u8]) -> Result<bool> {
        self.io.write_all(bytes)?;
        self.io.flush()?;
        Ok(true)
    }

    fn send_i32(&mut self, v: i32) -> Result<bool> {
        self.send(&v.to_ne_bytes())
    }

    fn send_u8(&mut self, v: u8) -> Result<bool> {
        self.send(&[v])
    }

    fn read_handle(&mut self) -> Result<Handle> {
        Ok(self.io.read_i32::<NativeEndian>()?)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.io.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// pid открытого процесса или None (с логом).
    fn open_pid(&self, handle: Handle) -> Option<u32> {
        let pid = self.handles.get_pid(handle);
        if pid.is_none() {
            error!("[{}] handle {} has not opened any processes", self.label, handle);
        }
        pid
    }

    // ---------- handshake ----------

    fn get_version(&mut self) -> Result<bool> {
        let mut out = Vec::new();
        VersionReply {
            version: CESERVER_VERSION,
            name: CESERVER_VERSION_NAME.to_string(),
        }
        .write_to(&mut out)?;
        self.send(&out)
    }

    fn set_connection_name(&mut self) -> Result<bool> {
        let len = self.io.read_u32::<NativeEndian>()? as usize;
        if len > MAX_CONNECTION_NAME {
            warn!("[{}] connection name of {} bytes rejected", self.label, len);
            return Ok(false);
        }
        let raw = self.read_bytes(len)?;
        let name = String::from_utf8_lossy(&raw).into_owned();
        info!("[{}] new connection name: {}", self.label, name);
        self.label = name;
        Ok(true)
    }

    // ---------- snapshots ----------

    fn read_snapshot_args(&mut self) -> Result<(u32, u32)> {
        let flags = self.io.read_u32::<NativeEndian>()?;
        let pid = self.io.read_u32::<NativeEndian>()?;
        Ok((flags, pid))
    }

    fn create_snapshot(&mut self, flags: u32, pid: u32) -> Result<bool> {
        let handle = if flags & TH32CS_SNAPPROCESS != 0 {
            self.store_process_snapshot()
        } else if flags & TH32CS_SNAPMODULE != 0 {
            let regions = self.engine.get_module_snapshot(pid);
            debug!("[{}] module snapshot pid={}: {} regions", self.label, pid, regions.len());
            record_snapshot_created();
            self.handles.store_module_snapshot(regions)
        } else {
            error!("[{}] unsupported snapshot flags {:#x}", self.label, flags);
            0
        };
        self.send_i32(handle)
    }

    fn store_process_snapshot(&mut self) -> Handle {
        let procs = self.engine.get_process_snapshot();
        debug!("[{}] process snapshot: {} entries", self.label, procs.len());
        record_snapshot_created();
        self.handles.store_process_snapshot(procs)
    }

    fn create_snapshot_ex(&mut self) -> Result<bool> {
        let (flags, pid) = self.read_snapshot_args()?;

        if flags & TH32CS_SNAPTHREAD != 0 {
            let threads = self.engine.get_thread_snapshot(pid);
            let mut out = Vec::with_capacity(4 + threads.len() * 4);
            out.write_i32::<NativeEndian>(threads.len() as i32)?;
            for t in &threads {
                out.write_i32::<NativeEndian>(t.thread_id as i32)?;
            }
            return self.send(&out);
        }

        if flags & TH32CS_SNAPMODULE != 0 {
            let regions = self.engine.get_module_snapshot(pid);
            let mut out = Vec::new();
            for r in &regions {
                module_entry(r).write_to(&mut out)?;
            }
            ModuleEntry::end().write_to(&mut out)?;
            return self.send(&out);
        }

        // остальные флаги: process snapshot независимо от SNAPPROCESS
        let handle = self.store_process_snapshot();
        self.send_i32(handle)
    }

    fn process_iter(&mut self, first: bool) -> Result<bool> {
        let handle = self.read_handle()?;
        if first {
            self.handles.reset_process_cursor(handle);
        }
        let entry = match self.handles.next_process_entry(handle) {
            Some(p) => ProcessEntry::found(p.pid, &p.name),
            None => ProcessEntry::end(),
        };
        let mut out = Vec::new();
        entry.write_to(&mut out)?;
        self.send(&out)
    }

    fn module_iter(&mut self, first: bool) -> Result<bool> {
        let handle = self.read_handle()?;
        if first {
            self.handles.reset_module_cursor(handle);
        }
        let entry = match self.handles.next_memory_region(handle) {
            Some(r) => module_entry(&r),
            None => ModuleEntry::end(),
        };
        let mut out = Vec::new();
        entry.write_to(&mut out)?;
        self.send(&out)
    }

    fn close_handle(&mut self) -> Result<bool> {
        let handle = self.read_handle()?;
        self.handles.close_handle(handle);
        record_handle_closed();
        self.send_i32(1)
    }

    fn open_process(&mut self) -> Result<bool> {
        let pid = self.io.read_u32::<NativeEndian>()?;
        let handle = self.handles.store_open_process(pid);
        debug!("[{}] process {} opened as handle {}", self.label, pid, handle);
        self.send_i32(handle)
    }

    // ---------- memory ----------

    fn read_process_memory(&mut self) -> Result<bool> {
        let handle = self.read_handle()?;
        let address = self.io.read_u64::<NativeEndian>()?;
        let size = self.io.read_u32::<NativeEndian>()? as usize;
        let compress = self.io.read_u8()?;

        if compress != 0 {
            warn!("[{}] compressed reads are not supported", self.label);
            return Ok(false);
        }
        let pid = match self.open_pid(handle) {
            Some(p) => p,
            None => return Ok(false),
        };
        if address == 0 || size == 0 {
            debug!("[{}] empty read {:#x}+{}", self.label, address, size);
            return self.send_i32(0);
        }

        let r = self.engine.read(pid, address, size);
        if r.bytes_read == 0 {
            debug!("[{}] read {}:{:#x}+{} returned nothing", self.label, pid, address, size);
            return self.send_i32(0);
        }
        if r.bytes_read < size {
            warn!(
                "[{}] partial read {}:{:#x}: {} of {} bytes",
                self.label, pid, address, r.bytes_read, size
            );
        }

        let mut out = Vec::with_capacity(4 + r.bytes_read);
        out.write_i32::<NativeEndian>(r.bytes_read as i32)?;
        out.extend_from_slice(&r.data[..r.bytes_read]);
        self.send(&out)
    }

    fn write_process_memory(&mut self) -> Result<bool> {
        let handle = self.read_handle()?;
        let address = self.io.read_u64::<NativeEndian>()?;
        let size = self.io.read_i32::<NativeEndian>()?;
        if size < 0 || size as usize > MAX_WRITE_SIZE {
            warn!("[{}] invalid write size {}", self.label, size);
            return Ok(false);
        }
        let payload = self.read_bytes(size as usize)?;

        let pid = match self.open_pid(handle) {
            Some(p) => p,
            None => return Ok(false),
        };

        match self.engine.write(pid, address, &payload) {
            Ok(written) => {
                self.send_i32(written as i32)?;
                if written != payload.len() {
                    warn!(
                        "[{}] partial write {}:{:#x}: {} of {} bytes",
                        self.label, pid, address, written, size
                    );
                    return Ok(false);
                }
                Ok(true)
            }
            Err(e) => {
                error!("[{}] {:#}", self.label, e);
                self.send_i32(0)?;
                Ok(false)
            }
        }
    }

    // ---------- process info ----------

    /// Новые клиенты шлют хэндл сразу за командой, legacy — нет.
    fn probe_handle(&mut self) -> Result<Option<Handle>> {
        let deadline = Instant::now() + self.cfg.legacy_probe;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let step = self.cfg.legacy_probe_step.min(deadline - now);
            if self.io.wait_readable(step)? {
                return Ok(Some(self.read_handle()?));
            }
        }
    }

    fn get_architecture(&mut self) -> Result<bool> {
        let handle = match self.probe_handle()? {
            Some(h) => h,
            None => {
                let h = self.handles.legacy_fallback_handle().unwrap_or(INVALID_HANDLE);
                debug!("[{}] legacy client, using handle {}", self.label, h);
                h
            }
        };
        let pid = match self.open_pid(handle) {
            Some(p) => p,
            None => return Ok(false),
        };

        let arch = match self.engine.get_memory_model(pid) {
            MemoryModel::X86 | MemoryModel::X86Pae => ARCH_X86,
            MemoryModel::X64 => ARCH_X64,
            MemoryModel::Arm64 => ARCH_ARM64,
            other => {
                error!("[{}] unknown memory model {:?} for pid {}", self.label, other, pid);
                ARCH_UNKNOWN
            }
        };
        self.send_u8(arch)
    }

    fn region_info(&mut self, with_name: bool) -> Result<bool> {
        let handle = self.read_handle()?;
        let address = self.io.read_u64::<NativeEndian>()?;
        let pid = match self.open_pid(handle) {
            Some(p) => p,
            None => return Ok(false),
        };

        let mut out = Vec::new();
        if address == 0 {
            debug!("[{}] region query for null address", self.label);
            VirtualQueryResult::default().write_to(&mut out)?;
            if with_name {
                out.write_u8(0)?;
            }
            return self.send(&out);
        }

        // каждый раз свежий снимок VAD
        let regions = self.engine.get_module_snapshot(pid);
        let found = regions.iter().find(|r| r.contains(address));
        match found {
            Some(r) => {
                trace!(
                    "[{}] {:#x} is in region {:#x}..={:#x}",
                    self.label,
                    address,
                    r.start,
                    r.end()
                );
                VirtualQueryResult {
                    result: 1,
                    protection: win32_protection(r),
                    mem_type: win32_type(r),
                    base: r.start,
                    size: r.size,
                }
                .write_to(&mut out)?;
            }
            None => {
                debug!("[{}] no region contains {:#x}", self.label, address);
                VirtualQueryResult::default().write_to(&mut out)?;
            }
        }

        if with_name {
            let name: &[u8] = found
                .map(|r| truncated_name(r, REGION_NAME_MAX))
                .unwrap_or(&[]);
            out.write_u8(name.len() as u8)?;
            out.extend_from_slice(name);
        }
        self.send(&out)
    }

    fn virtual_query_full(&mut self) -> Result<bool> {
        let handle = self.read_handle()?;
        // VQE_PAGEDONLY / DIRTYONLY / NOSHARED: пока не фильтруем
        let _flags = self.io.read_u8()?;
        let pid = match self.open_pid(handle) {
            Some(p) => p,
            None => return Ok(false),
        };

        let regions = self.engine.get_module_snapshot(pid);
        let mut out = Vec::with_capacity(4 + regions.len() * crate::protocol::VQ_FULL_RECORD_SIZE);
        out.write_i32::<NativeEndian>(regions.len() as i32)?;
        for r in &regions {
            VirtualQueryFullRecord {
                protection: win32_protection(r),
                mem_type: win32_type(r),
                base: r.start,
                size: r.size,
            }
            .write_to(&mut out)?;
        }
        self.send(&out)
    }

    fn get_symbol_list(&mut self) -> Result<bool> {
        let len = self.io.read_i32::<NativeEndian>()?;
        if len < 0 || len as usize > MAX_SYMBOL_PATH {
            warn!("[{}] invalid symbol path length {}", self.label, len);
            return Ok(false);
        }
        let raw = self.read_bytes(len as usize)?;
        warn!(
            "[{}] symbol list from file {} requested, not supported",
            self.label,
            String::from_utf8_lossy(&raw)
        );
        let mut out = Vec::with_capacity(8);
        out.write_u64::<NativeEndian>(0)?;
        self.send(&out)
    }
}

fn module_entry(r: &MemoryRegion) -> ModuleEntry {
    ModuleEntry {
        result: 1,
        base: r.start as i64,
        part: r.part,
        size: r.size as i32,
        name: r.name.clone(),
    }
}
