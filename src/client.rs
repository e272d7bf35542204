//! Блокирующий клиент протокола ceserver (для ceprobe и тестов).

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::consts::*;
use crate::handles::Handle;
use crate::protocol::{
    ModuleEntry, ProcessEntry, VersionReply, VirtualQueryFullRecord, VirtualQueryResult,
};

/// Ответ GETREGIONINFO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionInfo {
    pub query: VirtualQueryResult,
    pub name: String,
}

pub struct CeClient {
    stream: TcpStream,
}

impl CeClient {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).context("connect to ceserver")?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    pub fn set_timeout(&self, t: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(t)?;
        Ok(())
    }

    /// Сырой доступ к сокету (тесты протокольных ошибок).
    pub fn stream(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    fn send(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn command(&mut self, cmd: u8, build: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> Result<()> {
        let mut buf = vec![cmd];
        build(&mut buf)?;
        self.send(&buf)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.stream.read_i32::<NativeEndian>()?)
    }

    /// true, если сервер закрыл соединение (EOF при чтении).
    pub fn is_closed_by_peer(&mut self) -> bool {
        let mut b = [0u8; 1];
        matches!(self.stream.read(&mut b), Ok(0) | Err(_))
    }

    // ---------- handshake ----------

    pub fn get_version(&mut self) -> Result<VersionReply> {
        self.command(CMD_GETVERSION, |_| Ok(()))?;
        Ok(VersionReply::read_from(&mut self.stream)?)
    }

    pub fn get_abi(&mut self) -> Result<u8> {
        self.command(CMD_GETABI, |_| Ok(()))?;
        Ok(self.stream.read_u8()?)
    }

    pub fn set_connection_name(&mut self, name: &str) -> Result<()> {
        self.command(CMD_SET_CONNECTION_NAME, |b| {
            b.write_u32::<NativeEndian>(name.len() as u32)?;
            b.write_all(name.as_bytes())
        })
    }

    pub fn get_options(&mut self) -> Result<u16> {
        self.command(CMD_GETOPTIONS, |_| Ok(()))?;
        Ok(self.stream.read_u16::<NativeEndian>()?)
    }

    pub fn close(mut self) -> Result<()> {
        self.command(CMD_CLOSECONNECTION, |_| Ok(()))
    }

    // ---------- snapshots ----------

    pub fn create_snapshot(&mut self, flags: u32, pid: u32) -> Result<Handle> {
        self.command(CMD_CREATETOOLHELP32SNAPSHOT, |b| {
            b.write_u32::<NativeEndian>(flags)?;
            b.write_u32::<NativeEndian>(pid)
        })?;
        self.read_i32()
    }

    pub fn process_first(&mut self, h: Handle) -> Result<ProcessEntry> {
        self.command(CMD_PROCESS32FIRST, |b| b.write_i32::<NativeEndian>(h))?;
        Ok(ProcessEntry::read_from(&mut self.stream)?)
    }

    pub fn process_next(&mut self, h: Handle) -> Result<ProcessEntry> {
        self.command(CMD_PROCESS32NEXT, |b| b.write_i32::<NativeEndian>(h))?;
        Ok(ProcessEntry::read_from(&mut self.stream)?)
    }

    /// Snapshot + полная итерация + CLOSEHANDLE.
    pub fn processes(&mut self) -> Result<Vec<ProcessEntry>> {
        let h = self.create_snapshot(TH32CS_SNAPPROCESS, 0)?;
        let mut out = Vec::new();
        let mut e = self.process_first(h)?;
        while !e.is_end() {
            out.push(e);
            e = self.process_next(h)?;
        }
        self.close_handle(h)?;
        Ok(out)
    }

    pub fn module_first(&mut self, h: Handle) -> Result<ModuleEntry> {
        self.command(CMD_MODULE32FIRST, |b| b.write_i32::<NativeEndian>(h))?;
        Ok(ModuleEntry::read_from(&mut self.stream)?)
    }

    pub fn module_next(&mut self, h: Handle) -> Result<ModuleEntry> {
        self.command(CMD_MODULE32NEXT, |b| b.write_i32::<NativeEndian>(h))?;
        Ok(ModuleEntry::read_from(&mut self.stream)?)
    }

    /// CREATETOOLHELP32SNAPSHOTEX(SNAPMODULE): записи потоком до end-маркера.
    pub fn modules_ex(&mut self, pid: u32) -> Result<Vec<ModuleEntry>> {
        self.command(CMD_CREATETOOLHELP32SNAPSHOTEX, |b| {
            b.write_u32::<NativeEndian>(TH32CS_SNAPMODULE)?;
            b.write_u32::<NativeEndian>(pid)
        })?;
        let mut out = Vec::new();
        loop {
            let e = ModuleEntry::read_from(&mut self.stream)?;
            if e.is_end() {
                return Ok(out);
            }
            out.push(e);
        }
    }

    pub fn threads(&mut self, pid: u32) -> Result<Vec<i32>> {
        self.command(CMD_CREATETOOLHELP32SNAPSHOTEX, |b| {
            b.write_u32::<NativeEndian>(TH32CS_SNAPTHREAD)?;
            b.write_u32::<NativeEndian>(pid)
        })?;
        let n = self.read_i32()?;
        if n < 0 {
            return Err(anyhow!("negative thread count {}", n));
        }
        (0..n).map(|_| self.read_i32()).collect()
    }

    pub fn close_handle(&mut self, h: Handle) -> Result<i32> {
        self.command(CMD_CLOSEHANDLE, |b| b.write_i32::<NativeEndian>(h))?;
        self.read_i32()
    }

    pub fn open_process(&mut self, pid: u32) -> Result<Handle> {
        self.command(CMD_OPENPROCESS, |b| b.write_u32::<NativeEndian>(pid))?;
        self.read_i32()
    }

    // ---------- memory ----------

    /// Вернёт прочитанные байты (пусто, если сервер ответил 0).
    pub fn read_memory(&mut self, h: Handle, address: u64, size: u32) -> Result<Vec<u8>> {
        self.command(CMD_READPROCESSMEMORY, |b| {
            b.write_i32::<NativeEndian>(h)?;
            b.write_u64::<NativeEndian>(address)?;
            b.write_u32::<NativeEndian>(size)?;
            b.write_u8(0)
        })?;
        let n = self.read_i32()?;
        if n <= 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; n as usize];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_memory(&mut self, h: Handle, address: u64, data: &[u8]) -> Result<i32> {
        self.command(CMD_WRITEPROCESSMEMORY, |b| {
            b.write_i32::<NativeEndian>(h)?;
            b.write_u64::<NativeEndian>(address)?;
            b.write_i32::<NativeEndian>(data.len() as i32)?;
            b.write_all(data)
        })?;
        self.read_i32()
    }

    // ---------- process info ----------

    pub fn get_architecture(&mut self, h: Handle) -> Result<u8> {
        self.command(CMD_GETARCHITECTURE, |b| b.write_i32::<NativeEndian>(h))?;
        Ok(self.stream.read_u8()?)
    }

    /// Legacy-вариант: без хэндла, сервер подставит последний открытый.
    pub fn get_architecture_legacy(&mut self) -> Result<u8> {
        self.command(CMD_GETARCHITECTURE, |_| Ok(()))?;
        Ok(self.stream.read_u8()?)
    }

    pub fn virtual_query(&mut self, h: Handle, address: u64) -> Result<VirtualQueryResult> {
        self.command(CMD_VIRTUALQUERYEX, |b| {
            b.write_i32::<NativeEndian>(h)?;
            b.write_u64::<NativeEndian>(address)
        })?;
        Ok(VirtualQueryResult::read_from(&mut self.stream)?)
    }

    pub fn region_info(&mut self, h: Handle, address: u64) -> Result<RegionInfo> {
        self.command(CMD_GETREGIONINFO, |b| {
            b.write_i32::<NativeEndian>(h)?;
            b.write_u64::<NativeEndian>(address)
        })?;
        let query = VirtualQueryResult::read_from(&mut self.stream)?;
        let len = self.stream.read_u8()? as usize;
        let mut name = vec![0u8; len];
        self.stream.read_exact(&mut name)?;
        Ok(RegionInfo {
            query,
            name: String::from_utf8_lossy(&name).into_owned(),
        })
    }

    pub fn virtual_query_full(&mut self, h: Handle, flags: u8) -> Result<Vec<VirtualQueryFullRecord>> {
        self.command(CMD_VIRTUALQUERYEXFULL, |b| {
            b.write_i32::<NativeEndian>(h)?;
            b.write_u8(flags)
        })?;
        let n = self.read_i32()?;
        if n < 0 {
            return Err(anyhow!("negative region count {}", n));
        }
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            out.push(VirtualQueryFullRecord::read_from(&mut self.stream)?);
        }
        Ok(out)
    }

    pub fn start_debug(&mut self, h: Handle) -> Result<Handle> {
        self.command(CMD_STARTDEBUG, |b| b.write_i32::<NativeEndian>(h))?;
        self.read_i32()
    }

    pub fn symbol_list_from_file(&mut self, path: &str) -> Result<u64> {
        self.command(CMD_GETSYMBOLLISTFROMFILE, |b| {
            b.write_i32::<NativeEndian>(path.len() as i32)?;
            b.write_all(path.as_bytes())
        })?;
        Ok(self.stream.read_u64::<NativeEndian>()?)
    }
}
