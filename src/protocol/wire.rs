//! Упакованные (без паддинга) структуры протокола в host byte order.
//!
//! Layout'ы:
//! - Version:     [version i32][name_len u8] + name
//! - ProcessEntry:[result i32][pid i32][name_len i32] + name (если result != 0)
//! - ModuleEntry: [result i32][base i64][part i32][size i32][name_len i32] + name
//! - VQ result:   [result u8][protection u32][type u32][base u64][size u64]
//! - VQ full:     [protection u32][type u32][base u64][size u64]

use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

pub const PROCESS_ENTRY_SIZE: usize = 12;
pub const MODULE_ENTRY_SIZE: usize = 24;
pub const VQ_RESULT_SIZE: usize = 25;
pub const VQ_FULL_RECORD_SIZE: usize = 24;

/// Защита от мусорных длин имён со стороны пира.
const MAX_NAME_LEN: usize = 64 * 1024;

fn read_name<R: Read>(r: &mut R, len: usize) -> io::Result<String> {
    if len > MAX_NAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("name length {} too large", len),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ---------- Version ----------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionReply {
    pub version: i32,
    pub name: String,
}

impl VersionReply {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name = &self.name.as_bytes()[..self.name.len().min(u8::MAX as usize)];
        w.write_i32::<NativeEndian>(self.version)?;
        w.write_u8(name.len() as u8)?;
        w.write_all(name)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let version = r.read_i32::<NativeEndian>()?;
        let len = r.read_u8()? as usize;
        let name = read_name(r, len)?;
        Ok(Self { version, name })
    }
}

// ---------- Process entry ----------

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ProcessEntry {
    pub result: i32,
    pub pid: i32,
    pub name: String,
}

impl ProcessEntry {
    pub fn end() -> Self {
        Self::default()
    }

    pub fn found(pid: u32, name: &str) -> Self {
        Self {
            result: 1,
            pid: pid as i32,
            name: name.to_string(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.result == 0
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name: &[u8] = if self.result != 0 { self.name.as_bytes() } else { &[] };
        w.write_i32::<NativeEndian>(self.result)?;
        w.write_i32::<NativeEndian>(self.pid)?;
        w.write_i32::<NativeEndian>(name.len() as i32)?;
        w.write_all(name)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let result = r.read_i32::<NativeEndian>()?;
        let pid = r.read_i32::<NativeEndian>()?;
        let len = r.read_i32::<NativeEndian>()?.max(0) as usize;
        let name = read_name(r, len)?;
        Ok(Self { result, pid, name })
    }
}

// ---------- Module entry ----------

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ModuleEntry {
    pub result: i32,
    pub base: i64,
    pub part: i32,
    pub size: i32,
    pub name: String,
}

impl ModuleEntry {
    pub fn end() -> Self {
        Self::default()
    }

    pub fn is_end(&self) -> bool {
        self.result == 0
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name: &[u8] = if self.result != 0 { self.name.as_bytes() } else { &[] };
        w.write_i32::<NativeEndian>(self.result)?;
        w.write_i64::<NativeEndian>(self.base)?;
        w.write_i32::<NativeEndian>(self.part)?;
        w.write_i32::<NativeEndian>(self.size)?;
        w.write_i32::<NativeEndian>(name.len() as i32)?;
        w.write_all(name)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let result = r.read_i32::<NativeEndian>()?;
        let base = r.read_i64::<NativeEndian>()?;
        let part = r.read_i32::<NativeEndian>()?;
        let size = r.read_i32::<NativeEndian>()?;
        let len = r.read_i32::<NativeEndian>()?.max(0) as usize;
        let name = read_name(r, len)?;
        Ok(Self {
            result,
            base,
            part,
            size,
            name,
        })
    }
}

// ---------- VirtualQuery ----------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct VirtualQueryResult {
    pub result: u8,
    pub protection: u32,
    pub mem_type: u32,
    pub base: u64,
    pub size: u64,
}

impl VirtualQueryResult {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.result)?;
        w.write_u32::<NativeEndian>(self.protection)?;
        w.write_u32::<NativeEndian>(self.mem_type)?;
        w.write_u64::<NativeEndian>(self.base)?;
        w.write_u64::<NativeEndian>(self.size)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            result: r.read_u8()?,
            protection: r.read_u32::<NativeEndian>()?,
            mem_type: r.read_u32::<NativeEndian>()?,
            base: r.read_u64::<NativeEndian>()?,
            size: r.read_u64::<NativeEndian>()?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct VirtualQueryFullRecord {
    pub protection: u32,
    pub mem_type: u32,
    pub base: u64,
    pub size: u64,
}

impl VirtualQueryFullRecord {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<NativeEndian>(self.protection)?;
        w.write_u32::<NativeEndian>(self.mem_type)?;
        w.write_u64::<NativeEndian>(self.base)?;
        w.write_u64::<NativeEndian>(self.size)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            protection: r.read_u32::<NativeEndian>()?,
            mem_type: r.read_u32::<NativeEndian>()?,
            base: r.read_u64::<NativeEndian>()?,
            size: r.read_u64::<NativeEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_sizes() -> io::Result<()> {
        let mut b = Vec::new();
        ProcessEntry::end().write_to(&mut b)?;
        assert_eq!(b.len(), PROCESS_ENTRY_SIZE);

        b.clear();
        ModuleEntry::end().write_to(&mut b)?;
        assert_eq!(b.len(), MODULE_ENTRY_SIZE);

        b.clear();
        VirtualQueryResult::default().write_to(&mut b)?;
        assert_eq!(b.len(), VQ_RESULT_SIZE);

        b.clear();
        VirtualQueryFullRecord::default().write_to(&mut b)?;
        assert_eq!(b.len(), VQ_FULL_RECORD_SIZE);
        Ok(())
    }

    #[test]
    fn end_entry_carries_no_name() -> io::Result<()> {
        let e = ProcessEntry {
            result: 0,
            pid: 0,
            name: "ignored".into(),
        };
        let mut b = Vec::new();
        e.write_to(&mut b)?;
        assert_eq!(b, vec![0u8; PROCESS_ENTRY_SIZE]);
        Ok(())
    }

    #[test]
    fn vq_field_order_host_endian() -> io::Result<()> {
        let vq = VirtualQueryResult {
            result: 1,
            protection: 0x04,
            mem_type: 0x20000,
            base: 0x1122_3344_5566_7788,
            size: 0x1000,
        };
        let mut b = Vec::new();
        vq.write_to(&mut b)?;
        assert_eq!(b[0], 1);
        assert_eq!(&b[1..5], &0x04u32.to_ne_bytes());
        assert_eq!(&b[5..9], &0x20000u32.to_ne_bytes());
        assert_eq!(&b[9..17], &0x1122_3344_5566_7788u64.to_ne_bytes());
        assert_eq!(&b[17..25], &0x1000u64.to_ne_bytes());
        Ok(())
    }
}
