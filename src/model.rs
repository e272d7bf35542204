//! Value types: процессы, потоки, VAD-записи и регионы памяти.
//!
//! Notes:
//! - `VadEntry` — то, что отдаёт backend (сырое слово флагов как у MemProcFS).
//! - `MemoryRegion` — то, что хранится в module-snapshot и уходит в протокол.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
}

impl ProcessInfo {
    pub fn new(name: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            pid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: u32,
    pub pid: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryModel {
    #[default]
    Unknown,
    Na,
    X86,
    X86Pae,
    X64,
    Arm64,
}

// ---------- VAD flag word ----------

pub const VAD_TYPE_MASK: u32 = 0x7;
pub const VAD_PROTECTION_SHIFT: u32 = 3;
pub const VAD_PROTECTION_MASK: u32 = 0x1f;
pub const VAD_F_IMAGE: u32 = 1 << 8;
pub const VAD_F_FILE: u32 = 1 << 9;
pub const VAD_F_PAGEFILE: u32 = 1 << 10;
pub const VAD_F_PRIVATE_MEMORY: u32 = 1 << 11;
pub const VAD_F_TEB: u32 = 1 << 12;
pub const VAD_F_STACK: u32 = 1 << 13;
pub const VAD_HEAP_NUM_SHIFT: u32 = 16;
pub const VAD_HEAP_NUM_MASK: u32 = 0x7f;
pub const VAD_F_HEAP: u32 = 1 << 23;

/// Одна VAD-запись процесса. `end` — включительно.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VadEntry {
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub text: String,
}

impl VadEntry {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }

    /// Собрать слово флагов из типа VAD и 5-битной защиты.
    pub fn with_kind(mut self, vad_type: u8, protection: u8) -> Self {
        self.flags &= !(VAD_TYPE_MASK | (VAD_PROTECTION_MASK << VAD_PROTECTION_SHIFT));
        self.flags |= (vad_type as u32) & VAD_TYPE_MASK;
        self.flags |= ((protection as u32) & VAD_PROTECTION_MASK) << VAD_PROTECTION_SHIFT;
        self
    }

    pub fn with_flag(mut self, flag: u32) -> Self {
        self.flags |= flag;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn vad_type(&self) -> u8 {
        (self.flags & VAD_TYPE_MASK) as u8
    }

    pub fn protection(&self) -> u8 {
        ((self.flags >> VAD_PROTECTION_SHIFT) & VAD_PROTECTION_MASK) as u8
    }

    pub fn heap_number(&self) -> u8 {
        ((self.flags >> VAD_HEAP_NUM_SHIFT) & VAD_HEAP_NUM_MASK) as u8
    }

    #[inline]
    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Синтетическое имя региона, если backend не дал текст.
    /// Порядок важен: heap > stack > pagefile > file > image > teb.
    pub fn placeholder_name(&self) -> &'static str {
        if self.has(VAD_F_HEAP) {
            "<heap>"
        } else if self.has(VAD_F_STACK) {
            "<stack>"
        } else if self.has(VAD_F_PAGEFILE) {
            "<pagefile>"
        } else if self.has(VAD_F_FILE) {
            "<file>"
        } else if self.has(VAD_F_IMAGE) {
            "<image>"
        } else if self.has(VAD_F_TEB) {
            "<teb>"
        } else {
            "<unknown>"
        }
    }
}

/// Регион памяти в module-snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    pub start: u64,
    pub size: u64,
    pub file_offset: u32,
    pub part: i32,
    /// Сырые 5 бит защиты из VAD.
    pub protection: u8,
    pub private_memory: bool,
    pub vad_type: u8,
    pub name: String,
}

impl MemoryRegion {
    /// Последний адрес региона (включительно).
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size.saturating_sub(1))
    }

    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address <= self.end()
    }
}

impl From<&VadEntry> for MemoryRegion {
    fn from(vad: &VadEntry) -> Self {
        let name = if vad.text.is_empty() {
            vad.placeholder_name().to_string()
        } else {
            vad.text.clone()
        };
        Self {
            start: vad.start,
            size: vad.end.wrapping_sub(vad.start).wrapping_add(1),
            file_offset: 0,
            part: 0,
            protection: vad.protection(),
            private_memory: vad.has(VAD_F_PRIVATE_MEMORY),
            vad_type: vad.vad_type(),
            name,
        }
    }
}
