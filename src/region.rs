//! Перевод VAD-защиты в Win32-константы для VIRTUALQUERYEX / GETREGIONINFO.
//!
//! Дескриптор — 6 символов: `[p][n|g|m][r][w][x][c]`
//!   0: private
//!   1: no-cache / guard / write-combine (старшие 2 бита защиты)
//!   2: read (включая copy-on-write read)
//!   3: write
//!   4: execute
//!   5: copy-on-write

use crate::consts::{
    MEM_IMAGE, MEM_MAPPED, MEM_PRIVATE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_READONLY,
    PAGE_READWRITE, VAD_TYPE_IMAGE,
};
use crate::model::MemoryRegion;

pub fn protection_descriptor(protection: u8, private_memory: bool) -> [u8; 6] {
    let vh = (protection >> 3) & 0x3;
    let vl = protection & 0x7;

    let mut sz = [b'-'; 6];
    if private_memory {
        sz[0] = b'p';
    }
    sz[1] = match (vh & 2 != 0, vh & 1 != 0) {
        (true, true) => b'm',
        (true, false) => b'g',
        (false, true) => b'n',
        (false, false) => b'-',
    };
    if matches!(vl, 1 | 3 | 4 | 6) {
        sz[2] = b'r';
    }
    if vl & 4 != 0 {
        sz[3] = b'w';
    }
    if vl & 2 != 0 {
        sz[4] = b'x';
    }
    if matches!(vl, 5 | 7) {
        sz[5] = b'c';
    }
    // модификатор без прав доступа не имеет смысла
    if sz[1] != b'-' && sz[2..].iter().all(|&c| c == b'-') {
        sz[1] = b'-';
    }
    sz
}

pub fn win32_protection(region: &MemoryRegion) -> u32 {
    let sz = protection_descriptor(region.protection, region.private_memory);
    let writable = sz[3] == b'w';
    let executable = sz[4] == b'x';
    match (executable, writable) {
        (true, true) => PAGE_EXECUTE_READWRITE,
        (true, false) => PAGE_EXECUTE_READ,
        (false, true) => PAGE_READWRITE,
        (false, false) => PAGE_READONLY,
    }
}

pub fn win32_type(region: &MemoryRegion) -> u32 {
    if region.private_memory {
        MEM_PRIVATE
    } else if region.vad_type == VAD_TYPE_IMAGE {
        MEM_IMAGE
    } else {
        MEM_MAPPED
    }
}

/// Имя региона, обрезанное до `max` байт (по байтам, не по символам).
pub fn truncated_name(region: &MemoryRegion, max: usize) -> &[u8] {
    let b = region.name.as_bytes();
    &b[..b.len().min(max)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{VadEntry, VAD_F_PRIVATE_MEMORY};

    fn region(vad_type: u8, protection: u8, private: bool) -> MemoryRegion {
        let mut vad = VadEntry::new(0x10000, 0x1ffff).with_kind(vad_type, protection);
        if private {
            vad = vad.with_flag(VAD_F_PRIVATE_MEMORY);
        }
        MemoryRegion::from(&vad)
    }

    #[test]
    fn descriptor_bits() {
        assert_eq!(&protection_descriptor(1, false), b"--r---");
        assert_eq!(&protection_descriptor(4, true), b"p-rw--");
        assert_eq!(&protection_descriptor(6, false), b"--rwx-");
        assert_eq!(&protection_descriptor(7, false), b"---wxc");
        assert_eq!(&protection_descriptor(5, false), b"---w-c");
        // no-cache + read
        assert_eq!(&protection_descriptor(0x09, false), b"-nr---");
        // guard без прав -> модификатор сбрасывается
        assert_eq!(&protection_descriptor(0x10, false), b"------");
    }

    #[test]
    fn readonly_mapped() {
        let r = region(0, 1, false);
        assert_eq!(win32_protection(&r), PAGE_READONLY);
        assert_eq!(win32_type(&r), MEM_MAPPED);
    }

    #[test]
    fn exec_write_image() {
        let r = region(2, 6, false);
        assert_eq!(win32_protection(&r), PAGE_EXECUTE_READWRITE);
        assert_eq!(win32_type(&r), MEM_IMAGE);
    }

    #[test]
    fn exec_only_and_write_only() {
        assert_eq!(win32_protection(&region(0, 2, false)), PAGE_EXECUTE_READ);
        assert_eq!(win32_protection(&region(0, 3, false)), PAGE_EXECUTE_READ);
        assert_eq!(win32_protection(&region(0, 4, false)), PAGE_READWRITE);
    }

    #[test]
    fn private_wins_over_vad_type() {
        for t in 0..8u8 {
            assert_eq!(win32_type(&region(t, 4, true)), MEM_PRIVATE);
        }
    }

    #[test]
    fn name_truncation() {
        let mut r = region(0, 1, false);
        r.name = "a".repeat(200);
        assert_eq!(truncated_name(&r, 127).len(), 127);
        r.name = "b".repeat(127);
        assert_eq!(truncated_name(&r, 127), r.name.as_bytes());
        r.name = "short".into();
        assert_eq!(truncated_name(&r, 127), b"short");
    }
}
