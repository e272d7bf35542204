//! Константы протокола ceserver и дефолты движка памяти.
//!
//! Все значения совпадают с тем, что ожидает сетевой клиент Cheat Engine:
//! коды команд, флаги snapshot/virtual-query, таблица PAGE_*/MEM_* (Win32).

// -------- Version / ABI --------
pub const CESERVER_VERSION: i32 = 6;
pub const CESERVER_VERSION_NAME: &str = "CHEATENGINE Network 2.3";
pub const ABI_WINDOWS: u8 = 0;

pub const DEFAULT_PORT: u16 = 52736;
pub const DEFAULT_BIND: &str = "0.0.0.0";

// -------- Command codes --------
pub const CMD_GETVERSION: u8 = 0;
pub const CMD_CLOSECONNECTION: u8 = 1;
pub const CMD_TERMINATESERVER: u8 = 2;
pub const CMD_OPENPROCESS: u8 = 3;
pub const CMD_CREATETOOLHELP32SNAPSHOT: u8 = 4;
pub const CMD_PROCESS32FIRST: u8 = 5;
pub const CMD_PROCESS32NEXT: u8 = 6;
pub const CMD_CLOSEHANDLE: u8 = 7;
pub const CMD_VIRTUALQUERYEX: u8 = 8;
pub const CMD_READPROCESSMEMORY: u8 = 9;
pub const CMD_WRITEPROCESSMEMORY: u8 = 10;
pub const CMD_STARTDEBUG: u8 = 11;
pub const CMD_STOPDEBUG: u8 = 12;
pub const CMD_WAITFORDEBUGEVENT: u8 = 13;
pub const CMD_CONTINUEFROMDEBUGEVENT: u8 = 14;
pub const CMD_SETBREAKPOINT: u8 = 15;
pub const CMD_REMOVEBREAKPOINT: u8 = 16;
pub const CMD_SUSPENDTHREAD: u8 = 17;
pub const CMD_RESUMETHREAD: u8 = 18;
pub const CMD_GETTHREADCONTEXT: u8 = 19;
pub const CMD_SETTHREADCONTEXT: u8 = 20;
pub const CMD_GETARCHITECTURE: u8 = 21;
pub const CMD_MODULE32FIRST: u8 = 22;
pub const CMD_MODULE32NEXT: u8 = 23;
pub const CMD_GETSYMBOLLISTFROMFILE: u8 = 24;
pub const CMD_LOADEXTENSION: u8 = 25;
pub const CMD_ALLOC: u8 = 26;
pub const CMD_FREE: u8 = 27;
pub const CMD_CREATETHREAD: u8 = 28;
pub const CMD_LOADMODULE: u8 = 29;
pub const CMD_SPEEDHACK_SETSPEED: u8 = 30;
pub const CMD_VIRTUALQUERYEXFULL: u8 = 31;
pub const CMD_GETREGIONINFO: u8 = 32;
pub const CMD_GETABI: u8 = 33;
pub const CMD_SET_CONNECTION_NAME: u8 = 34;
pub const CMD_CREATETOOLHELP32SNAPSHOTEX: u8 = 35;
pub const CMD_CHANGEMEMORYPROTECTION: u8 = 36;
pub const CMD_GETOPTIONS: u8 = 37;
pub const CMD_GETOPTIONVALUE: u8 = 38;
pub const CMD_SETOPTIONVALUE: u8 = 39;
pub const CMD_PTRACE_MMAP: u8 = 40;
pub const CMD_OPENNAMEDPIPE: u8 = 41;
pub const CMD_PIPEREAD: u8 = 42;
pub const CMD_PIPEWRITE: u8 = 43;
pub const CMD_GETCESERVERPATH: u8 = 44;
pub const CMD_ISANDROID: u8 = 45;
pub const CMD_LOADMODULEEX: u8 = 46;
pub const CMD_SETCURRENTPATH: u8 = 47;
pub const CMD_GETCURRENTPATH: u8 = 48;
pub const CMD_ENUMFILES: u8 = 49;
pub const CMD_GETFILEPERMISSIONS: u8 = 50;
pub const CMD_SETFILEPERMISSIONS: u8 = 51;
pub const CMD_GETFILE: u8 = 52;
pub const CMD_PUTFILE: u8 = 53;
pub const CMD_CREATEDIR: u8 = 54;
pub const CMD_DELETEFILE: u8 = 55;
pub const CMD_AOBSCAN: u8 = 200;
pub const CMD_COMMANDLIST2: u8 = 255;

// -------- CreateToolhelp32Snapshot flags --------
pub const TH32CS_SNAPPROCESS: u32 = 0x2;
pub const TH32CS_SNAPTHREAD: u32 = 0x4;
pub const TH32CS_SNAPMODULE: u32 = 0x8;
pub const TH32CS_SNAPMODULE32: u32 = 0x10;

// -------- VirtualQueryExFull flags (принимаются, но не используются) --------
pub const VQE_PAGEDONLY: u8 = 1;
pub const VQE_DIRTYONLY: u8 = 2;
pub const VQE_NOSHARED: u8 = 4;

// -------- Win32 page protection --------
pub const PAGE_NOACCESS: u32 = 0x01;
pub const PAGE_READONLY: u32 = 0x02;
pub const PAGE_READWRITE: u32 = 0x04;
pub const PAGE_WRITECOPY: u32 = 0x08;
pub const PAGE_EXECUTE: u32 = 0x10;
pub const PAGE_EXECUTE_READ: u32 = 0x20;
pub const PAGE_EXECUTE_READWRITE: u32 = 0x40;
pub const PAGE_EXECUTE_WRITECOPY: u32 = 0x80;
pub const PAGE_GUARD: u32 = 0x100;
pub const PAGE_NOCACHE: u32 = 0x200;
pub const PAGE_WRITECOMBINE: u32 = 0x400;

// -------- Win32 memory type --------
pub const MEM_PRIVATE: u32 = 0x20000;
pub const MEM_MAPPED: u32 = 0x40000;
pub const MEM_IMAGE: u32 = 0x1000000;

// -------- Architecture byte (GETARCHITECTURE) --------
pub const ARCH_X86: u8 = 0;
pub const ARCH_X64: u8 = 1;
pub const ARCH_ARM64: u8 = 3;
pub const ARCH_UNKNOWN: u8 = 0xFF;

// -------- Region names --------
/// Максимальная длина имени региона в ответе GETREGIONINFO.
pub const REGION_NAME_MAX: usize = 127;
pub const VAD_TYPE_IMAGE: u8 = 2;

// -------- Memory engine defaults --------
pub const DEFAULT_DISPATCH_BUILD_US: u64 = 2_000;
pub const DEFAULT_BACKOFF_EXTEND_US: u64 = 500;
pub const DEFAULT_MAX_DISPATCH_SIZE: usize = 256;
pub const DEFAULT_MAX_DISPATCH_BYTES: usize = 1_000_000_000;
/// Батчи размером <= порога читаются последовательно, остальные — scatter.
pub const DEFAULT_SCATTER_THRESHOLD: usize = 1;

/// Верхняя граница payload'а WRITEPROCESSMEMORY.
pub const MAX_WRITE_SIZE: usize = 64 * 1024 * 1024;

// -------- Legacy handle probe (GETARCHITECTURE) --------
pub const DEFAULT_LEGACY_PROBE_MS: u64 = 1_000;
pub const DEFAULT_LEGACY_PROBE_STEP_MS: u64 = 100;

// -------- Backend --------
pub const MEMMAP_FILE: &str = "mmap.txt";
pub const DEFAULT_DMA_DEVICE: &str = "fpga";
