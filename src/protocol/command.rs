//! Коды команд ceserver.

use std::fmt;

use crate::consts::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    GetVersion = CMD_GETVERSION,
    CloseConnection = CMD_CLOSECONNECTION,
    TerminateServer = CMD_TERMINATESERVER,
    OpenProcess = CMD_OPENPROCESS,
    CreateToolhelp32Snapshot = CMD_CREATETOOLHELP32SNAPSHOT,
    Process32First = CMD_PROCESS32FIRST,
    Process32Next = CMD_PROCESS32NEXT,
    CloseHandle = CMD_CLOSEHANDLE,
    VirtualQueryEx = CMD_VIRTUALQUERYEX,
    ReadProcessMemory = CMD_READPROCESSMEMORY,
    WriteProcessMemory = CMD_WRITEPROCESSMEMORY,
    StartDebug = CMD_STARTDEBUG,
    StopDebug = CMD_STOPDEBUG,
    WaitForDebugEvent = CMD_WAITFORDEBUGEVENT,
    ContinueFromDebugEvent = CMD_CONTINUEFROMDEBUGEVENT,
    SetBreakpoint = CMD_SETBREAKPOINT,
    RemoveBreakpoint = CMD_REMOVEBREAKPOINT,
    SuspendThread = CMD_SUSPENDTHREAD,
    ResumeThread = CMD_RESUMETHREAD,
    GetThreadContext = CMD_GETTHREADCONTEXT,
    SetThreadContext = CMD_SETTHREADCONTEXT,
    GetArchitecture = CMD_GETARCHITECTURE,
    Module32First = CMD_MODULE32FIRST,
    Module32Next = CMD_MODULE32NEXT,
    GetSymbolListFromFile = CMD_GETSYMBOLLISTFROMFILE,
    LoadExtension = CMD_LOADEXTENSION,
    Alloc = CMD_ALLOC,
    Free = CMD_FREE,
    CreateThread = CMD_CREATETHREAD,
    LoadModule = CMD_LOADMODULE,
    SpeedhackSetSpeed = CMD_SPEEDHACK_SETSPEED,
    VirtualQueryExFull = CMD_VIRTUALQUERYEXFULL,
    GetRegionInfo = CMD_GETREGIONINFO,
    GetAbi = CMD_GETABI,
    SetConnectionName = CMD_SET_CONNECTION_NAME,
    CreateToolhelp32SnapshotEx = CMD_CREATETOOLHELP32SNAPSHOTEX,
    ChangeMemoryProtection = CMD_CHANGEMEMORYPROTECTION,
    GetOptions = CMD_GETOPTIONS,
    GetOptionValue = CMD_GETOPTIONVALUE,
    SetOptionValue = CMD_SETOPTIONVALUE,
    PtraceMmap = CMD_PTRACE_MMAP,
    OpenNamedPipe = CMD_OPENNAMEDPIPE,
    PipeRead = CMD_PIPEREAD,
    PipeWrite = CMD_PIPEWRITE,
    GetCeServerPath = CMD_GETCESERVERPATH,
    IsAndroid = CMD_ISANDROID,
    LoadModuleEx = CMD_LOADMODULEEX,
    SetCurrentPath = CMD_SETCURRENTPATH,
    GetCurrentPath = CMD_GETCURRENTPATH,
    EnumFiles = CMD_ENUMFILES,
    GetFilePermissions = CMD_GETFILEPERMISSIONS,
    SetFilePermissions = CMD_SETFILEPERMISSIONS,
    GetFile = CMD_GETFILE,
    PutFile = CMD_PUTFILE,
    CreateDir = CMD_CREATEDIR,
    DeleteFile = CMD_DELETEFILE,
    AobScan = CMD_AOBSCAN,
    CommandList2 = CMD_COMMANDLIST2,
}

impl Command {
    pub fn from_u8(code: u8) -> Option<Self> {
        use Command::*;
        let c = match code {
            CMD_GETVERSION => GetVersion,
            CMD_CLOSECONNECTION => CloseConnection,
            CMD_TERMINATESERVER => TerminateServer,
            CMD_OPENPROCESS => OpenProcess,
            CMD_CREATETOOLHELP32SNAPSHOT => CreateToolhelp32Snapshot,
            CMD_PROCESS32FIRST => Process32First,
            CMD_PROCESS32NEXT => Process32Next,
            CMD_CLOSEHANDLE => CloseHandle,
            CMD_VIRTUALQUERYEX => VirtualQueryEx,
            CMD_READPROCESSMEMORY => ReadProcessMemory,
            CMD_WRITEPROCESSMEMORY => WriteProcessMemory,
            CMD_STARTDEBUG => StartDebug,
            CMD_STOPDEBUG => StopDebug,
            CMD_WAITFORDEBUGEVENT => WaitForDebugEvent,
            CMD_CONTINUEFROMDEBUGEVENT => ContinueFromDebugEvent,
            CMD_SETBREAKPOINT => SetBreakpoint,
            CMD_REMOVEBREAKPOINT => RemoveBreakpoint,
            CMD_SUSPENDTHREAD => SuspendThread,
            CMD_RESUMETHREAD => ResumeThread,
            CMD_GETTHREADCONTEXT => GetThreadContext,
            CMD_SETTHREADCONTEXT => SetThreadContext,
            CMD_GETARCHITECTURE => GetArchitecture,
            CMD_MODULE32FIRST => Module32First,
            CMD_MODULE32NEXT => Module32Next,
            CMD_GETSYMBOLLISTFROMFILE => GetSymbolListFromFile,
            CMD_LOADEXTENSION => LoadExtension,
            CMD_ALLOC => Alloc,
            CMD_FREE => Free,
            CMD_CREATETHREAD => CreateThread,
            CMD_LOADMODULE => LoadModule,
            CMD_SPEEDHACK_SETSPEED => SpeedhackSetSpeed,
            CMD_VIRTUALQUERYEXFULL => VirtualQueryExFull,
            CMD_GETREGIONINFO => GetRegionInfo,
            CMD_GETABI => GetAbi,
            CMD_SET_CONNECTION_NAME => SetConnectionName,
            CMD_CREATETOOLHELP32SNAPSHOTEX => CreateToolhelp32SnapshotEx,
            CMD_CHANGEMEMORYPROTECTION => ChangeMemoryProtection,
            CMD_GETOPTIONS => GetOptions,
            CMD_GETOPTIONVALUE => GetOptionValue,
            CMD_SETOPTIONVALUE => SetOptionValue,
            CMD_PTRACE_MMAP => PtraceMmap,
            CMD_OPENNAMEDPIPE => OpenNamedPipe,
            CMD_PIPEREAD => PipeRead,
            CMD_PIPEWRITE => PipeWrite,
            CMD_GETCESERVERPATH => GetCeServerPath,
            CMD_ISANDROID => IsAndroid,
            CMD_LOADMODULEEX => LoadModuleEx,
            CMD_SETCURRENTPATH => SetCurrentPath,
            CMD_GETCURRENTPATH => GetCurrentPath,
            CMD_ENUMFILES => EnumFiles,
            CMD_GETFILEPERMISSIONS => GetFilePermissions,
            CMD_SETFILEPERMISSIONS => SetFilePermissions,
            CMD_GETFILE => GetFile,
            CMD_PUTFILE => PutFile,
            CMD_CREATEDIR => CreateDir,
            CMD_DELETEFILE => DeleteFile,
            CMD_AOBSCAN => AobScan,
            CMD_COMMANDLIST2 => CommandList2,
            _ => return None,
        };
        Some(c)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Имя как в исходном протоколе (CMD_*), для логов.
    pub fn name(self) -> &'static str {
        use Command::*;
        match self {
            GetVersion => "CMD_GETVERSION",
            CloseConnection => "CMD_CLOSECONNECTION",
            TerminateServer => "CMD_TERMINATESERVER",
            OpenProcess => "CMD_OPENPROCESS",
            CreateToolhelp32Snapshot => "CMD_CREATETOOLHELP32SNAPSHOT",
            Process32First => "CMD_PROCESS32FIRST",
            Process32Next => "CMD_PROCESS32NEXT",
            CloseHandle => "CMD_CLOSEHANDLE",
            VirtualQueryEx => "CMD_VIRTUALQUERYEX",
            ReadProcessMemory => "CMD_READPROCESSMEMORY",
            WriteProcessMemory => "CMD_WRITEPROCESSMEMORY",
            StartDebug => "CMD_STARTDEBUG",
            StopDebug => "CMD_STOPDEBUG",
            WaitForDebugEvent => "CMD_WAITFORDEBUGEVENT",
            ContinueFromDebugEvent => "CMD_CONTINUEFROMDEBUGEVENT",
            SetBreakpoint => "CMD_SETBREAKPOINT",
            RemoveBreakpoint => "CMD_REMOVEBREAKPOINT",
            SuspendThread => "CMD_SUSPENDTHREAD",
            ResumeThread => "CMD_RESUMETHREAD",
            GetThreadContext => "CMD_GETTHREADCONTEXT",
            SetThreadContext => "CMD_SETTHREADCONTEXT",
            GetArchitecture => "CMD_GETARCHITECTURE",
            Module32First => "CMD_MODULE32FIRST",
            Module32Next => "CMD_MODULE32NEXT",
            GetSymbolListFromFile => "CMD_GETSYMBOLLISTFROMFILE",
            LoadExtension => "CMD_LOADEXTENSION",
            Alloc => "CMD_ALLOC",
            Free => "CMD_FREE",
            CreateThread => "CMD_CREATETHREAD",
            LoadModule => "CMD_LOADMODULE",
            SpeedhackSetSpeed => "CMD_SPEEDHACK_SETSPEED",
            VirtualQueryExFull => "CMD_VIRTUALQUERYEXFULL",
            GetRegionInfo => "CMD_GETREGIONINFO",
            GetAbi => "CMD_GETABI",
            SetConnectionName => "CMD_SET_CONNECTION_NAME",
            CreateToolhelp32SnapshotEx => "CMD_CREATETOOLHELP32SNAPSHOTEX",
            ChangeMemoryProtection => "CMD_CHANGEMEMORYPROTECTION",
            GetOptions => "CMD_GETOPTIONS",
            GetOptionValue => "CMD_GETOPTIONVALUE",
            SetOptionValue => "CMD_SETOPTIONVALUE",
            PtraceMmap => "CMD_PTRACE_MMAP",
            OpenNamedPipe => "CMD_OPENNAMEDPIPE",
            PipeRead => "CMD_PIPEREAD",
            PipeWrite => "CMD_PIPEWRITE",
            GetCeServerPath => "CMD_GETCESERVERPATH",
            IsAndroid => "CMD_ISANDROID",
            LoadModuleEx => "CMD_LOADMODULEEX",
            SetCurrentPath => "CMD_SETCURRENTPATH",
            GetCurrentPath => "CMD_GETCURRENTPATH",
            EnumFiles => "CMD_ENUMFILES",
            GetFilePermissions => "CMD_GETFILEPERMISSIONS",
            SetFilePermissions => "CMD_SETFILEPERMISSIONS",
            GetFile => "CMD_GETFILE",
            PutFile => "CMD_PUTFILE",
            CreateDir => "CMD_CREATEDIR",
            DeleteFile => "CMD_DELETEFILE",
            AobScan => "CMD_AOBSCAN",
            CommandList2 => "CMD_COMMANDLIST2",
        }
    }

    /// Команды, которые сервер обрабатывает (остальные известные -> close).
    pub fn is_implemented(self) -> bool {
        use Command::*;
        matches!(
            self,
            GetVersion
                | CloseConnection
                | TerminateServer
                | OpenProcess
                | CreateToolhelp32Snapshot
                | Process32First
                | Process32Next
                | CloseHandle
                | VirtualQueryEx
                | ReadProcessMemory
                | WriteProcessMemory
                | StartDebug
                | GetArchitecture
                | Module32First
                | Module32Next
                | GetSymbolListFromFile
                | VirtualQueryExFull
                | GetRegionInfo
                | GetAbi
                | SetConnectionName
                | CreateToolhelp32SnapshotEx
                | GetOptions
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_and_gaps() {
        let mut known = 0;
        for code in 0..=255u8 {
            if let Some(c) = Command::from_u8(code) {
                assert_eq!(c.code(), code);
                known += 1;
            }
        }
        // 0..=55, 200, 255
        assert_eq!(known, 58);
        assert_eq!(Command::from_u8(56), None);
        assert_eq!(Command::from_u8(199), None);
        assert!(Command::GetRegionInfo.is_implemented());
        assert!(!Command::SetBreakpoint.is_implemented());
        assert_eq!(Command::AobScan.to_string(), "CMD_AOBSCAN (200)");
    }
}
