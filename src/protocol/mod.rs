//! Протокол ceserver: коды команд и упакованные wire-структуры.

pub mod command;
pub mod wire;

pub use command::Command;
pub use wire::{
    ModuleEntry, ProcessEntry, VersionReply, VirtualQueryFullRecord, VirtualQueryResult,
    MODULE_ENTRY_SIZE, PROCESS_ENTRY_SIZE, VQ_FULL_RECORD_SIZE, VQ_RESULT_SIZE,
};
