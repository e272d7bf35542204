use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ceserver_dma::consts::DEFAULT_PORT;
use ceserver_dma::util::{parse_u32, parse_u64};

/// Probe a running ceserver from the command line
#[derive(Parser, Debug)]
#[command(name = "ceprobe", version, about = "ceserver protocol probe")]
pub struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Server version string and ABI
    Version,
    /// List processes
    Ps {
        #[arg(long)]
        json: bool,
    },
    /// Stream the module (VAD) snapshot of a process
    Modules {
        #[arg(long, value_parser = parse_u32)]
        pid: u32,
        #[arg(long)]
        json: bool,
    },
    /// Region table of a process, or the region containing --address
    Regions {
        #[arg(long, value_parser = parse_u32)]
        pid: u32,
        #[arg(long, value_parser = parse_u64)]
        address: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Read memory and print a hex dump
    Read {
        #[arg(long, value_parser = parse_u32)]
        pid: u32,
        #[arg(long, value_parser = parse_u64)]
        address: u64,
        #[arg(long, value_parser = parse_u32, default_value = "256")]
        size: u32,
        /// Write raw bytes to a file instead of dumping
        #[arg(long)]
        out: Option<PathBuf>,
    },
}
