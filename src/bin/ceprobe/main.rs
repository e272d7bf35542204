use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};

mod cli;
mod cmd_modules;
mod cmd_ps;
mod cmd_read;
mod cmd_regions;
mod cmd_version;

fn init_logger() {
    // RUST_LOG=debug ceprobe ps
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);
    match cli.cmd {
        cli::Cmd::Version => cmd_version::exec(&addr),

        cli::Cmd::Ps { json } => cmd_ps::exec(&addr, json),

        cli::Cmd::Modules { pid, json } => cmd_modules::exec(&addr, pid, json),

        cli::Cmd::Regions { pid, address, json } => cmd_regions::exec(&addr, pid, address, json),

        cli::Cmd::Read { pid, address, size, out } => cmd_read::exec(&addr, pid, address, size, out),
    }
}
