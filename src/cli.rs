//! CLI сервера: флаги поверх ServerConfig::from_env(), выбор backend'а, запуск.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;

use crate::backend::{FixtureBackend, MemoryBackend};
use crate::config::ServerConfig;
use crate::memory::MemoryEngine;
use crate::metrics_http::MetricsExporter;
use crate::server::Server;

#[derive(Parser, Debug)]
#[command(
    name = "ceserver",
    version,
    about = "Cheat Engine network server backed by DMA memory access"
)]
pub struct Cli {
    /// TCP port (env CES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bind address (env CES_BIND)
    #[arg(long)]
    pub bind: Option<String>,

    /// Serve a JSON fixture instead of a DMA device
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Prometheus exporter address, e.g. 127.0.0.1:9900 (env CES_METRICS_ADDR)
    #[arg(long)]
    pub metrics_addr: Option<String>,

    /// Path to vmm.so / vmm.dll
    #[cfg(feature = "memprocfs")]
    #[arg(long, default_value = "vmm.so")]
    pub vmm_lib: String,

    /// MemProcFS device string
    #[cfg(feature = "memprocfs")]
    #[arg(long, default_value = crate::consts::DEFAULT_DMA_DEVICE)]
    pub device: String,

    /// Where to write the physical memory map
    #[cfg(feature = "memprocfs")]
    #[arg(long, default_value = crate::consts::MEMMAP_FILE)]
    pub memmap: PathBuf,
}

impl Cli {
    /// env -> CLI overrides.
    pub fn server_config(&self) -> ServerConfig {
        let mut cfg = ServerConfig::from_env();
        if let Some(p) = self.port {
            cfg = cfg.with_port(p);
        }
        if let Some(b) = &self.bind {
            cfg = cfg.with_bind_addr(b.clone());
        }
        if self.metrics_addr.is_some() {
            cfg = cfg.with_metrics_addr(self.metrics_addr.clone());
        }
        cfg
    }

    fn open_backend(&self) -> Result<Arc<dyn MemoryBackend>> {
        if let Some(path) = &self.fixture {
            return Ok(Arc::new(FixtureBackend::load(path)?));
        }
        #[cfg(feature = "memprocfs")]
        {
            let b = crate::backend::memprocfs::MemProcFsBackend::open(
                &self.vmm_lib,
                &self.device,
                &self.memmap,
            )?;
            return Ok(Arc::new(b));
        }
        #[allow(unreachable_code)]
        Err(anyhow!(
            "no backend configured: pass --fixture <file> or build with --features memprocfs"
        ))
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cli.server_config();
    info!("{}", cfg);

    let backend = cli.open_backend()?;
    info!("backend: {}", backend.describe());

    let engine = Arc::new(MemoryEngine::new(backend, cfg.engine_config()));
    engine.start()?;

    let _exporter = match &cfg.metrics_addr {
        Some(addr) => Some(MetricsExporter::spawn(addr)?),
        None => None,
    };

    let server = Server::bind(&cfg, Arc::clone(&engine))?;
    let res = server.run();

    engine.shutdown();
    engine.log_summary();
    res
}
