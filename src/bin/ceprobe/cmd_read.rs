use anyhow::{Context, Result};
use std::path::PathBuf;

use ceserver_dma::util::hex_dump;
use ceserver_dma::CeClient;

pub fn exec(addr: &str, pid: u32, address: u64, size: u32, out: Option<PathBuf>) -> Result<()> {
    let mut c = CeClient::connect(addr)?;
    c.set_connection_name("ceprobe")?;
    let h = c.open_process(pid)?;
    let bytes = c.read_memory(h, address, size)?;
    c.close_handle(h)?;
    c.close()?;

    if bytes.is_empty() {
        println!("read {}:{:#x}+{}: nothing returned", pid, address, size);
        return Ok(());
    }
    if bytes.len() < size as usize {
        eprintln!("partial read: {} of {} bytes", bytes.len(), size);
    }

    match out {
        Some(path) => {
            std::fs::write(&path, &bytes)
                .with_context(|| format!("write {}", path.display()))?;
            println!("{} bytes -> {}", bytes.len(), path.display());
        }
        None => print!("{}", hex_dump(address, &bytes)),
    }
    Ok(())
}
