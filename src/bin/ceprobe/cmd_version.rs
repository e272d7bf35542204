use anyhow::Result;

use ceserver_dma::CeClient;

pub fn exec(addr: &str) -> Result<()> {
    let mut c = CeClient::connect(addr)?;
    let v = c.get_version()?;
    let abi = c.get_abi()?;
    println!("{} (protocol version {})", v.name, v.version);
    println!("abi: {}", if abi == 0 { "windows" } else { "other" });
    c.close()
}
