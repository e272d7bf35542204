use anyhow::Result;
use serde_json::json;

use ceserver_dma::CeClient;

pub fn exec(addr: &str, pid: u32, json: bool) -> Result<()> {
    let mut c = CeClient::connect(addr)?;
    c.set_connection_name("ceprobe")?;
    let mods = c.modules_ex(pid)?;

    if json {
        let arr: Vec<_> = mods
            .iter()
            .map(|m| {
                json!({
                    "base": format!("{:#x}", m.base),
                    "size": m.size,
                    "part": m.part,
                    "name": m.name,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&arr)?);
    } else {
        for m in &mods {
            println!("{:016x}  {:>10x}  {}", m.base, m.size as u32, m.name);
        }
        println!("{} regions in pid {}", mods.len(), pid);
    }
    c.close()
}
