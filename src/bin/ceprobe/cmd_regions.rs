use anyhow::{anyhow, Result};
use serde_json::json;

use ceserver_dma::consts::{MEM_IMAGE, MEM_MAPPED, MEM_PRIVATE};
use ceserver_dma::CeClient;

fn type_name(t: u32) -> &'static str {
    match t {
        MEM_IMAGE => "image",
        MEM_MAPPED => "mapped",
        MEM_PRIVATE => "private",
        _ => "-",
    }
}

pub fn exec(addr: &str, pid: u32, address: Option<u64>, json: bool) -> Result<()> {
    let mut c = CeClient::connect(addr)?;
    c.set_connection_name("ceprobe")?;
    let h = c.open_process(pid)?;

    if let Some(a) = address {
        let info = c.region_info(h, a)?;
        if info.query.result == 0 {
            c.close_handle(h)?;
            c.close()?;
            return Err(anyhow!("no region contains {:#x} in pid {}", a, pid));
        }
        let q = info.query;
        if json {
            let v = json!({
                "base": format!("{:#x}", q.base),
                "size": q.size,
                "protection": format!("{:#x}", q.protection),
                "type": type_name(q.mem_type),
                "name": info.name,
            });
            println!("{}", serde_json::to_string_pretty(&v)?);
        } else {
            println!(
                "{:016x}  {:>12x}  prot={:#05x}  {:<7}  {}",
                q.base,
                q.size,
                q.protection,
                type_name(q.mem_type),
                info.name
            );
        }
    } else {
        let regions = c.virtual_query_full(h, 0)?;
        if json {
            let arr: Vec<_> = regions
                .iter()
                .map(|r| {
                    json!({
                        "base": format!("{:#x}", r.base),
                        "size": r.size,
                        "protection": format!("{:#x}", r.protection),
                        "type": type_name(r.mem_type),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&arr)?);
        } else {
            for r in &regions {
                println!(
                    "{:016x}  {:>12x}  prot={:#05x}  {}",
                    r.base,
                    r.size,
                    r.protection,
                    type_name(r.mem_type)
                );
            }
            println!("{} regions", regions.len());
        }
    }

    c.close_handle(h)?;
    c.close()
}
