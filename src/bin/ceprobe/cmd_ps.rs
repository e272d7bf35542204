use anyhow::Result;
use serde_json::json;

use ceserver_dma::CeClient;

pub fn exec(addr: &str, json: bool) -> Result<()> {
    let mut c = CeClient::connect(addr)?;
    c.set_connection_name("ceprobe")?;
    let procs = c.processes()?;

    if json {
        let arr: Vec<_> = procs
            .iter()
            .map(|p| json!({ "pid": p.pid, "name": p.name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&arr)?);
    } else {
        println!("{:>8}  NAME", "PID");
        for p in &procs {
            println!("{:>8}  {}", p.pid, p.name);
        }
        println!("{} processes", procs.len());
    }
    c.close()
}
