use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use anyhow::{anyhow, Result};

use ceserver_dma::metrics::{record_batch, record_read_request};
use ceserver_dma::metrics_http::MetricsExporter;

fn http_get(addr: std::net::SocketAddr, path: &str) -> Result<(u16, String)> {
    let mut s = TcpStream::connect(addr)?;
    s.set_read_timeout(Some(Duration::from_secs(5)))?;
    write!(s, "GET {} HTTP/1.0\r\nHost: localhost\r\n\r\n", path)?;
    let mut resp = String::new();
    s.read_to_string(&mut resp)?;
    let status = resp
        .split_whitespace()
        .nth(1)
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| anyhow!("bad response: {:?}", resp))?;
    let body = resp.split("\r\n\r\n").nth(1).unwrap_or("").to_string();
    Ok((status, body))
}

#[test]
fn exporter_serves_metrics_health_and_404() -> Result<()> {
    record_read_request(false);
    record_read_request(true);
    record_batch(true, 2);

    let mut exp = MetricsExporter::spawn("127.0.0.1:0")?;
    let addr = exp.local_addr().ok_or_else(|| anyhow!("no ip address"))?;

    let (code, body) = http_get(addr, "/metrics")?;
    assert_eq!(code, 200);
    assert!(body.contains("ceserver_build_info{version="));
    assert!(body.contains("# TYPE ceserver_read_requests_total counter"));
    assert!(body.contains("ceserver_batches_scatter_total"));

    let (code, body) = http_get(addr, "/health")?;
    assert_eq!(code, 200);
    assert_eq!(body.trim(), "OK");

    let (code, _) = http_get(addr, "/nope")?;
    assert_eq!(code, 404);

    exp.stop();
    Ok(())
}
