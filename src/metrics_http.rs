//! Встроенный Prometheus exporter (tiny_http).
//!
//! GET /metrics — текстовый формат 0.0.4, GET /health — "OK".

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use tiny_http::{Header, Response, Server};

use crate::metrics::{metrics_snapshot, MetricsSnapshot};

pub struct MetricsExporter {
    server: Arc<Server>,
    addr: Option<SocketAddr>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MetricsExporter {
    pub fn spawn(addr: &str) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| anyhow!("bind http at {}: {}", addr, e))?;
        let server = Arc::new(server);
        let bound = server.server_addr().to_ip();
        let stop = Arc::new(AtomicBool::new(false));

        let srv = Arc::clone(&server);
        let st = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("ce-metrics".into())
            .spawn(move || serve(&srv, &st))
            .context("spawn metrics thread")?;

        info!("metrics exporter listening on {}", addr);
        Ok(Self {
            server,
            addr: bound,
            stop,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.server.unblock();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for MetricsExporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(server: &Server, stop: &AtomicBool) {
    loop {
        let rq = match server.recv() {
            Ok(rq) => rq,
            Err(e) => {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                warn!("http recv error: {}", e);
                continue;
            }
        };

        let url = rq.url().to_string();
        let method = rq.method().as_str().to_string();

        if method == "GET" && (url == "/" || url == "/health") {
            let _ = rq.respond(Response::from_string("OK\n").with_status_code(200));
            continue;
        }

        if method == "GET" && url == "/metrics" {
            let mut resp = Response::from_string(render_metrics(&metrics_snapshot()));
            if let Ok(ct) = Header::from_bytes(b"Content-Type", b"text/plain; version=0.0.4") {
                resp.add_header(ct);
            }
            let _ = rq.respond(resp);
            continue;
        }

        let _ = rq.respond(Response::from_string("not found\n").with_status_code(404));
    }
}

fn push_metric(out: &mut String, name: &str, kind: &str, help: &str, value: String) {
    out.push_str(&format!("# HELP ceserver_{} {}\n", name, help));
    out.push_str(&format!("# TYPE ceserver_{} {}\n", name, kind));
    out.push_str(&format!("ceserver_{} {}\n", name, value));
}

pub fn render_metrics(m: &MetricsSnapshot) -> String {
    let mut out = String::new();

    let ver = env!("CARGO_PKG_VERSION");
    out.push_str("# HELP ceserver_build_info Build info.\n");
    out.push_str("# TYPE ceserver_build_info gauge\n");
    out.push_str(&format!("ceserver_build_info{{version=\"{}\"}} 1\n", ver));

    // --- connections ---
    push_metric(&mut out, "connections_accepted_total", "counter", "Accepted client connections.", m.connections_accepted.to_string());
    push_metric(&mut out, "connections_active", "gauge", "Currently open client connections.", m.connections_active().to_string());
    push_metric(&mut out, "commands_total", "counter", "Dispatched protocol commands.", m.commands_total.to_string());
    push_metric(&mut out, "commands_unsupported_total", "counter", "Unknown or unimplemented commands.", m.commands_unsupported.to_string());

    // --- reads ---
    push_metric(&mut out, "read_requests_total", "counter", "Read requests entering the backlog.", m.read_requests.to_string());
    push_metric(&mut out, "read_coalesced_total", "counter", "Read requests attached to an already pending item.", m.read_coalesced.to_string());
    push_metric(&mut out, "read_bytes_total", "counter", "Bytes returned to readers.", m.read_bytes.to_string());
    push_metric(&mut out, "read_failures_total", "counter", "Backend read failures.", m.read_failures.to_string());
    push_metric(&mut out, "batches_sequential_total", "counter", "Batches executed with sequential reads.", m.batches_sequential.to_string());
    push_metric(&mut out, "batches_scatter_total", "counter", "Batches executed with scatter reads.", m.batches_scatter.to_string());
    push_metric(&mut out, "batch_items_avg", "gauge", "Average items per batch.", format!("{:.2}", m.avg_batch_items()));

    // --- writes ---
    push_metric(&mut out, "writes_total", "counter", "Write requests.", m.writes_total.to_string());
    push_metric(&mut out, "write_bytes_total", "counter", "Bytes written.", m.write_bytes.to_string());
    push_metric(&mut out, "write_failures_total", "counter", "Failed writes.", m.write_failures.to_string());

    // --- handles ---
    push_metric(&mut out, "snapshots_created_total", "counter", "Process/module snapshots stored.", m.snapshots_created.to_string());
    push_metric(&mut out, "handles_closed_total", "counter", "CLOSEHANDLE requests.", m.handles_closed.to_string());

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_has_counters() {
        let m = MetricsSnapshot {
            read_requests: 10,
            read_coalesced: 4,
            batches_scatter: 2,
            batch_items: 6,
            ..Default::default()
        };
        let text = render_metrics(&m);
        assert!(text.contains("ceserver_read_requests_total 10\n"));
        assert!(text.contains("ceserver_read_coalesced_total 4\n"));
        assert!(text.contains("ceserver_batch_items_avg 3.00\n"));
        assert!(text.contains("# TYPE ceserver_connections_active gauge"));
    }
}
