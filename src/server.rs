//! Connection Acceptor.
//!
//! Один поток на соединение; все сессии делят одну HandleTable и один
//! MemoryEngine. `StopHandle::stop()` будит acceptor холостым connect'ом,
//! после чего живые соединения закрываются (shutdown сокета) и join'ятся.

use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::handles::HandleTable;
use crate::memory::MemoryEngine;
use crate::metrics::{record_connection_accepted, record_connection_closed};
use crate::session::{Session, SessionConfig};

struct Connection {
    peer: SocketAddr,
    stream: TcpStream,
    thread: JoinHandle<()>,
}

#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        // разбудить accept()
        let wake = match self.addr {
            SocketAddr::V4(a) if a.ip().is_unspecified() => {
                SocketAddr::from(([127, 0, 0, 1], a.port()))
            }
            SocketAddr::V6(a) if a.ip().is_unspecified() => {
                SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, a.port()))
            }
            a => a,
        };
        let _ = TcpStream::connect_timeout(&wake, Duration::from_millis(500));
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
    handles: Arc<HandleTable>,
    engine: Arc<MemoryEngine>,
    session_cfg: SessionConfig,
    stop: Arc<AtomicBool>,
    connections: Mutex<Vec<Connection>>,
}

impl Server {
    /// Bind listener. SO_REUSEADDR берётся из дефолта std: на unix он выставлен,
    /// на windows нет.
    pub fn bind(cfg: &ServerConfig, engine: Arc<MemoryEngine>) -> Result<Self> {
        let listen = cfg.listen_addr();
        let listener =
            TcpListener::bind(&listen).with_context(|| format!("bind {}", listen))?;
        let addr = listener.local_addr().context("listener local_addr")?;
        Ok(Self {
            listener,
            addr,
            handles: Arc::new(HandleTable::new()),
            engine,
            session_cfg: cfg.session_config(),
            stop: Arc::new(AtomicBool::new(false)),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            addr: self.addr,
        }
    }

    /// Accept-цикл до `StopHandle::stop()`.
    pub fn run(&self) -> Result<()> {
        info!("listening on {}", self.addr);

        for incoming in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let stream = match incoming {
                Ok(s) => s,
                Err(e) => {
                    error!("accept failed: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.spawn_connection(stream) {
                warn!("connection setup failed: {:#}", e);
            }
            self.reap_finished();
        }

        self.close_all();
        info!("server on {} stopped", self.addr);
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream) -> Result<()> {
        let peer = stream.peer_addr().context("peer_addr")?;
        if let Err(e) = stream.set_nodelay(true) {
            error!("failed to set TCP_NODELAY for {}: {}", peer, e);
            let _ = stream.shutdown(Shutdown::Both);
            return Ok(());
        }
        let control = stream.try_clone().context("clone client socket")?;

        info!("accepted connection from {}", peer);
        record_connection_accepted();

        let handles = Arc::clone(&self.handles);
        let engine = Arc::clone(&self.engine);
        let cfg = self.session_cfg.clone();
        let thread = thread::Builder::new()
            .name(format!("ce-conn-{}", peer))
            .spawn(move || {
                let mut session = Session::new(stream, peer.to_string(), handles, engine, cfg);
                if let Err(e) = session.run() {
                    debug!("[{}] transport error: {:#}", session.label(), e);
                }
                info!("[{}] connection closed", session.label());
                let _ = session.into_inner().shutdown(Shutdown::Both);
                record_connection_closed();
            })
            .context("spawn connection thread")?;

        self.connections.lock().unwrap().push(Connection {
            peer,
            stream: control,
            thread,
        });
        Ok(())
    }

    fn reap_finished(&self) {
        let mut conns = self.connections.lock().unwrap();
        let (done, live): (Vec<_>, Vec<_>) = std::mem::take(&mut *conns)
            .into_iter()
            .partition(|c| c.thread.is_finished());
        *conns = live;
        drop(conns);
        for c in done {
            let _ = c.thread.join();
        }
    }

    fn close_all(&self) {
        let conns = std::mem::take(&mut *self.connections.lock().unwrap());
        if !conns.is_empty() {
            info!("closing {} live connections", conns.len());
        }
        for c in conns {
            let _ = c.stream.shutdown(Shutdown::Both);
            if c.thread.join().is_err() {
                error!("connection thread for {} panicked", c.peer);
            }
        }
    }

    /// Сколько соединений сейчас обслуживается.
    pub fn live_connections(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.thread.is_finished())
            .count()
    }
}
