//! Centralized configuration and builder for ceserver.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - ServerConfig::from_env() reads CES_* variables on top of the defaults.
//! - CLI flags override env (see cli.rs), env overrides defaults.
//!
//! Defaults mirror the stock ceserver / DMA engine values:
//! - port 52736
//! - 2 ms backlog growth window, 0.5 ms backoff extension
//! - batches of at most 256 items / 1e9 bytes, scatter for 2+ items

use std::fmt;
use std::time::Duration;

use crate::consts::{
    DEFAULT_BACKOFF_EXTEND_US, DEFAULT_BIND, DEFAULT_DISPATCH_BUILD_US, DEFAULT_LEGACY_PROBE_MS,
    DEFAULT_LEGACY_PROBE_STEP_MS, DEFAULT_MAX_DISPATCH_BYTES, DEFAULT_MAX_DISPATCH_SIZE,
    DEFAULT_PORT, DEFAULT_SCATTER_THRESHOLD,
};
use crate::memory::EngineConfig;
use crate::session::SessionConfig;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Env: CES_BIND (default 0.0.0.0)
    pub bind_addr: String,
    /// Env: CES_PORT (default 52736)
    pub port: u16,

    /// Env: CES_DISPATCH_BUILD_US (default 2000)
    pub dispatch_build_time_us: u64,
    /// Env: CES_BACKOFF_EXTEND_US (default 500)
    pub backoff_extend_us: u64,
    /// Env: CES_MAX_DISPATCH (default 256)
    pub max_dispatch_size: usize,
    /// Env: CES_MAX_DISPATCH_BYTES (default 1_000_000_000)
    pub max_dispatch_bytes: usize,
    /// Env: CES_SCATTER_THRESHOLD (default 1)
    pub scatter_threshold: usize,

    /// Env: CES_LEGACY_PROBE_MS (default 1000)
    pub legacy_probe_ms: u64,
    /// Env: CES_LEGACY_PROBE_STEP_MS (default 100)
    pub legacy_probe_step_ms: u64,

    /// Env: CES_METRICS_ADDR (default: exporter disabled)
    pub metrics_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,

            dispatch_build_time_us: DEFAULT_DISPATCH_BUILD_US,
            backoff_extend_us: DEFAULT_BACKOFF_EXTEND_US,
            max_dispatch_size: DEFAULT_MAX_DISPATCH_SIZE,
            max_dispatch_bytes: DEFAULT_MAX_DISPATCH_BYTES,
            scatter_threshold: DEFAULT_SCATTER_THRESHOLD,

            legacy_probe_ms: DEFAULT_LEGACY_PROBE_MS,
            legacy_probe_step_ms: DEFAULT_LEGACY_PROBE_STEP_MS,

            metrics_addr: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        // ----- listener -----
        if let Ok(v) = std::env::var("CES_BIND") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.bind_addr = s.to_string();
            }
        }
        if let Some(n) = env_parse::<u16>("CES_PORT") {
            cfg.port = n;
        }

        // ----- memory engine -----
        if let Some(n) = env_parse::<u64>("CES_DISPATCH_BUILD_US") {
            cfg.dispatch_build_time_us = n;
        }
        if let Some(n) = env_parse::<u64>("CES_BACKOFF_EXTEND_US") {
            cfg.backoff_extend_us = n;
        }
        if let Some(n) = env_parse::<usize>("CES_MAX_DISPATCH") {
            if n > 0 {
                cfg.max_dispatch_size = n;
            }
        }
        if let Some(n) = env_parse::<usize>("CES_MAX_DISPATCH_BYTES") {
            if n > 0 {
                cfg.max_dispatch_bytes = n;
            }
        }
        if let Some(n) = env_parse::<usize>("CES_SCATTER_THRESHOLD") {
            cfg.scatter_threshold = n;
        }

        // ----- legacy probe -----
        if let Some(n) = env_parse::<u64>("CES_LEGACY_PROBE_MS") {
            cfg.legacy_probe_ms = n;
        }
        if let Some(n) = env_parse::<u64>("CES_LEGACY_PROBE_STEP_MS") {
            if n > 0 {
                cfg.legacy_probe_step_ms = n;
            }
        }

        // ----- metrics -----
        if let Ok(v) = std::env::var("CES_METRICS_ADDR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.metrics_addr = Some(s.to_string());
            }
        }

        cfg
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_bind_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_dispatch_build_time_us(mut self, us: u64) -> Self {
        self.dispatch_build_time_us = us;
        self
    }

    pub fn with_backoff_extend_us(mut self, us: u64) -> Self {
        self.backoff_extend_us = us;
        self
    }

    pub fn with_max_dispatch_size(mut self, n: usize) -> Self {
        self.max_dispatch_size = n.max(1);
        self
    }

    pub fn with_max_dispatch_bytes(mut self, n: usize) -> Self {
        self.max_dispatch_bytes = n.max(1);
        self
    }

    pub fn with_scatter_threshold(mut self, n: usize) -> Self {
        self.scatter_threshold = n;
        self
    }

    pub fn with_legacy_probe_ms(mut self, ms: u64) -> Self {
        self.legacy_probe_ms = ms;
        self
    }

    pub fn with_metrics_addr<S: Into<String>>(mut self, addr: Option<S>) -> Self {
        self.metrics_addr = addr.map(Into::into);
        self
    }

    /// "bind:port" для TcpListener::bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dispatch_build_time: Duration::from_micros(self.dispatch_build_time_us),
            backoff_extend: Duration::from_micros(self.backoff_extend_us),
            max_dispatch_size: self.max_dispatch_size.max(1),
            max_dispatch_bytes: self.max_dispatch_bytes.max(1),
            scatter_threshold: self.scatter_threshold,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            legacy_probe: Duration::from_millis(self.legacy_probe_ms),
            legacy_probe_step: Duration::from_millis(self.legacy_probe_step_ms.max(1)),
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServerConfig {{ \
             listen: {}, \
             dispatch_build_time_us: {}, \
             backoff_extend_us: {}, \
             max_dispatch_size: {}, \
             max_dispatch_bytes: {}, \
             scatter_threshold: {}, \
             legacy_probe_ms: {}, \
             metrics_addr: {} \
             }}",
            self.listen_addr(),
            self.dispatch_build_time_us,
            self.backoff_extend_us,
            self.max_dispatch_size,
            self.max_dispatch_bytes,
            self.scatter_threshold,
            self.legacy_probe_ms,
            self.metrics_addr.as_deref().unwrap_or("disabled"),
        )
    }
}

/// Lightweight builder that produces a ServerConfig.
#[derive(Clone, Debug)]
pub struct ServerBuilder {
    cfg: ServerConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        // Start from env, then allow overrides.
        Self {
            cfg: ServerConfig::from_env(),
        }
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a clean default (without reading env).
    pub fn from_default() -> Self {
        Self {
            cfg: ServerConfig::default(),
        }
    }

    pub fn bind_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.cfg.bind_addr = addr.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.port = port;
        self
    }

    pub fn dispatch_build_time_us(mut self, us: u64) -> Self {
        self.cfg.dispatch_build_time_us = us;
        self
    }

    pub fn max_dispatch_size(mut self, n: usize) -> Self {
        self.cfg.max_dispatch_size = n.max(1);
        self
    }

    pub fn max_dispatch_bytes(mut self, n: usize) -> Self {
        self.cfg.max_dispatch_bytes = n.max(1);
        self
    }

    pub fn scatter_threshold(mut self, n: usize) -> Self {
        self.cfg.scatter_threshold = n;
        self
    }

    pub fn legacy_probe_ms(mut self, ms: u64) -> Self {
        self.cfg.legacy_probe_ms = ms;
        self
    }

    pub fn metrics_addr<S: Into<String>>(mut self, addr: Option<S>) -> Self {
        self.cfg.metrics_addr = addr.map(Into::into);
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> ServerConfig {
        self.cfg
    }
}
