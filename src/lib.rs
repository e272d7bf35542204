// Протокол и константы
pub mod consts;
pub mod protocol; // src/protocol/{mod,command,wire}.rs

// Модель целевой машины
pub mod model;
pub mod region;
pub mod backend; // src/backend/{mod,fixture,memprocfs}.rs

// Движок памяти (backlog + батчи)
pub mod memory; // src/memory/{mod,backlog,dispatch}.rs

// Сервер: хэндлы, диспетчер соединения, acceptor
pub mod handles;
pub mod session;
pub mod server;

pub mod config;
pub mod metrics;
pub mod metrics_http;

pub mod client;
pub mod cli;
pub mod util;

// Удобные реэкспорты
pub use backend::{FixtureBackend, MemoryBackend};
pub use client::CeClient;
pub use config::{ServerBuilder, ServerConfig};
pub use handles::{Handle, HandleTable};
pub use memory::{EngineConfig, MemoryEngine};
pub use server::{Server, StopHandle};
pub use session::{Session, SessionConfig, Transport};
