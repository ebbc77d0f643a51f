use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_BULK_LEN;
use crate::database::{Database, EchoDatabase, Engine, DEFAULT_DATABASES};
use crate::Error;

const DEFAULT_BIND: &str = "127.0.0.1:6379";
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10;

/// Storage engine served behind the connection layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Multiple keyspaces selectable with SELECT.
    Keyspace,
    /// Replies to every request with its own arguments.
    Echo,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "In-memory key-value server speaking RESP")]
pub struct Config {
    /// The address to listen on
    #[arg(short, long, env = "RESPKV_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Number of logical databases
    #[arg(
        short,
        long,
        env = "RESPKV_DATABASES",
        default_value_t = DEFAULT_DATABASES,
        value_parser = clap::value_parser!(u16).range(1..).map(usize::from)
    )]
    pub databases: usize,

    /// Seconds a closing connection waits for pending writes
    #[arg(long, env = "RESPKV_DRAIN_TIMEOUT_SECS", default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout_secs: u64,

    /// Largest accepted bulk string, in bytes
    #[arg(long, env = "RESPKV_MAX_BULK_LEN", default_value_t = DEFAULT_MAX_BULK_LEN)]
    pub max_bulk_len: usize,

    #[arg(long, env = "RESPKV_ENGINE", value_enum, default_value_t = EngineKind::Keyspace)]
    pub engine: EngineKind,
}

impl Config {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn engine(&self) -> Result<Arc<dyn Engine>, Error> {
        let engine: Arc<dyn Engine> = match self.engine {
            EngineKind::Keyspace => Arc::new(Database::new(self.databases)?),
            EngineKind::Echo => Arc::new(EchoDatabase),
        };
        Ok(engine)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: SocketAddr::from(([127, 0, 0, 1], 6379)),
            databases: DEFAULT_DATABASES,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
            max_bulk_len: DEFAULT_MAX_BULK_LEN,
            engine: EngineKind::Keyspace,
        }
    }
}
