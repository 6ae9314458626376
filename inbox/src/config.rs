use std::net::SocketAddr;
use std::str::FromStr;

use envconfig::Envconfig;
use tracing::Level;

use crate::storage::FallbackPolicy;

/// Which tier serves first and which failures move a call to the other tier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FallbackMode {
    /// Remote first, local cache on any remote failure.
    Always,
    /// Remote first, local cache only when the remote is unreachable.
    Unavailable,
    /// Local cache first.
    LocalFirst,
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "always" => Ok(FallbackMode::Always),
            "unavailable" => Ok(FallbackMode::Unavailable),
            "local-first" | "local_first" => Ok(FallbackMode::LocalFirst),
            _ => Err(format!("Unknown fallback mode: {s}")),
        }
    }
}

impl From<FallbackMode> for FallbackPolicy {
    fn from(mode: FallbackMode) -> Self {
        match mode {
            FallbackMode::Always => FallbackPolicy::remote_first(),
            FallbackMode::Unavailable => FallbackPolicy::remote_first_when_unavailable(),
            FallbackMode::LocalFirst => FallbackPolicy::local_first(),
        }
    }
}

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    // Required unless MEMORY_STORE is set
    pub database_url: Option<String>,

    #[envconfig(default = "10")]
    pub max_pg_connections: u32,

    #[envconfig(default = "5")]
    pub pg_acquire_timeout_seconds: u64,

    #[envconfig(default = "true")]
    pub run_migrations: bool,

    pub local_cache_path: Option<String>,

    // Keep the remote tier in process memory, for local development
    #[envconfig(default = "false")]
    pub memory_store: bool,

    #[envconfig(default = "always")]
    pub storage_fallback: FallbackMode,

    #[envconfig(default = "100")]
    pub event_log_capacity: usize,

    #[envconfig(default = "1048576")]
    pub max_body_size: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "inbox")]
    pub otel_service_name: String,

    #[envconfig(default = "info")]
    pub log_level: Level,
}
