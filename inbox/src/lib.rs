pub mod api;
pub mod classifier;
pub mod config;
pub mod event_log;
pub mod export;
pub mod message;
pub mod messages_endpoint;
pub mod normalize;
pub mod prometheus;
pub mod receive_endpoint;
pub mod router;
pub mod server;
pub mod storage;
pub mod time;
