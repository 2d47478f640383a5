pub mod config;
pub mod error;
pub mod metrics;
pub mod sampler;
pub mod server;
pub mod wire;
