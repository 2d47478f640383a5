pub mod gpu;
pub mod host;
