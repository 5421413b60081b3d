//! Configuration scopes: the server as a whole, and individual datasets

pub mod dataset;
pub mod server;
pub mod utils;

pub use dataset::{DatasetConfig, DatasetSettings};
pub use server::{ServerConfig, ServerSettings};
