//! Layered configuration management for cellxgene
//!
//! An [`AppConfig`] owns one [`ServerConfig`], a default [`DatasetConfig`], and
//! optional per-dataroot dataset overrides. Configurations are seeded from the
//! packaged default config, layered with user config files and named option
//! updates, then completed into a validated, read-only [`CompletedConfig`].

pub mod app;
pub mod capabilities;
pub mod completion;
pub mod error;
pub mod layer;
pub mod loader;
pub mod tree;
pub mod validation;

// Scope-specific configuration modules
pub mod domains;

// Re-export main types
pub use app::{AppConfig, CascadePolicy, CompletedConfig, ConfigChanges, ConfigState};
pub use capabilities::{CacheManager, DataAdaptorTitleProvider, MatrixDataCacheManager};
pub use completion::CompletionContext;
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, DefaultConfig};
pub use tree::{ConfigOptions, OptionPath};

pub use domains::{DatasetConfig, DatasetSettings, ServerConfig, ServerSettings};
