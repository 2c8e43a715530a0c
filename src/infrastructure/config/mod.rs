//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Configuration validation
//! - Durable partial updates through [`YamlConfigStore`]

pub mod loader;
pub mod yaml_store;

pub use loader::ConfigLoader;
pub use yaml_store::YamlConfigStore;
