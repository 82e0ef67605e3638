//! Shared helpers used across the gateway

/// Environment variable loading utilities
pub mod env_loader;

pub use env_loader::{read_env, split_list, EnvLoader, ENV_PREFIX};
