// src/config/mod.rs
pub mod news;

pub use news::{AggregatorConfig, ProviderConfig, ProvidersConfig, ENV_CONFIG_PATH};
