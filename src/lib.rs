pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod export;
pub mod model;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigSource, FileConfigSource, QueryModelConfig, StaticConfigSource};
pub use context::ContextCache;
pub use error::{ErrorEnvelope, QueryModelError, ServiceError};
pub use service::QueryModelService;
