// pgkit Core - Configuration, Migration Domain & Ports
// NO database driver dependencies

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use crate::config::DatabaseConfig;
pub use crate::error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
