pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;

// Re-export commonly used types for easier access
pub use backend::database::{DatabaseBackendConfig, SqliteBackend};
pub use backend::Backend;
pub use error::{AppError, AppResult};
pub use models::{Endpoint, Extension, FuncKey, Line, Protocol, Trunk};
