//! Gatehouse core
//!
//! Domain models, errors, configuration and the static system catalog shared by
//! the storage adapters and the authorization services.

pub mod cancel;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod token;

pub use cancel::run_cancellable;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::GatehouseConfig;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::*;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;
