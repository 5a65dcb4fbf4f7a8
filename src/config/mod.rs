//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → ServerBuilder::from_config
//! ```
//!
//! # Design Decisions
//! - Every field has a default, so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - Builder options set in code override nothing here; the config only
//!   seeds a builder

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ServerConfig, TlsConfig};
pub use validation::{validate_config, ValidationError};
