//! Common utilities and shared types for webpolls.
//!
//! This crate provides foundational components used across all webpolls crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Tokens**: Session token generation via [`generate_token`]
//!
//! # Example
//!
//! ```no_run
//! use webpolls_common::{AppResult, Config, generate_token};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     println!("Listening on {}:{}", config.server.host, config.server.port);
//!     println!("New session token: {}", generate_token());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod token;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use token::generate_token;
