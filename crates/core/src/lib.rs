//! Core business logic for webpolls.
//!
//! Vote recording, result aggregation and live result broadcasting, behind
//! the [`PollService`] used by the request layer.

pub mod services;

pub use services::*;
