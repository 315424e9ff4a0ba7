//! # datacat-core
//!
//! Core types, traits, and abstractions for the datacat job engine.
//!
//! This crate provides the job and catalog data model, the error type, and
//! the repository traits that the store, profiling and job crates build on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
