//! Network Warden Core Library
//!
//! Shared functionality for warden components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Input validators for contacts, locales and labels
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;
pub mod validation;

pub use config::WardenConfig;
pub use error::{Error, Result};
