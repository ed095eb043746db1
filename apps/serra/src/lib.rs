//! # Serra Library
//!
//! This library exposes the Serra modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod events;
pub mod executor;
pub mod scheduler;
pub mod state;
pub mod store;

// Re-export serra_core for convenience
pub use serra_core;
