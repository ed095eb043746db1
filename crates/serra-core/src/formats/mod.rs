//! # Formats Module
//!
//! Binary snapshot format for a whole [`HomeState`].
//!
//! File I/O stays in the app layer (apps/serra). This module only turns a
//! state into bytes and back.
//!
//! [`HomeState`]: crate::HomeState

mod persistence;

pub use persistence::*;
