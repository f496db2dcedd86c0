//! Pure utility functions.
//!
//! These are stateless helpers used across the crate.

pub mod bootstrap;
pub mod retry;
