//! Shared error log integration tests.
//!
//! Tests the ErrorLog interface against every table client.
//! Each implementation module imports these test functions and runs them.

pub mod error_log_tests;
