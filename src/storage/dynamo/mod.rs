//! DynamoDB table client.
//!
//! Item layout follows [`crate::storage::schema`]: every attribute is a
//! string (`S`) except `StatusCode` (`N`). Empty descriptive strings are not
//! written, and read back as empty.

mod client;
mod item;

pub use client::DynamoTableClient;
pub use item::{key_from_item, key_to_item, record_from_item, record_to_item};
