//! Data models for the member directory.
//!
//! Field names follow the store's snake_case columns so the same types serve the
//! read endpoint and the client.

mod member;

pub use member::*;

#[cfg(test)]
pub(crate) use member::fixtures;
