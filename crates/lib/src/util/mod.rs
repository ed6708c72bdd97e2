//! Shared utilities.
//!
//! Directory hashing, archive writing and test helpers.

pub mod archive;
pub mod hash;

#[cfg(test)]
pub mod testutil;
