//! Shared utilities.
//!
//! Hashing, filesystem helpers and test support.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
