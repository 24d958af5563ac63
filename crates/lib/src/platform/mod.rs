//! Platform-specific directories and file locking.

pub mod lock;
pub mod paths;
