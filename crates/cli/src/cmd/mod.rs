mod build;
mod cache;

pub use build::cmd_build;
pub use cache::{cmd_cache_clean, cmd_cache_stats};
