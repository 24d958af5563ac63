//! Output locations.
//!
//! - [`OutputProvider`]: the surrounding build system's mapping from logical
//!   outputs to paths
//! - [`DirOutputProvider`]: a provider rooted in a single directory
//! - [`OutputResolver`]: picks the slot for each unit's output

mod naming;
mod provider;

pub use naming::{OutputResolver, archive_dir_name, stable_name};
pub use provider::{DirOutputProvider, Format, OutputProvider};
