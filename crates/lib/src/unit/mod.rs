//! Input units and their change information.
//!
//! An input unit is either a directory of class files or an archive. The
//! surrounding build graph hands them over fresh on every build, together with
//! per-file changes (directories) or a coarse status (archives).

mod types;

pub use types::*;
