use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::unit::Scope;

/// Physical shape of an output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
  /// A directory that will hold one or more dex files.
  Directory,
  /// A single archive file.
  Jar,
}

impl Format {
  fn dir_name(self) -> &'static str {
    match self {
      Format::Directory => "folders",
      Format::Jar => "jars",
    }
  }
}

/// Maps a logical output to a path on disk.
///
/// Implementations make sure the parent of the returned path exists.
pub trait OutputProvider: Send + Sync {
  fn content_location(&self, name: &str, scopes: &BTreeSet<Scope>, format: Format) -> io::Result<PathBuf>;

  /// Remove every output previously handed out.
  fn delete_all(&self) -> io::Result<()>;
}

/// Provider laying outputs out as `<root>/<format>/<scopes>/<name>`.
#[derive(Debug, Clone)]
pub struct DirOutputProvider {
  root: PathBuf,
}

impl DirOutputProvider {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

fn scopes_dir_name(scopes: &BTreeSet<Scope>) -> String {
  if scopes.is_empty() {
    return "none".to_string();
  }
  scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join("+")
}

impl OutputProvider for DirOutputProvider {
  fn content_location(&self, name: &str, scopes: &BTreeSet<Scope>, format: Format) -> io::Result<PathBuf> {
    let location = self
      .root
      .join(format.dir_name())
      .join(scopes_dir_name(scopes))
      .join(name);

    if let Some(parent) = location.parent() {
      std::fs::create_dir_all(parent)?;
    }

    Ok(location)
  }

  fn delete_all(&self) -> io::Result<()> {
    debug!(root = ?self.root, "deleting all outputs");
    match std::fs::remove_dir_all(&self.root) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e),
    }
  }
}
