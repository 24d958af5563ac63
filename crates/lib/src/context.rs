//! Build-context sink.
//!
//! The surrounding build system is told about every output file the pipeline
//! writes, for its own incremental bookkeeping. Notifications are fire-and-forget.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
  Dex,
}

pub trait BuildContext: Send + Sync {
  fn add_changed_file(&self, file_type: FileType, path: &Path);
}

/// Drops every notification.
#[derive(Debug, Default)]
pub struct NoopContext;

impl BuildContext for NoopContext {
  fn add_changed_file(&self, _file_type: FileType, _path: &Path) {}
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingContext {
  files: Mutex<Vec<(FileType, PathBuf)>>,
}

impl RecordingContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn files(&self) -> Vec<PathBuf> {
    match self.files.lock() {
      Ok(files) => files.iter().map(|(_, p)| p.clone()).collect(),
      Err(poisoned) => poisoned.into_inner().iter().map(|(_, p)| p.clone()).collect(),
    }
  }
}

impl BuildContext for RecordingContext {
  fn add_changed_file(&self, file_type: FileType, path: &Path) {
    let mut files = match self.files.lock() {
      Ok(files) => files,
      Err(poisoned) => poisoned.into_inner(),
    };
    files.push((file_type, path.to_path_buf()));
  }
}

/// Report every regular file at or below `root`, breadth first.
pub fn report_outputs(context: &dyn BuildContext, root: &Path) -> usize {
  let mut entries: Vec<_> = WalkDir::new(root)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .collect();
  entries.sort_by_key(|e| e.depth());

  for entry in &entries {
    context.add_changed_file(FileType::Dex, entry.path());
  }
  entries.len()
}
