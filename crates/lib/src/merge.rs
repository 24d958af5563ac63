//! Merge decision and merge input discovery.
//!
//! The decision is taken once per build, from configuration only, before any
//! unit is classified: it fixes where per-unit outputs are written.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::consts::DOT_JAR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeMode {
  /// Per-unit outputs are the final outputs.
  NoMerge,
  /// Per-unit outputs go to the intermediate directory and are merged into `main`.
  Merge,
}

impl MergeMode {
  /// Native multi-dex without a main dex list may ship many independent dex
  /// files; every other configuration needs a single fixed set of outputs.
  pub fn decide(config: &PipelineConfig) -> Self {
    if !config.multi_dex || config.main_dex_list.is_some() {
      MergeMode::Merge
    } else {
      MergeMode::NoMerge
    }
  }

  pub fn is_merge(self) -> bool {
    self == MergeMode::Merge
  }
}

#[derive(Debug, thiserror::Error)]
pub enum MergeInputError {
  #[error("no dex files to merge in {0}")]
  Empty(PathBuf),

  #[error("failed to list {path}: {source}")]
  List {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Intermediate artifacts selected for the merge, in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeManifest {
  pub inputs: Vec<PathBuf>,
}

impl MergeManifest {
  /// Read the merge inputs back from the intermediate directory.
  ///
  /// The listing, not this build's job list, is the source of truth: units
  /// that were unchanged this build still contribute their earlier output.
  /// Single-dex outputs are `.jar` files, multi-dex outputs are directories.
  pub fn discover(intermediate_dir: &Path, multi_dex: bool) -> Result<Self, MergeInputError> {
    let entries = match std::fs::read_dir(intermediate_dir) {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(MergeInputError::Empty(intermediate_dir.to_path_buf()));
      }
      Err(source) => {
        return Err(MergeInputError::List {
          path: intermediate_dir.to_path_buf(),
          source,
        });
      }
    };

    let mut inputs = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|source| MergeInputError::List {
        path: intermediate_dir.to_path_buf(),
        source,
      })?;
      let path = entry.path();

      let selected = if multi_dex {
        path.is_dir()
      } else {
        path.is_file() && entry.file_name().to_string_lossy().ends_with(DOT_JAR)
      };

      if selected {
        inputs.push(path);
      }
    }

    if inputs.is_empty() {
      return Err(MergeInputError::Empty(intermediate_dir.to_path_buf()));
    }

    inputs.sort();
    debug!(count = inputs.len(), dir = ?intermediate_dir, "discovered merge inputs");

    Ok(Self { inputs })
  }

}
