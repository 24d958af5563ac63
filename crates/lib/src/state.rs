//! Input snapshot persisted between command-line builds.
//!
//! A build system hands the pipeline per-unit change information. Outside of
//! one, the previous build's file hashes stand in: the snapshot taken before
//! a successful build is diffed against the next build's snapshot to derive
//! each directory's change set and each archive's status. Build-wide facts
//! (tool parameters, the main dex list, the dexing path) are recorded too: a
//! difference in any of them cannot be expressed per unit.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::merge::MergeMode;
use crate::unit::{ArchiveStatus, ChangeKind, ChangeSet, InputUnit, Scope, UnitKind};
use crate::util::hash::{HashError, hash_file};

/// File name of the snapshot inside the output directory.
pub const STATE_FILE_NAME: &str = ".predex-state.json";

const STATE_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to read state {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse state {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write state {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported state version {0}")]
  UnsupportedVersion(u32),

  #[error(transparent)]
  Hash(#[from] HashError),
}

/// Recorded content of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
  pub scopes: BTreeSet<Scope>,
  #[serde(flatten)]
  pub content: RecordContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RecordContent {
  /// Hash of every file, keyed by path relative to the unit root.
  Directory { files: BTreeMap<PathBuf, String> },
  Archive { hash: String },
}

/// Facts of the whole build that every unit's output depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFacts {
  pub parameters: BTreeMap<String, String>,
  /// Hash of each non-unit input; `None` when the file is missing.
  pub secondary_files: BTreeMap<PathBuf, Option<String>>,
  pub mode: MergeMode,
  /// No per-unit outputs exist after a single-pass build.
  pub single_pass: bool,
}

impl BuildFacts {
  pub fn capture(config: &PipelineConfig, unit_count: usize) -> Result<Self, StateError> {
    let mut secondary_files = BTreeMap::new();
    for file in config.secondary_files() {
      let hash = if file.exists() { Some(hash_file(&file)?.0) } else { None };
      secondary_files.insert(file, hash);
    }

    Ok(Self {
      parameters: config
        .parameter_inputs()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect(),
      secondary_files,
      mode: MergeMode::decide(config),
      single_pass: config.single_pass(unit_count),
    })
  }

  /// Log and report every difference from `current`.
  fn differs_from(&self, current: &BuildFacts) -> bool {
    let mut differs = false;
    for (name, before) in &self.parameters {
      let after = current.parameters.get(name);
      if after != Some(before) {
        info!(parameter = %name, before = %before, after = ?after, "build parameter changed since the last build");
        differs = true;
      }
    }
    for name in current.parameters.keys().filter(|n| !self.parameters.contains_key(*n)) {
      info!(parameter = %name, "build parameter added since the last build");
      differs = true;
    }
    if self.secondary_files != current.secondary_files {
      info!("main dex list changed since the last build");
      differs = true;
    }
    if self.mode != current.mode {
      info!(before = ?self.mode, after = ?current.mode, "merge mode changed since the last build");
      differs = true;
    }
    if self.single_pass != current.single_pass {
      info!(
        before = self.single_pass,
        after = current.single_pass,
        "single-pass dexing changed since the last build"
      );
      differs = true;
    }
    differs
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputState {
  version: u32,
  facts: BuildFacts,
  units: BTreeMap<PathBuf, UnitRecord>,
}

/// Units enriched with change information.
#[derive(Debug, Clone)]
pub struct DerivedInputs {
  pub units: Vec<InputUnit>,
  /// Incremental processing cannot express the difference; build from scratch.
  pub requires_full_build: bool,
}

impl InputState {
  /// Record the build facts of `config` and the current content of `units`.
  /// Units missing on disk are skipped.
  pub fn capture(config: &PipelineConfig, units: &[InputUnit]) -> Result<Self, StateError> {
    let mut state = InputState {
      version: STATE_VERSION,
      facts: BuildFacts::capture(config, units.len())?,
      units: BTreeMap::new(),
    };

    for unit in units {
      if !unit.path.exists() {
        continue;
      }

      let content = if unit.is_archive() {
        RecordContent::Archive {
          hash: hash_file(&unit.path)?.0,
        }
      } else {
        RecordContent::Directory {
          files: hash_directory_files(&unit.path)?,
        }
      };

      state.units.insert(
        unit.path.clone(),
        UnitRecord {
          scopes: unit.scopes.clone(),
          content,
        },
      );
    }

    Ok(state)
  }

  /// Load a snapshot; `None` when there is none yet.
  pub fn load(path: &Path) -> Result<Option<Self>, StateError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(StateError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let parse_err = |source| StateError::Parse {
      path: path.to_path_buf(),
      source,
    };

    #[derive(Deserialize)]
    struct Header {
      version: u32,
    }
    let header: Header = serde_json::from_str(&content).map_err(parse_err)?;
    if header.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion(header.version));
    }

    let state: InputState = serde_json::from_str(&content).map_err(parse_err)?;
    Ok(Some(state))
  }

  /// Write the snapshot atomically.
  pub fn save(&self, path: &Path) -> Result<(), StateError> {
    let write_err = |source| StateError::Write {
      path: path.to_path_buf(),
      source,
    };

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content = serde_json::to_string_pretty(self).map_err(StateError::Serialize)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;

    debug!(path = %path.display(), units = self.units.len(), "saved input state");
    Ok(())
  }

  /// Diff `self` (the previous build) against `current` for the given units.
  ///
  /// Units recorded previously but absent from `units` are appended so their
  /// outputs get removed. A directory that left the input list while still on
  /// disk, a unit whose scopes changed, or any change of the build facts
  /// needs a full build.
  pub fn derive(&self, current: &InputState, units: &[InputUnit]) -> DerivedInputs {
    let mut derived = Vec::with_capacity(units.len());
    let mut requires_full_build = self.facts.differs_from(&current.facts);
    let listed: BTreeSet<&Path> = units.iter().map(|u| u.path.as_path()).collect();

    for unit in units {
      let previous = self.units.get(&unit.path);
      let now = current.units.get(&unit.path);

      if let Some(previous) = previous
        && previous.scopes != unit.scopes
      {
        info!(unit = %unit, "scopes changed since the last build");
        requires_full_build = true;
      }

      let kind = match &unit.kind {
        UnitKind::Archive { .. } => UnitKind::Archive {
          status: archive_status(previous, now),
        },
        UnitKind::Directory { .. } => UnitKind::Directory {
          changed_files: directory_changes(&unit.path, previous, now),
        },
      };

      derived.push(InputUnit {
        path: unit.path.clone(),
        scopes: unit.scopes.clone(),
        kind,
      });
    }

    for (path, record) in &self.units {
      if listed.contains(path.as_path()) {
        continue;
      }

      match &record.content {
        RecordContent::Archive { .. } => derived.push(InputUnit {
          path: path.clone(),
          scopes: record.scopes.clone(),
          kind: UnitKind::Archive {
            status: ArchiveStatus::Removed,
          },
        }),
        RecordContent::Directory { .. } if path.exists() => {
          info!(unit = %path.display(), "directory left the inputs but still exists");
          requires_full_build = true;
        }
        RecordContent::Directory { .. } => derived.push(InputUnit {
          path: path.clone(),
          scopes: record.scopes.clone(),
          kind: UnitKind::Directory {
            changed_files: ChangeSet::new(),
          },
        }),
      }
    }

    DerivedInputs {
      units: derived,
      requires_full_build,
    }
  }
}

fn archive_status(previous: Option<&UnitRecord>, now: Option<&UnitRecord>) -> ArchiveStatus {
  let hash_of = |record: Option<&UnitRecord>| match record.map(|r| &r.content) {
    Some(RecordContent::Archive { hash }) => Some(hash.clone()),
    _ => None,
  };

  match (hash_of(previous), hash_of(now)) {
    (_, None) => ArchiveStatus::Removed,
    (None, Some(_)) => ArchiveStatus::Added,
    (Some(before), Some(after)) if before == after => ArchiveStatus::NotChanged,
    (Some(_), Some(_)) => ArchiveStatus::Changed,
  }
}

fn directory_changes(root: &Path, previous: Option<&UnitRecord>, now: Option<&UnitRecord>) -> ChangeSet {
  let empty = BTreeMap::new();
  let before = recorded_files(previous).unwrap_or(&empty);
  let after = recorded_files(now).unwrap_or(&empty);

  let mut changes = ChangeSet::new();
  for (file, hash) in after {
    match before.get(file) {
      None => {
        changes.insert(root.join(file), ChangeKind::Added);
      }
      Some(old) if old != hash => {
        changes.insert(root.join(file), ChangeKind::Changed);
      }
      Some(_) => {}
    }
  }
  for file in before.keys() {
    if !after.contains_key(file) {
      changes.insert(root.join(file), ChangeKind::Removed);
    }
  }
  changes
}

fn recorded_files(record: Option<&UnitRecord>) -> Option<&BTreeMap<PathBuf, String>> {
  match record.map(|r| &r.content) {
    Some(RecordContent::Directory { files }) => Some(files),
    _ => None,
  }
}

fn hash_directory_files(root: &Path) -> Result<BTreeMap<PathBuf, String>, StateError> {
  let mut files = BTreeMap::new();

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|e| HashError::Walk {
      path: root.to_path_buf(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
    files.insert(relative, hash_file(entry.path())?.0);
  }

  Ok(files)
}
