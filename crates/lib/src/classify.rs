//! Change classification.
//!
//! Decides for every input unit whether it has to be produced again, can be
//! left alone, or has vanished and needs its previous output removed.

use crate::unit::{ArchiveStatus, InputUnit, UnitKind, UnitStatus};

/// Classify a unit, checking the filesystem for its existence.
pub fn classify(unit: &InputUnit, incremental: bool) -> UnitStatus {
  classify_with(unit, incremental, unit.path.exists())
}

/// Classify a unit given whether it still exists on disk.
///
/// Existence is checked before any change information: the build graph cannot
/// report per-file changes for a directory whose root is gone, so a vanished
/// unit resolves to `Removed` even with an empty change set.
pub fn classify_with(unit: &InputUnit, incremental: bool, exists: bool) -> UnitStatus {
  if !exists {
    return UnitStatus::Removed;
  }

  match &unit.kind {
    UnitKind::Directory { changed_files } => {
      if !incremental {
        UnitStatus::Added
      } else if changed_files.is_empty() {
        UnitStatus::Unchanged
      } else {
        UnitStatus::Changed
      }
    }
    UnitKind::Archive { status } => match status {
      ArchiveStatus::NotChanged if incremental => UnitStatus::Unchanged,
      ArchiveStatus::NotChanged | ArchiveStatus::Added => UnitStatus::Added,
      ArchiveStatus::Changed => UnitStatus::Changed,
      ArchiveStatus::Removed => UnitStatus::Removed,
    },
  }
}

/// Units split by what has to happen to them this build.
#[derive(Debug, Default)]
pub struct Classification<'a> {
  /// Units to produce (added or changed).
  pub work: Vec<(&'a InputUnit, UnitStatus)>,

  /// Units whose previous output must be deleted.
  pub removed: Vec<&'a InputUnit>,

  /// Units left untouched; their previous output stays valid.
  pub unchanged: Vec<&'a InputUnit>,
}

/// Classify every unit and partition the result.
pub fn partition(units: &[InputUnit], incremental: bool) -> Classification<'_> {
  let mut result = Classification::default();

  for unit in units {
    match classify(unit, incremental) {
      UnitStatus::Removed => result.removed.push(unit),
      UnitStatus::Unchanged => result.unchanged.push(unit),
      status => result.work.push((unit, status)),
    }
  }

  result
}
