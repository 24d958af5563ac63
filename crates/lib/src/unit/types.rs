use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where an input unit comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
  Project,
  SubProjects,
  ExternalLibraries,
  TestedCode,
  ProvidedOnly,
}

impl Scope {
  pub fn as_str(self) -> &'static str {
    match self {
      Scope::Project => "project",
      Scope::SubProjects => "sub-projects",
      Scope::ExternalLibraries => "external-libraries",
      Scope::TestedCode => "tested-code",
      Scope::ProvidedOnly => "provided-only",
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for Scope {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "project" => Ok(Scope::Project),
      "sub-projects" | "subprojects" => Ok(Scope::SubProjects),
      "external-libraries" | "external" => Ok(Scope::ExternalLibraries),
      "tested-code" => Ok(Scope::TestedCode),
      "provided-only" => Ok(Scope::ProvidedOnly),
      other => Err(format!("unknown scope '{}'", other)),
    }
  }
}

/// Per-file change reported for a directory unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
  Added,
  Changed,
  Removed,
}

/// Changed files of a directory unit, keyed by path.
pub type ChangeSet = BTreeMap<PathBuf, ChangeKind>;

/// Coarse status the build graph reports for an archive unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveStatus {
  NotChanged,
  Added,
  Changed,
  Removed,
}

/// Outcome of change classification for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitStatus {
  Added,
  Changed,
  Removed,
  Unchanged,
}

impl fmt::Display for UnitStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      UnitStatus::Added => "added",
      UnitStatus::Changed => "changed",
      UnitStatus::Removed => "removed",
      UnitStatus::Unchanged => "unchanged",
    };
    f.write_str(s)
  }
}

/// Shape of a unit together with the change information the build graph has for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum UnitKind {
  Directory {
    #[serde(default)]
    changed_files: ChangeSet,
  },
  Archive { status: ArchiveStatus },
}

/// One addressable compilation source: a directory tree or an archive file.
///
/// Supplied fresh for every build; the pipeline never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputUnit {
  pub path: PathBuf,
  pub scopes: BTreeSet<Scope>,
  #[serde(flatten)]
  pub kind: UnitKind,
}

impl InputUnit {
  pub fn directory(path: impl Into<PathBuf>, scope: Scope) -> Self {
    Self {
      path: path.into(),
      scopes: BTreeSet::from([scope]),
      kind: UnitKind::Directory {
        changed_files: ChangeSet::new(),
      },
    }
  }

  pub fn archive(path: impl Into<PathBuf>, scope: Scope, status: ArchiveStatus) -> Self {
    Self {
      path: path.into(),
      scopes: BTreeSet::from([scope]),
      kind: UnitKind::Archive { status },
    }
  }

  pub fn with_changes(mut self, changes: impl IntoIterator<Item = (PathBuf, ChangeKind)>) -> Self {
    if let UnitKind::Directory { changed_files } = &mut self.kind {
      changed_files.extend(changes);
    }
    self
  }

  pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
    self.scopes = scopes.into_iter().collect();
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn is_archive(&self) -> bool {
    matches!(self.kind, UnitKind::Archive { .. })
  }

  /// Only units scoped exactly to external libraries have a stable identity
  /// worth caching across builds.
  pub fn is_external_library(&self) -> bool {
    self.scopes.len() == 1 && self.scopes.contains(&Scope::ExternalLibraries)
  }

  /// Whether the unit belongs to the project being built (or one of its sub-projects).
  pub fn is_project_local(&self) -> bool {
    self.scopes.contains(&Scope::Project) || self.scopes.contains(&Scope::SubProjects)
  }
}

impl fmt::Display for InputUnit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.path.display())
  }
}
