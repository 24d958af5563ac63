use std::io;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::consts::{DOT_JAR, OBJ_HASH_PREFIX_LEN, SHARED_EXTRACTION_DIR};
use crate::merge::MergeMode;
use crate::unit::InputUnit;
use crate::util::hash::hash_path;

use super::provider::{Format, OutputProvider};

/// Collision-free name for a unit: `<stem>_<hash of absolute path>`.
///
/// `classes.jar` files unpacked under the shared extraction root are named
/// after their `<group>-<artifact>-<version>` directories instead, since every
/// library ships a `classes.jar`.
pub fn archive_dir_name(path: &Path) -> String {
  let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
  let digest = hash_path(&absolute);

  let mut stem = absolute
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

  if stem == "classes" && absolute.components().any(|c| c.as_os_str() == SHARED_EXTRACTION_DIR) {
    // <group>/<artifact>/<version>/jars/classes.jar
    let version_dir = absolute.parent().and_then(Path::parent);
    let artifact_dir = version_dir.and_then(Path::parent);
    let group_dir = artifact_dir.and_then(Path::parent);
    let parts: Vec<String> = [group_dir, artifact_dir, version_dir]
      .into_iter()
      .flatten()
      .filter_map(|p| p.file_name())
      .map(|n| n.to_string_lossy().into_owned())
      .collect();
    if parts.len() == 3 {
      stem = parts.join("-");
    }
  }

  format!("{}_{}", stem, &digest.0[..OBJ_HASH_PREFIX_LEN])
}

/// Name that stays identical across builds regardless of content.
///
/// Directories keep their basename; archives fold `.` into `_`.
pub fn stable_name(unit: &InputUnit) -> String {
  let base = unit
    .path
    .file_name()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default();

  if unit.is_archive() { base.replace('.', "_") } else { base }
}

/// Resolves where each unit's per-unit output goes.
#[derive(Debug, Clone)]
pub struct OutputResolver {
  mode: MergeMode,
  multi_dex: bool,
  stable_names: bool,
  intermediate_dir: PathBuf,
}

impl OutputResolver {
  pub fn new(config: &PipelineConfig, mode: MergeMode) -> Self {
    Self {
      mode,
      multi_dex: config.multi_dex,
      stable_names: config.stable_names,
      intermediate_dir: config.intermediate_dir.clone(),
    }
  }

  /// File name for the unit's output inside the intermediate directory.
  ///
  /// Multi-dex outputs are directories holding `classes*.dex`; single-dex
  /// outputs are archives.
  pub fn file_name(&self, unit: &InputUnit) -> String {
    let suffix = if self.multi_dex { "" } else { DOT_JAR };
    format!("{}{}", archive_dir_name(&unit.path), suffix)
  }

  pub fn format(&self) -> Format {
    if self.multi_dex { Format::Directory } else { Format::Jar }
  }

  /// Resolve the slot for a unit.
  ///
  /// In merge mode the slot lives in the intermediate directory and is left
  /// to the dexer to create: every directory there becomes a merge input.
  /// Otherwise it is a final output from the provider, created up front for
  /// multi-dex; stable names are used for project units when enabled, the
  /// newest build winning for a given name.
  pub fn resolve(&self, unit: &InputUnit, provider: &dyn OutputProvider) -> io::Result<PathBuf> {
    let location = self.locate(unit, provider)?;
    if self.multi_dex && !self.mode.is_merge() {
      std::fs::create_dir_all(&location)?;
    }
    Ok(location)
  }

  /// Same slot as [`resolve`](Self::resolve) without creating it. Used for
  /// removed units, whose slot is about to be deleted.
  pub fn locate(&self, unit: &InputUnit, provider: &dyn OutputProvider) -> io::Result<PathBuf> {
    if self.mode.is_merge() {
      return Ok(self.intermediate_dir.join(self.file_name(unit)));
    }

    let name = if self.stable_names && unit.is_project_local() {
      stable_name(unit)
    } else {
      self.file_name(unit)
    };

    provider.content_location(&name, &unit.scopes, self.format())
  }

  pub fn intermediate_dir(&self) -> &Path {
    &self.intermediate_dir
  }
}
