//! Cache key construction.
//!
//! A key is an ordered list of named facts. Every input that can change the
//! tool's per-unit output has to appear here; the digest of the list addresses
//! the cache entry.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::consts::SHARED_EXTRACTION_DIR;
use crate::unit::InputUnit;
use crate::util::hash::{Hashable, ObjectHash, hash_path_contents};

use super::CacheError;

/// Identity of a unit unpacked under the shared extraction root, relative to it.
pub const EXTRACTED_FILE_FACT: &str = "exploded-aar-file";
/// Absolute identity of any other unit.
pub const FILE_FACT: &str = "file";
pub const CONTENT_FACT: &str = "file-hash";
pub const TOOL_VERSION_FACT: &str = "build-tools-revision";
pub const JUMBO_MODE_FACT: &str = "jumbo-mode";
pub const OPTIMIZE_FACT: &str = "optimize";
pub const MULTI_DEX_FACT: &str = "multi-dex";
const ADDITIONAL_PARAMETER_FACT: &str = "additional-parameter";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
  facts: Vec<(String, String)>,
}

impl Hashable for CacheKey {}

impl CacheKey {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
    self.facts.push((name.into(), value.into()));
    self
  }

  pub fn facts(&self) -> &[(String, String)] {
    &self.facts
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .facts
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v.as_str())
  }

  pub fn digest(&self) -> Result<ObjectHash, CacheError> {
    self.compute_hash().map_err(CacheError::Key)
  }
}

/// Path of `path` below the last shared extraction directory, `/`-separated.
fn relative_to_extraction_root(path: &Path) -> Option<String> {
  let components: Vec<Component<'_>> = path.components().collect();
  let root = components
    .iter()
    .rposition(|c| c.as_os_str() == SHARED_EXTRACTION_DIR)?;

  let rest: Vec<String> = components[root + 1..]
    .iter()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  if rest.is_empty() { None } else { Some(rest.join("/")) }
}

/// Build the key for one unit under the given configuration.
///
/// Two copies of the same extracted library (for example a main and a test
/// variant) collapse to the same key as long as their content matches.
pub fn build_key(unit: &InputUnit, config: &PipelineConfig) -> Result<CacheKey, CacheError> {
  let version = config.tool_version()?;

  let canonical = dunce::canonicalize(&unit.path)
    .or_else(|_| std::path::absolute(&unit.path))
    .unwrap_or_else(|_| unit.path.clone());

  let mut key = CacheKey::new();
  match relative_to_extraction_root(&canonical) {
    Some(relative) => key.push(EXTRACTED_FILE_FACT, relative),
    None => key.push(FILE_FACT, canonical.to_string_lossy()),
  };

  let content = hash_path_contents(&canonical, &[])?;
  key
    .push(CONTENT_FACT, content.0)
    .push(TOOL_VERSION_FACT, version)
    .push(JUMBO_MODE_FACT, config.dex.jumbo_mode.to_string())
    .push(OPTIMIZE_FACT, config.optimize().to_string())
    .push(MULTI_DEX_FACT, config.multi_dex.to_string());

  for (index, parameter) in config.dex.additional_parameters.iter().enumerate() {
    key.push(format!("{}{}", ADDITIONAL_PARAMETER_FACT, index + 1), parameter.clone());
  }

  Ok(key)
}
