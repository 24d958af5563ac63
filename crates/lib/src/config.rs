//! Pipeline configuration.
//!
//! Loaded from TOML; every field has a default except the tool itself.
//!
//! ```toml
//! debug = true
//! multi_dex = true
//! intermediate_dir = "build/intermediates/pre-dexed"
//!
//! [dex]
//! jumbo_mode = true
//! additional_parameters = ["--minimal-main-dex"]
//!
//! [tool]
//! program = "/opt/sdk/build-tools/25.0.0/dx"
//! version = "25.0.0"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::paths::artifact_cache_dir;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("tool version is not configured")]
  MissingToolVersion,

  #[error("parallelism must be at least 1")]
  ZeroParallelism,
}

/// Options forwarded to the dexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DexOptions {
  /// Dex each unit separately and merge afterwards.
  pub pre_dex_libraries: bool,
  pub jumbo_mode: bool,
  /// Explicit optimize flag; falls back to `!debug` when unset.
  pub optimize: Option<bool>,
  pub additional_parameters: Vec<String>,
  pub java_max_heap_size: Option<String>,
  pub keep_runtime_annotated_classes: bool,
}

impl Default for DexOptions {
  fn default() -> Self {
    Self {
      pre_dex_libraries: true,
      jumbo_mode: false,
      optimize: None,
      additional_parameters: Vec::new(),
      java_max_heap_size: None,
      keep_runtime_annotated_classes: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
  pub program: PathBuf,
  /// Arguments placed before the dexer flags, e.g. `["-jar", "dx.jar"]`.
  #[serde(default)]
  pub args: Vec<String>,
  pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  pub root: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      root: None,
    }
  }
}

impl CacheConfig {
  pub fn root(&self) -> PathBuf {
    self.root.clone().unwrap_or_else(artifact_cache_dir)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(default)]
  pub debug: bool,
  #[serde(default)]
  pub multi_dex: bool,
  #[serde(default)]
  pub main_dex_list: Option<PathBuf>,
  /// Name project outputs by basename so repeated builds overwrite the same slots.
  #[serde(default)]
  pub stable_names: bool,
  #[serde(default = "default_intermediate_dir")]
  pub intermediate_dir: PathBuf,
  #[serde(default)]
  pub parallelism: Option<usize>,
  #[serde(default)]
  pub dex: DexOptions,
  pub tool: ToolConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

fn default_intermediate_dir() -> PathBuf {
  PathBuf::from("build/intermediates/pre-dexed")
}

impl PipelineConfig {
  pub fn new(tool: ToolConfig) -> Self {
    Self {
      debug: false,
      multi_dex: false,
      main_dex_list: None,
      stable_names: false,
      intermediate_dir: default_intermediate_dir(),
      parallelism: None,
      dex: DexOptions::default(),
      tool,
      cache: CacheConfig::default(),
    }
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config: PipelineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    // Relative paths in the file are relative to the file
    if let Some(base) = path.parent() {
      config.resolve_relative_to(base);
    }

    Ok(config)
  }

  fn resolve_relative_to(&mut self, base: &Path) {
    let fix = |p: &mut PathBuf| {
      if p.is_relative() {
        *p = base.join(&*p);
      }
    };
    fix(&mut self.intermediate_dir);
    if let Some(list) = self.main_dex_list.as_mut() {
      fix(list);
    }
    if let Some(root) = self.cache.root.as_mut() {
      fix(root);
    }
    if self.tool.program.components().count() > 1 {
      fix(&mut self.tool.program);
    }
  }

  /// Checks the facts that must be present before anything is scheduled.
  pub fn validate(&self) -> Result<(), ConfigError> {
    match self.tool.version.as_deref() {
      Some(v) if !v.trim().is_empty() => {}
      _ => return Err(ConfigError::MissingToolVersion),
    }
    if self.parallelism == Some(0) {
      return Err(ConfigError::ZeroParallelism);
    }
    Ok(())
  }

  pub fn tool_version(&self) -> Result<&str, ConfigError> {
    self
      .tool
      .version
      .as_deref()
      .filter(|v| !v.trim().is_empty())
      .ok_or(ConfigError::MissingToolVersion)
  }

  pub fn optimize(&self) -> bool {
    self.dex.optimize.unwrap_or(!self.debug)
  }

  /// Legacy multi-dex: a main dex list pins classes into the primary output.
  pub fn multi_dex_legacy(&self) -> bool {
    self.multi_dex && self.main_dex_list.is_some()
  }

  pub fn parallelism(&self) -> usize {
    self
      .parallelism
      .unwrap_or_else(|| std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4))
  }

  /// Whether `unit_count` units are dexed by one tool call instead of per unit.
  pub fn single_pass(&self, unit_count: usize) -> bool {
    unit_count == 1 || !self.dex.pre_dex_libraries
  }

  /// Every global fact that influences the outputs of the whole step.
  ///
  /// Anything added here that changes how the tool is invoked must also be
  /// added to the per-unit cache key.
  pub fn parameter_inputs(&self) -> BTreeMap<&'static str, String> {
    let mut params = BTreeMap::new();
    params.insert("optimize", self.optimize().to_string());
    params.insert("predex", self.dex.pre_dex_libraries.to_string());
    params.insert("jumbo", self.dex.jumbo_mode.to_string());
    params.insert("multidex", self.multi_dex.to_string());
    params.insert("multidex-legacy", self.multi_dex_legacy().to_string());
    params.insert(
      "java-max-heap-size",
      self.dex.java_max_heap_size.clone().unwrap_or_default(),
    );
    params.insert(
      "additional-parameters",
      format!("[{}]", self.dex.additional_parameters.join(", ")),
    );
    params.insert("build-tools", self.tool.version.clone().unwrap_or_default());
    params
  }

  /// Directories written besides the final output.
  pub fn secondary_outputs(&self) -> Vec<PathBuf> {
    if self.dex.pre_dex_libraries && crate::merge::MergeMode::decide(self).is_merge() {
      vec![self.intermediate_dir.clone()]
    } else {
      Vec::new()
    }
  }

  /// Non-incremental inputs besides the units themselves.
  pub fn secondary_files(&self) -> Vec<PathBuf> {
    self.main_dex_list.iter().cloned().collect()
  }
}
