//! Shared helpers for pipeline integration tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use predex_lib::cache::ArtifactCache;
use predex_lib::config::{PipelineConfig, ToolConfig};
use predex_lib::merge::MergeMode;
use predex_lib::output::{DirOutputProvider, OutputResolver};
use predex_lib::pipeline::DexPipeline;
use predex_lib::tool::{DexFlags, Dexer, DexerError};
use predex_lib::unit::InputUnit;
use tempfile::TempDir;

/// Dexer writing `dex:<input>` for each unit and the input list for a merge.
#[derive(Debug, Default)]
pub struct RecordingDexer {
  predexed: Mutex<Vec<PathBuf>>,
  converted: Mutex<Vec<Vec<PathBuf>>>,
}

impl RecordingDexer {
  pub fn predexed(&self) -> Vec<PathBuf> {
    self.predexed.lock().unwrap().clone()
  }

  pub fn converted(&self) -> Vec<Vec<PathBuf>> {
    self.converted.lock().unwrap().clone()
  }

  pub fn last_merge(&self) -> Vec<PathBuf> {
    self.converted().pop().expect("no merge ran")
  }
}

impl Dexer for RecordingDexer {
  async fn predex(&self, input: &Path, output: &Path, flags: &DexFlags) -> Result<(), DexerError> {
    self.predexed.lock().unwrap().push(input.to_path_buf());
    let content = format!("dex:{}", std::fs::read_to_string(input).unwrap_or_default());
    if flags.multi_dex {
      std::fs::create_dir_all(output)?;
      std::fs::write(output.join("classes.dex"), content)?;
    } else {
      if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(output, content)?;
    }
    Ok(())
  }

  async fn convert(&self, inputs: &[PathBuf], output_dir: &Path, _flags: &DexFlags) -> Result<(), DexerError> {
    self.converted.lock().unwrap().push(inputs.to_vec());
    std::fs::create_dir_all(output_dir)?;
    let listing: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
    std::fs::write(output_dir.join("classes.dex"), listing.join("\n"))?;
    Ok(())
  }
}

/// Scratch layout for one test: inputs, outputs, intermediates and cache.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  pub fn write(&self, relative: &str, content: &str) -> PathBuf {
    let path = self.path(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn provider(&self) -> DirOutputProvider {
    DirOutputProvider::new(self.path("out"))
  }

  pub fn intermediate_dir(&self) -> PathBuf {
    self.path("intermediates")
  }

  /// Single-dex configuration: every build merges.
  pub fn merge_config(&self) -> PipelineConfig {
    let mut config = PipelineConfig::new(ToolConfig {
      program: PathBuf::from("fake-dx"),
      args: Vec::new(),
      version: Some("25.0.0".to_string()),
    });
    config.intermediate_dir = self.intermediate_dir();
    config.parallelism = Some(4);
    config
  }

  /// Native multi-dex without a main dex list: per-unit outputs are final.
  pub fn no_merge_config(&self) -> PipelineConfig {
    let mut config = self.merge_config();
    config.multi_dex = true;
    config
  }

  pub fn pipeline(&self, config: PipelineConfig) -> DexPipeline<RecordingDexer> {
    DexPipeline::new(config, RecordingDexer::default())
      .with_cache(Arc::new(ArtifactCache::new(self.path("cache"))))
  }

  pub fn uncached_pipeline(&self, config: PipelineConfig) -> DexPipeline<RecordingDexer> {
    DexPipeline::new(config, RecordingDexer::default()).with_cache(Arc::new(ArtifactCache::disabled()))
  }

  /// Where `unit` lands under `config`.
  pub fn slot(&self, config: &PipelineConfig, unit: &InputUnit) -> PathBuf {
    OutputResolver::new(config, MergeMode::decide(config))
      .locate(unit, &self.provider())
      .unwrap()
  }
}

pub fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
  paths.sort();
  paths
}
