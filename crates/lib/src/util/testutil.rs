//! Test utilities for predex-lib.
//!
//! An in-process dexer that writes recognizable outputs, plus helpers to lay
//! out input units on disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::{PipelineConfig, ToolConfig};
use crate::interrupt::Interrupt;
use crate::tool::{DexFlags, Dexer, DexerError};

/// Dexer that records its calls and writes `dex:<input>` outputs.
#[derive(Debug, Default)]
pub struct FakeDexer {
  predexed: Mutex<Vec<PathBuf>>,
  converted: Mutex<Vec<Vec<PathBuf>>>,
  failing: HashSet<PathBuf>,
  slow: HashMap<PathBuf, Duration>,
  interrupt: Option<Interrupt>,
}

impl FakeDexer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail the pre-dex step for these inputs.
  pub fn failing_on(paths: impl IntoIterator<Item = PathBuf>) -> Self {
    Self {
      failing: paths.into_iter().collect(),
      ..Self::default()
    }
  }

  /// Take `delay` to pre-dex `path`.
  pub fn slow_on(mut self, path: impl Into<PathBuf>, delay: Duration) -> Self {
    self.slow.insert(path.into(), delay);
    self
  }

  /// Abandon slow pre-dexing once `interrupt` fires, like a killed tool.
  pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  pub fn predexed(&self) -> Vec<PathBuf> {
    self.predexed.lock().unwrap().clone()
  }

  pub fn converted(&self) -> Vec<Vec<PathBuf>> {
    self.converted.lock().unwrap().clone()
  }
}

impl Dexer for FakeDexer {
  async fn predex(&self, input: &Path, output: &Path, flags: &DexFlags) -> Result<(), DexerError> {
    self.predexed.lock().unwrap().push(input.to_path_buf());
    if let Some(delay) = self.slow.get(input).copied() {
      match &self.interrupt {
        Some(interrupt) => {
          tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = interrupt.triggered() => return Err(DexerError::Interrupted),
          }
        }
        None => tokio::time::sleep(delay).await,
      }
    }

    if self.failing.contains(input) {
      return Err(DexerError::Failed {
        program: PathBuf::from("fake-dx"),
        code: Some(1),
        messages: vec![format!("error: cannot dex {}", input.display())],
      });
    }

    let content = format!("dex:{}", input.display());
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

pub fn test_config(intermediate_dir: &Path) -> PipelineConfig {
  let mut config = PipelineConfig::new(ToolConfig {
    program: PathBuf::from("fake-dx"),
    args: Vec::new(),
    version: Some("25.0.0".to_string()),
  });
  config.intermediate_dir = intermediate_dir.to_path_buf();
  config
}

/// Write a file, creating its parent directories.
pub fn write_file(path: &Path, content: &str) -> PathBuf {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
  path.to_path_buf()
}
