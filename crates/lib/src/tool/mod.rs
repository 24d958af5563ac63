//! The external dexer.
//!
//! The pipeline only needs two operations from the tool: dex one unit into
//! an intermediate output, and convert a list of inputs into the final output.
//! [`CommandDexer`] runs a dx-compatible executable as a subprocess.

mod command;
mod messages;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::PipelineConfig;

pub use command::CommandDexer;
pub use messages::{MessageKind, ToolMessage, parse_tool_output};

#[derive(Debug, Error)]
pub enum DexerError {
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} exited with code {code:?}{}", format_messages(.messages))]
  Failed {
    program: PathBuf,
    code: Option<i32>,
    messages: Vec<String>,
  },

  #[error("dexing interrupted")]
  Interrupted,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn format_messages(messages: &[String]) -> String {
  if messages.is_empty() {
    String::new()
  } else {
    format!(": {}", messages.join("; "))
  }
}

/// Flags that change what the tool produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexFlags {
  pub multi_dex: bool,
  pub main_dex_list: Option<PathBuf>,
  pub optimize: bool,
  pub jumbo_mode: bool,
  pub additional_parameters: Vec<String>,
  pub java_max_heap_size: Option<String>,
}

impl DexFlags {
  pub fn from_config(config: &PipelineConfig) -> Self {
    Self {
      multi_dex: config.multi_dex,
      main_dex_list: config.main_dex_list.clone(),
      optimize: config.optimize(),
      jumbo_mode: config.dex.jumbo_mode,
      additional_parameters: config.dex.additional_parameters.clone(),
      java_max_heap_size: config.dex.java_max_heap_size.clone(),
    }
  }
}

pub trait Dexer: Send + Sync + 'static {
  /// Dex a single unit. In multi-dex mode `output` is a directory that
  /// already exists; otherwise it is the archive file to write.
  fn predex(&self, input: &Path, output: &Path, flags: &DexFlags)
  -> impl Future<Output = Result<(), DexerError>> + Send;

  /// Convert (or merge) `inputs` into the final output directory.
  fn convert(
    &self,
    inputs: &[PathBuf],
    output_dir: &Path,
    flags: &DexFlags,
  ) -> impl Future<Output = Result<(), DexerError>> + Send;
}
