use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::merge::{MergeInputError, MergeMode};
use crate::schedule::JobFailure;

#[derive(Debug, Error)]
pub enum PipelineError {
  /// Required facts are missing or an invariant does not hold. Nothing was scheduled,
  /// or the merge had nothing to work with.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// One or more units (or the merge) failed. Every failure is listed.
  #[error("{}", format_failures(.failures))]
  Production { failures: Vec<JobFailure> },

  #[error("build interrupted")]
  Interrupted,

  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: std::io::Error,
  },
}

fn format_failures(failures: &[JobFailure]) -> String {
  let mut message = format!("{} unit(s) failed to dex", failures.len());
  for failure in failures {
    message.push_str("\n  - ");
    message.push_str(&failure.to_string());
  }
  message
}

impl PipelineError {
  pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
    PipelineError::Io {
      context: context.into(),
      source,
    }
  }
}

impl From<ConfigError> for PipelineError {
  fn from(e: ConfigError) -> Self {
    PipelineError::Configuration(e.to_string())
  }
}

impl From<MergeInputError> for PipelineError {
  fn from(e: MergeInputError) -> Self {
    match e {
      MergeInputError::Empty(_) => PipelineError::Configuration(e.to_string()),
      MergeInputError::List { path, source } => {
        PipelineError::io(format!("failed to list merge inputs in {}", path.display()), source)
      }
    }
  }
}

/// What a successful run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
  /// Every unit went through one tool invocation.
  pub single_pass: bool,
  pub mode: Option<MergeMode>,
  pub produced: usize,
  pub cache_hits: usize,
  pub deduplicated: usize,
  pub deleted: usize,
  pub unchanged: usize,
  pub merged_inputs: usize,
  /// Final output directory, when one was written.
  pub output: Option<PathBuf>,
}
