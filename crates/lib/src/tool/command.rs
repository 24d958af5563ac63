//! Subprocess dexer.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ToolConfig;
use crate::interrupt::Interrupt;

use super::messages::{MessageKind, log_messages, parse_tool_output};
use super::{DexFlags, Dexer, DexerError};

/// Runs a dx-compatible executable.
///
/// The child is killed when the interrupt fires or when the owning job is
/// dropped.
#[derive(Debug, Clone)]
pub struct CommandDexer {
  program: PathBuf,
  leading_args: Vec<String>,
  interrupt: Interrupt,
}

impl CommandDexer {
  pub fn new(tool: &ToolConfig, interrupt: Interrupt) -> Self {
    Self {
      program: tool.program.clone(),
      leading_args: tool.args.clone(),
      interrupt,
    }
  }

  fn build_args(&self, flags: &DexFlags, output: &Path, inputs: &[&Path], with_main_dex_list: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = self.leading_args.iter().map(OsString::from).collect();

    if let Some(heap) = &flags.java_max_heap_size {
      args.push(format!("-JXmx{heap}").into());
    }
    args.push("--dex".into());
    if !flags.optimize {
      args.push("--no-optimize".into());
    }
    if flags.jumbo_mode {
      args.push("--force-jumbo".into());
    }
    if flags.multi_dex {
      args.push("--multi-dex".into());
    }
    if with_main_dex_list && let Some(list) = &flags.main_dex_list {
      let mut arg = OsString::from("--main-dex-list=");
      arg.push(list);
      args.push(arg);
    }
    args.extend(flags.additional_parameters.iter().map(OsString::from));

    let mut out = OsString::from("--output=");
    out.push(output);
    args.push(out);
    args.extend(inputs.iter().map(|p| p.as_os_str().to_os_string()));
    args
  }

  async fn run(&self, args: Vec<OsString>) -> Result<(), DexerError> {
    if self.interrupt.is_triggered() {
      return Err(DexerError::Interrupted);
    }

    debug!(program = ?self.program, ?args, "spawning dexer");

    let child = Command::new(&self.program)
      .args(&args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| DexerError::Spawn {
        program: self.program.clone(),
        source,
      })?;

    let output = tokio::select! {
      output = child.wait_with_output() => output?,
      () = self.interrupt.triggered() => {
        warn!(program = ?self.program, "dexer interrupted, killing process");
        return Err(DexerError::Interrupted);
      }
    };

    let stdout = parse_tool_output(&String::from_utf8_lossy(&output.stdout), MessageKind::Info);
    let stderr = parse_tool_output(&String::from_utf8_lossy(&output.stderr), MessageKind::Warning);
    log_messages(&stdout);
    log_messages(&stderr);

    if output.status.success() {
      return Ok(());
    }

    let mut messages: Vec<String> = stderr
      .iter()
      .filter(|m| m.kind == MessageKind::Error)
      .map(|m| m.text.clone())
      .collect();
    if messages.is_empty() {
      messages = stderr.into_iter().map(|m| m.text).collect();
    }

    Err(DexerError::Failed {
      program: self.program.clone(),
      code: output.status.code(),
      messages,
    })
  }
}

impl Dexer for CommandDexer {
  async fn predex(&self, input: &Path, output: &Path, flags: &DexFlags) -> Result<(), DexerError> {
    if flags.multi_dex {
      tokio::fs::create_dir_all(output).await?;
    } else if let Some(parent) = output.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    info!(input = ?input, output = ?output, "pre-dexing");
    self.run(self.build_args(flags, output, &[input], false)).await
  }

  async fn convert(&self, inputs: &[PathBuf], output_dir: &Path, flags: &DexFlags) -> Result<(), DexerError> {
    tokio::fs::create_dir_all(output_dir).await?;

    info!(inputs = inputs.len(), output = ?output_dir, "converting");
    let inputs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    self.run(self.build_args(flags, output_dir, &inputs, true)).await
  }
}
