//! Implementation of the `predex build` command.
//!
//! Units come from the command line without change information. The state
//! recorded by the previous build is diffed against the inputs on disk to
//! derive it, so a second invocation only redoes what changed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use predex_lib::config::PipelineConfig;
use predex_lib::interrupt::Interrupt;
use predex_lib::output::DirOutputProvider;
use predex_lib::pipeline::{DexPipeline, RunSummary};
use predex_lib::state::{InputState, STATE_FILE_NAME};
use predex_lib::tool::CommandDexer;
use predex_lib::unit::{ArchiveStatus, InputUnit, Scope};

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

/// Parse `KIND:SCOPE:PATH`.
fn parse_unit(arg: &str) -> Result<InputUnit> {
  let mut parts = arg.splitn(3, ':');
  let (Some(kind), Some(scope), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
    bail!("invalid unit '{}', expected KIND:SCOPE:PATH", arg);
  };

  let scope: Scope = scope.parse().map_err(|e: String| anyhow!(e))?;
  let path = absolute(Path::new(path));

  match kind {
    "dir" => Ok(InputUnit::directory(path, scope)),
    "jar" => Ok(InputUnit::archive(path, scope, ArchiveStatus::Added)),
    other => bail!("unknown unit kind '{}', expected 'dir' or 'jar'", other),
  }
}

fn absolute(path: &Path) -> PathBuf {
  dunce::canonicalize(path)
    .or_else(|_| std::path::absolute(path))
    .unwrap_or_else(|_| path.to_path_buf())
}

/// Execute the build command.
///
/// - Loads the configuration and parses the units
/// - Derives change information from the recorded state (full build without one)
/// - Runs the pipeline, cancelling it on Ctrl-C
/// - Records the new state, or drops it when the build failed
pub fn cmd_build(config_path: &Path, out: &Path, full: bool, units: &[String], output: OutputFormat) -> Result<()> {
  let start = Instant::now();

  let config = PipelineConfig::load(config_path).context("Failed to load configuration")?;
  let units = units.iter().map(|s| parse_unit(s)).collect::<Result<Vec<_>>>()?;

  let state_path = out.join(STATE_FILE_NAME);
  let current = InputState::capture(&config, &units).context("Failed to record input state")?;
  let previous = if full {
    None
  } else {
    match InputState::load(&state_path) {
      Ok(previous) => previous,
      Err(e) => {
        warn!(error = %e, "ignoring unreadable build state");
        None
      }
    }
  };

  let (inputs, incremental) = match previous {
    Some(previous) => {
      let derived = previous.derive(&current, &units);
      if derived.requires_full_build {
        (units, false)
      } else {
        (derived.units, true)
      }
    }
    None => (units, false),
  };
  info!(units = inputs.len(), incremental, "prepared inputs");

  let interrupt = Interrupt::new();
  let dexer = CommandDexer::new(&config.tool, interrupt.clone());
  let pipeline = DexPipeline::new(config, dexer).with_interrupt(interrupt.clone());
  let provider = DirOutputProvider::new(out);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async {
    let watcher = tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        interrupt.trigger();
      }
    });
    let result = pipeline.run(&inputs, &provider, incremental).await;
    watcher.abort();
    result
  });

  let summary = match result {
    Ok(summary) => summary,
    Err(e) => {
      // Outputs no longer match the recorded inputs
      if let Err(remove) = std::fs::remove_file(&state_path)
        && remove.kind() != std::io::ErrorKind::NotFound
      {
        warn!(path = %state_path.display(), error = %remove, "failed to drop build state");
      }
      return Err(e).context("Build failed");
    }
  };

  current.save(&state_path).context("Failed to save build state")?;

  if output.is_json() {
    print_json(&summary)?;
  } else {
    print_summary(&summary, incremental);
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}

fn print_summary(summary: &RunSummary, incremental: bool) {
  println!();
  print_success(if incremental {
    "Incremental build complete!"
  } else {
    "Build complete!"
  });

  if summary.single_pass {
    print_info("Dexed every unit in a single pass");
  }
  print_stat("Units dexed", &summary.produced.to_string());
  print_stat("Cache hits", &summary.cache_hits.to_string());
  print_stat("Deduplicated", &summary.deduplicated.to_string());
  print_stat("Outputs deleted", &summary.deleted.to_string());
  print_stat("Unchanged", &summary.unchanged.to_string());
  if summary.merged_inputs > 0 {
    print_stat("Merged inputs", &summary.merged_inputs.to_string());
  }
  if let Some(out) = &summary.output {
    print_stat("Output", &out.display().to_string());
  }
}
