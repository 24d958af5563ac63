//! Implementation of the `predex cache` commands.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use predex_lib::cache::gc;
use predex_lib::config::PipelineConfig;
use predex_lib::platform::paths::artifact_cache_dir;

use crate::output::{OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success};

fn cache_root(config: Option<&Path>) -> Result<PathBuf> {
  match config {
    Some(path) => {
      let config = PipelineConfig::load(path).context("Failed to load configuration")?;
      Ok(config.cache.root())
    }
    None => Ok(artifact_cache_dir()),
  }
}

pub fn cmd_cache_stats(config: Option<&Path>, output: OutputFormat) -> Result<()> {
  let root = cache_root(config)?;
  let stats = gc::stats(&root).context("Failed to read cache")?;

  if output.is_json() {
    print_json(&stats)?;
  } else {
    print_info(&format!("Cache at {}", root.display()));
    print_stat("Entries", &stats.entries.to_string());
    print_stat("Incomplete", &stats.incomplete.to_string());
    print_stat("Temporary", &stats.temp_dirs.to_string());
    print_stat("Size", &format_bytes(stats.bytes));
  }

  Ok(())
}

pub fn cmd_cache_clean(config: Option<&Path>, dry_run: bool, all: bool, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  let root = cache_root(config)?;

  let result = if all {
    gc::clear(&root, dry_run)
  } else {
    gc::sweep(&root, dry_run)
  }
  .context("Failed to clean cache")?;

  if output.is_json() {
    print_json(&result)?;
  } else {
    println!();
    if dry_run {
      print_info("Dry run - no changes made");
    } else {
      print_success("Cache cleaned!");
    }
    print_stat("Entries removed", &result.stats.deleted.to_string());
    print_stat("Skipped (in use)", &result.stats.skipped_in_use.to_string());
    print_stat("Space freed", &format_bytes(result.stats.bytes_freed));
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(())
}
