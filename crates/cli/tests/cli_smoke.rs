//! CLI smoke tests for predex.
//!
//! Builds run against a shell script standing in for the dex tool, so they
//! are unix only.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the predex binary.
fn predex_cmd() -> Command {
  cargo_bin_cmd!("predex")
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  predex_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  predex_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("predex"));
}

#[test]
fn subcommand_help_works() {
  for args in [vec!["build"], vec!["cache"], vec!["cache", "stats"], vec!["cache", "clean"]] {
    predex_cmd()
      .args(&args)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// build
// =============================================================================

#[test]
fn build_without_config_fails() {
  let temp = TempDir::new().unwrap();

  predex_cmd()
    .arg("build")
    .arg("--config")
    .arg(temp.path().join("missing.toml"))
    .arg("--out")
    .arg(temp.path().join("out"))
    .arg("dir:project:classes")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load configuration"));
}

#[cfg(unix)]
mod builds {
  use std::os::unix::fs::PermissionsExt;
  use std::path::{Path, PathBuf};

  use super::*;

  const FAKE_DX: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    --output=*) out="${arg#--output=}" ;;
  esac
done
echo "$@" >> "$(dirname "$0")/calls.log"
if [ -d "$out" ]; then
  echo dex > "$out/classes.dex"
else
  echo dex > "$out"
fi
"#;

  struct Project {
    temp: TempDir,
  }

  impl Project {
    fn new() -> Self {
      let temp = TempDir::new().unwrap();
      let tool = temp.path().join("dx.sh");
      std::fs::write(&tool, FAKE_DX).unwrap();
      std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

      std::fs::write(temp.path().join("a.jar"), "a").unwrap();
      std::fs::write(temp.path().join("b.jar"), "b").unwrap();

      let project = Self { temp };
      project.configure("");
      project
    }

    /// Write `predex.toml` with `extra` prepended to the top-level keys.
    fn configure(&self, extra: &str) {
      let config = format!(
        "{}intermediate_dir = \"inter\"\n\n[tool]\nprogram = \"{}\"\nversion = \"25.0.0\"\n\n[cache]\nroot = \"cache\"\n",
        extra,
        self.path("dx.sh").display()
      );
      std::fs::write(self.path("predex.toml"), config).unwrap();
    }

    fn path(&self, name: &str) -> PathBuf {
      self.temp.path().join(name)
    }

    fn build(&self) -> Command {
      self.build_jars(&["a.jar", "b.jar"])
    }

    fn build_jars(&self, jars: &[&str]) -> Command {
      let mut cmd = predex_cmd();
      cmd
        .arg("build")
        .arg("--config")
        .arg(self.path("predex.toml"))
        .arg("--out")
        .arg(self.path("out"));
      for jar in jars {
        cmd.arg(unit("jar:project", &self.path(jar)));
      }
      cmd
    }

    fn calls(&self) -> Vec<String> {
      std::fs::read_to_string(self.path("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
    }
  }

  fn unit(prefix: &str, path: &Path) -> String {
    format!("{}:{}", prefix, path.display())
  }

  #[test]
  fn first_build_dexes_and_merges() {
    let project = Project::new();

    project
      .build()
      .assert()
      .success()
      .stdout(predicate::str::contains("Build complete!"));

    assert_eq!(project.calls().len(), 3);
    assert!(project.path("out/.predex-state.json").is_file());
  }

  #[test]
  fn second_build_only_merges() {
    let project = Project::new();
    project.build().assert().success();

    project
      .build()
      .assert()
      .success()
      .stdout(predicate::str::contains("Incremental build complete!"));

    assert_eq!(project.calls().len(), 4);
  }

  #[test]
  fn full_flag_rebuilds_everything() {
    let project = Project::new();
    project.build().assert().success();

    project.build().arg("--full").assert().success();

    assert_eq!(project.calls().len(), 6);
  }

  #[test]
  fn config_change_rebuilds_everything() {
    let project = Project::new();
    project.build().assert().success();

    project.configure("debug = true\n");
    project
      .build()
      .assert()
      .success()
      .stdout(predicate::str::contains("Build complete!"));

    assert_eq!(project.calls().len(), 6);
  }

  #[test]
  fn growing_past_one_unit_merges_every_unit() {
    let project = Project::new();
    project.build_jars(&["a.jar"]).assert().success();
    assert_eq!(project.calls().len(), 1);

    project.build().assert().success();

    let calls = project.calls();
    assert_eq!(calls.len(), 4);
    let merge = calls.last().unwrap();
    assert_eq!(merge.matches("/inter/").count(), 2, "merge call: {merge}");
  }

  #[test]
  fn json_output_reports_summary() {
    let project = Project::new();

    project
      .build()
      .args(["-o", "json"])
      .assert()
      .success()
      .stdout(predicate::str::contains("\"produced\": 2"))
      .stdout(predicate::str::contains("\"merged_inputs\": 2"));
  }

  #[test]
  fn malformed_unit_fails() {
    let project = Project::new();

    predex_cmd()
      .arg("build")
      .arg("--config")
      .arg(project.path("predex.toml"))
      .arg("--out")
      .arg(project.path("out"))
      .arg("classes")
      .assert()
      .failure()
      .stderr(predicate::str::contains("KIND:SCOPE:PATH"));
  }

  #[test]
  fn tool_failure_fails_the_build() {
    let project = Project::new();
    let tool = project.path("dx.sh");
    std::fs::write(&tool, "#!/bin/sh\necho 'error: broken input' >&2\nexit 3\n").unwrap();

    project
      .build()
      .assert()
      .failure()
      .stderr(predicate::str::contains("failed to dex"));

    assert!(!project.path("out/.predex-state.json").exists());
  }
}

// =============================================================================
// cache
// =============================================================================

#[test]
fn cache_stats_on_empty_cache() {
  let temp = TempDir::new().unwrap();

  predex_cmd()
    .args(["cache", "stats"])
    .env("PREDEX_CACHE_DIR", temp.path().join("cache"))
    .assert()
    .success()
    .stdout(predicate::str::contains("Entries"));
}

#[test]
fn cache_clean_dry_run_json() {
  let temp = TempDir::new().unwrap();

  predex_cmd()
    .args(["cache", "clean", "--dry-run", "--all", "-o", "json"])
    .env("PREDEX_CACHE_DIR", temp.path().join("cache"))
    .assert()
    .success()
    .stdout(predicate::str::contains("deleted_paths"));
}

#[test]
fn cache_clean_reports_dry_run() {
  let temp = TempDir::new().unwrap();

  predex_cmd()
    .args(["cache", "clean", "--dry-run"])
    .env("PREDEX_CACHE_DIR", temp.path().join("cache"))
    .assert()
    .success()
    .stdout(predicate::str::contains("Dry run"));
}
