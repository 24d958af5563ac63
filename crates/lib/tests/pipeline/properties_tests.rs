//! Cache reuse, key sensitivity, failure collection and interruption.

use std::sync::Arc;

use predex_lib::cache::ArtifactCache;
use predex_lib::context::RecordingContext;
use predex_lib::pipeline::PipelineError;
use predex_lib::unit::{ArchiveStatus, InputUnit, Scope};

use super::common::TestEnv;

fn libraries(env: &TestEnv) -> [InputUnit; 2] {
  [
    InputUnit::archive(
      env.write("libs/okio.jar", "okio"),
      Scope::ExternalLibraries,
      ArchiveStatus::Added,
    ),
    InputUnit::archive(
      env.write("libs/gson.jar", "gson"),
      Scope::ExternalLibraries,
      ArchiveStatus::Added,
    ),
  ]
}

#[tokio::test]
async fn second_build_is_served_from_the_cache() {
  let env = TestEnv::new();
  let units = libraries(&env);
  let config = env.merge_config();

  let first = env.pipeline(config.clone());
  let summary = first.run(&units, &env.provider(), false).await.unwrap();
  assert_eq!(summary.produced, 2);
  assert_eq!(first.dexer().predexed().len(), 2);

  let second = env.pipeline(config.clone());
  let summary = second.run(&units, &env.provider(), false).await.unwrap();

  assert!(second.dexer().predexed().is_empty());
  assert_eq!(summary.cache_hits, 2);
  assert_eq!(
    std::fs::read_to_string(env.slot(&config, &units[0])).unwrap(),
    "dex:okio"
  );
}

#[tokio::test]
async fn tool_version_change_misses_the_cache() {
  let env = TestEnv::new();
  let units = libraries(&env);
  let config = env.merge_config();

  env.pipeline(config.clone()).run(&units, &env.provider(), false).await.unwrap();

  let mut upgraded = config;
  upgraded.tool.version = Some("26.0.0".to_string());
  let pipeline = env.pipeline(upgraded);
  let summary = pipeline.run(&units, &env.provider(), false).await.unwrap();

  assert_eq!(summary.cache_hits, 0);
  assert_eq!(pipeline.dexer().predexed().len(), 2);
}

#[tokio::test]
async fn project_units_bypass_the_cache() {
  let env = TestEnv::new();
  let units = [
    InputUnit::archive(env.write("a.jar", "a"), Scope::Project, ArchiveStatus::Added),
    InputUnit::archive(env.write("b.jar", "b"), Scope::Project, ArchiveStatus::Added),
  ];
  let config = env.merge_config();

  env.pipeline(config.clone()).run(&units, &env.provider(), false).await.unwrap();
  let pipeline = env.pipeline(config);
  pipeline.run(&units, &env.provider(), false).await.unwrap();

  assert_eq!(pipeline.dexer().predexed().len(), 2);
  assert!(!env.path("cache").exists() || std::fs::read_dir(env.path("cache")).unwrap().count() == 0);
}

#[tokio::test]
async fn repeated_full_builds_produce_the_same_output() {
  let env = TestEnv::new();
  let units = libraries(&env);
  let pipeline = env.pipeline(env.merge_config());

  let first = pipeline.run(&units, &env.provider(), false).await.unwrap();
  let first_main = std::fs::read_to_string(first.output.unwrap().join("classes.dex")).unwrap();
  let second = pipeline.run(&units, &env.provider(), false).await.unwrap();
  let second_main = std::fs::read_to_string(second.output.unwrap().join("classes.dex")).unwrap();

  assert_eq!(first_main, second_main);
}

#[tokio::test]
async fn no_merge_outputs_are_reported_to_the_context() {
  let env = TestEnv::new();
  let units = libraries(&env);
  let context = Arc::new(RecordingContext::new());
  let pipeline = env
    .pipeline(env.no_merge_config())
    .with_cache(Arc::new(ArtifactCache::disabled()))
    .with_context(context.clone());

  pipeline.run(&units, &env.provider(), false).await.unwrap();

  let mut reported = context.files();
  reported.sort();
  let config = env.no_merge_config();
  let mut expected: Vec<_> = units.iter().map(|u| env.slot(&config, u).join("classes.dex")).collect();
  expected.sort();
  assert_eq!(reported, expected);
}

#[tokio::test]
async fn interrupted_build_reports_interruption() {
  let env = TestEnv::new();
  let units = libraries(&env);
  let pipeline = env.pipeline(env.merge_config());
  pipeline.interrupt().trigger();

  let result = pipeline.run(&units, &env.provider(), false).await;

  assert!(matches!(result, Err(PipelineError::Interrupted)), "got {:?}", result);
  assert!(pipeline.interrupt().is_triggered());
  assert!(pipeline.dexer().converted().is_empty());
}
