//! The build scenarios the pipeline has to get right.

use predex_lib::merge::MergeMode;
use predex_lib::pipeline::PipelineError;
use predex_lib::unit::{ArchiveStatus, ChangeKind, InputUnit, Scope};

use super::common::{TestEnv, sorted};

fn jar(env: &TestEnv, name: &str, content: &str, status: ArchiveStatus) -> InputUnit {
  let path = env.write(&format!("libs/{}", name), content);
  InputUnit::archive(path, Scope::Project, status)
}

#[tokio::test]
async fn single_unit_is_dexed_straight_into_main() {
  let env = TestEnv::new();
  let classes = env.path("classes");
  env.write("classes/A.class", "a");
  let stale = env.write("out/folders/project/main/classes9.dex", "stale");
  let pipeline = env.pipeline(env.no_merge_config());

  let summary = pipeline
    .run(&[InputUnit::directory(&classes, Scope::Project)], &env.provider(), false)
    .await
    .unwrap();

  assert!(summary.single_pass);
  assert!(pipeline.dexer().predexed().is_empty());
  assert_eq!(pipeline.dexer().converted(), vec![vec![classes]]);

  let main = summary.output.unwrap();
  assert!(main.join("classes.dex").is_file());
  assert!(!stale.exists());
  assert!(!env.intermediate_dir().exists());
}

#[tokio::test]
async fn incremental_merge_reuses_unchanged_outputs() {
  let env = TestEnv::new();
  let config = env.merge_config();
  let provider = env.provider();

  let first = [
    jar(&env, "one.jar", "one", ArchiveStatus::Added),
    jar(&env, "two.jar", "two", ArchiveStatus::Added),
  ];
  env
    .uncached_pipeline(config.clone())
    .run(&first, &provider, false)
    .await
    .unwrap();

  let second = [
    jar(&env, "one.jar", "one", ArchiveStatus::NotChanged),
    jar(&env, "two.jar", "two v2", ArchiveStatus::Changed),
  ];
  let pipeline = env.uncached_pipeline(config.clone());
  let summary = pipeline.run(&second, &provider, true).await.unwrap();

  assert_eq!(summary.mode, Some(MergeMode::Merge));
  assert_eq!(summary.unchanged, 1);
  assert_eq!(pipeline.dexer().predexed(), vec![second[1].path.clone()]);

  let expected = sorted(vec![env.slot(&config, &second[0]), env.slot(&config, &second[1])]);
  assert_eq!(pipeline.dexer().last_merge(), expected);
  assert_eq!(
    std::fs::read_to_string(env.slot(&config, &second[1])).unwrap(),
    "dex:two v2"
  );
}

#[tokio::test]
async fn removed_unit_output_is_deleted_and_left_out_of_the_merge() {
  let env = TestEnv::new();
  let config = env.merge_config();
  let provider = env.provider();

  let units = [
    jar(&env, "a.jar", "a", ArchiveStatus::Added),
    jar(&env, "b.jar", "b", ArchiveStatus::Added),
    jar(&env, "c.jar", "c", ArchiveStatus::Added),
  ];
  env
    .uncached_pipeline(config.clone())
    .run(&units, &provider, false)
    .await
    .unwrap();
  let gone_slot = env.slot(&config, &units[2]);
  assert!(gone_slot.is_file());

  std::fs::remove_file(&units[2].path).unwrap();
  let next = [
    InputUnit::archive(&units[0].path, Scope::Project, ArchiveStatus::NotChanged),
    InputUnit::archive(&units[1].path, Scope::Project, ArchiveStatus::NotChanged),
    InputUnit::archive(&units[2].path, Scope::Project, ArchiveStatus::Removed),
  ];
  let pipeline = env.uncached_pipeline(config.clone());
  let summary = pipeline.run(&next, &provider, true).await.unwrap();

  assert_eq!(summary.deleted, 1);
  assert!(!gone_slot.exists());
  assert!(pipeline.dexer().predexed().is_empty());
  let merged = pipeline.dexer().last_merge();
  assert_eq!(merged.len(), 2);
  assert!(!merged.contains(&gone_slot));
}

#[tokio::test]
async fn vanished_directory_output_is_deleted() {
  let env = TestEnv::new();
  let config = env.merge_config();
  let provider = env.provider();
  let keep = env.path("keep");
  let gone = env.path("gone");
  env.write("keep/A.class", "a");
  env.write("gone/B.class", "b");

  let units = [
    InputUnit::directory(&keep, Scope::Project),
    InputUnit::directory(&gone, Scope::SubProjects),
  ];
  env
    .uncached_pipeline(config.clone())
    .run(&units, &provider, false)
    .await
    .unwrap();
  let gone_slot = env.slot(&config, &units[1]);
  assert!(gone_slot.exists());

  std::fs::remove_dir_all(&gone).unwrap();
  let pipeline = env.uncached_pipeline(config.clone());
  pipeline.run(&units, &provider, true).await.unwrap();

  assert!(!gone_slot.exists());
  assert_eq!(pipeline.dexer().last_merge(), vec![env.slot(&config, &units[0])]);
}

#[tokio::test]
async fn identical_units_are_dexed_once_and_both_slots_filled() {
  let env = TestEnv::new();
  let config = env.no_merge_config();
  let main = env.write("main/guava.jar", "guava bytes");
  let test = env.write("test/guava.jar", "guava bytes");
  let units = [
    InputUnit::archive(&main, Scope::ExternalLibraries, ArchiveStatus::Added),
    InputUnit::archive(&test, Scope::ExternalLibraries, ArchiveStatus::Added),
  ];
  let pipeline = env.pipeline(config.clone());

  let summary = pipeline.run(&units, &env.provider(), false).await.unwrap();

  assert_eq!(pipeline.dexer().predexed().len(), 1);
  assert_eq!(summary.deduplicated, 1);
  for unit in &units {
    let slot = env.slot(&config, unit);
    assert_eq!(
      std::fs::read_to_string(slot.join("classes.dex")).unwrap(),
      "dex:guava bytes"
    );
  }
}

#[tokio::test]
async fn identical_units_feed_one_merge_input() {
  let env = TestEnv::new();
  let config = env.merge_config();
  let a = env.write("main/lib.jar", "same");
  let b = env.write("test/lib.jar", "same");
  let units = [
    InputUnit::archive(&a, Scope::Project, ArchiveStatus::Added),
    InputUnit::archive(&b, Scope::Project, ArchiveStatus::Added),
  ];
  let pipeline = env.uncached_pipeline(config);

  let summary = pipeline.run(&units, &env.provider(), false).await.unwrap();

  assert_eq!(pipeline.dexer().predexed().len(), 1);
  assert_eq!(summary.deduplicated, 1);
  assert_eq!(pipeline.dexer().last_merge().len(), 1);
}

#[tokio::test]
async fn identical_units_feed_one_merge_input_with_main_dex_list() {
  let env = TestEnv::new();
  let mut config = env.no_merge_config();
  config.main_dex_list = Some(env.write("main-dex-list.txt", "com/A.class\n"));
  let a = env.write("main/lib.jar", "same");
  let b = env.write("test/lib.jar", "same");
  let units = [
    InputUnit::archive(&a, Scope::Project, ArchiveStatus::Added),
    InputUnit::archive(&b, Scope::Project, ArchiveStatus::Added),
  ];
  let pipeline = env.uncached_pipeline(config.clone());

  let summary = pipeline.run(&units, &env.provider(), false).await.unwrap();

  assert_eq!(pipeline.dexer().predexed().len(), 1);
  assert_eq!(summary.deduplicated, 1);
  let merged = pipeline.dexer().last_merge();
  assert_eq!(merged.len(), 1);
  let slots: Vec<_> = units.iter().map(|u| env.slot(&config, u)).collect();
  assert!(slots.contains(&merged[0]));
  assert_eq!(slots.iter().filter(|s| s.exists()).count(), 1);
}

#[tokio::test]
async fn nothing_to_merge_is_a_configuration_error() {
  let env = TestEnv::new();
  let a = env.path("a");
  let b = env.path("b");
  env.write("a/A.class", "a");
  env.write("b/B.class", "b");
  let pipeline = env.uncached_pipeline(env.merge_config());

  let result = pipeline
    .run(
      &[InputUnit::directory(&a, Scope::Project), InputUnit::directory(&b, Scope::Project)],
      &env.provider(),
      true,
    )
    .await;

  assert!(
    matches!(result, Err(PipelineError::Configuration(_))),
    "got {:?}",
    result
  );
  assert!(pipeline.dexer().predexed().is_empty());
  assert!(pipeline.dexer().converted().is_empty());
}

#[tokio::test]
async fn changed_directory_is_dexed_again() {
  let env = TestEnv::new();
  let config = env.merge_config();
  let provider = env.provider();
  let app = env.path("app");
  let util = env.path("util");
  env.write("app/A.class", "a");
  env.write("util/U.class", "u");

  let units = [InputUnit::directory(&app, Scope::Project), InputUnit::directory(&util, Scope::Project)];
  env
    .uncached_pipeline(config.clone())
    .run(&units, &provider, false)
    .await
    .unwrap();

  env.write("app/A.class", "a2");
  let next = [
    InputUnit::directory(&app, Scope::Project).with_changes([(app.join("A.class"), ChangeKind::Changed)]),
    InputUnit::directory(&util, Scope::Project),
  ];
  let pipeline = env.uncached_pipeline(config);
  let summary = pipeline.run(&next, &provider, true).await.unwrap();

  assert_eq!(pipeline.dexer().predexed(), vec![app]);
  assert_eq!(summary.unchanged, 1);
  assert_eq!(summary.merged_inputs, 2);
}
