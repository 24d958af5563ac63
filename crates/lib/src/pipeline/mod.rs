//! The dex transform entry point.
//!
//! [`DexPipeline::run`] takes the units of one build and either dexes them in
//! one tool invocation or pre-dexes them unit by unit:
//!
//! 1. decide the merge mode from configuration
//! 2. classify every unit
//! 3. schedule pre-dex and delete jobs, waiting for all of them
//! 4. in merge mode, merge the intermediate directory's contents into `main`

mod types;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ArtifactCache;
use crate::classify::partition;
use crate::config::PipelineConfig;
use crate::consts::MAIN_OUTPUT_NAME;
use crate::context::{BuildContext, NoopContext, report_outputs};
use crate::interrupt::Interrupt;
use crate::merge::{MergeManifest, MergeMode};
use crate::output::{Format, OutputProvider, OutputResolver};
use crate::schedule::{Job, JobError, JobFailure, Scheduler, WorkerPool};
use crate::tool::{DexFlags, Dexer, DexerError};
use crate::unit::{InputUnit, Scope};
use crate::util::fs::{clear_dir, remove_path};

pub use types::{PipelineError, RunSummary};

pub struct DexPipeline<D> {
  config: Arc<PipelineConfig>,
  dexer: Arc<D>,
  cache: Arc<ArtifactCache>,
  pool: WorkerPool,
  context: Arc<dyn BuildContext>,
  interrupt: Interrupt,
}

impl<D: Dexer> DexPipeline<D> {
  /// Pipeline with a cache and worker pool derived from `config`.
  pub fn new(config: PipelineConfig, dexer: D) -> Self {
    let cache = if config.cache.enabled {
      ArtifactCache::new(config.cache.root())
    } else {
      ArtifactCache::disabled()
    };
    let pool = WorkerPool::new(config.parallelism());

    Self {
      config: Arc::new(config),
      dexer: Arc::new(dexer),
      cache: Arc::new(cache),
      pool,
      context: Arc::new(NoopContext),
      interrupt: Interrupt::new(),
    }
  }

  pub fn with_cache(mut self, cache: Arc<ArtifactCache>) -> Self {
    self.cache = cache;
    self
  }

  /// Share a pool with other pipelines.
  pub fn with_pool(mut self, pool: WorkerPool) -> Self {
    self.pool = pool;
    self
  }

  pub fn with_context(mut self, context: Arc<dyn BuildContext>) -> Self {
    self.context = context;
    self
  }

  pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
    self.interrupt = interrupt;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn dexer(&self) -> &Arc<D> {
    &self.dexer
  }

  pub fn interrupt(&self) -> &Interrupt {
    &self.interrupt
  }

  /// Run one build over `inputs`.
  ///
  /// A non-incremental build starts by deleting every previous output. On
  /// failure every failed unit is reported; an interrupted build returns
  /// [`PipelineError::Interrupted`] and leaves the interrupt triggered.
  pub async fn run(
    &self,
    inputs: &[InputUnit],
    provider: &dyn OutputProvider,
    incremental: bool,
  ) -> Result<RunSummary, PipelineError> {
    self.config.validate()?;

    info!(
      units = inputs.len(),
      incremental,
      predex = self.config.dex.pre_dex_libraries,
      "starting dex transform"
    );

    if !self.config.dex.keep_runtime_annotated_classes && self.config.main_dex_list.is_some() {
      info!("keep_runtime_annotated_classes has no effect in native multi-dex");
    }

    if !incremental {
      provider
        .delete_all()
        .map_err(|e| PipelineError::io("failed to delete previous outputs", e))?;
    }

    if self.config.single_pass(inputs.len()) {
      return self.run_single_pass(inputs, provider).await;
    }

    let mode = MergeMode::decide(&self.config);
    let resolver = OutputResolver::new(&self.config, mode);
    debug!(?mode, "merge decision");

    if !incremental {
      for dir in self.config.secondary_outputs() {
        remove_path(&dir)
          .and_then(|()| std::fs::create_dir_all(&dir))
          .map_err(|e| PipelineError::io(format!("failed to reset {}", dir.display()), e))?;
      }
    }

    let classification = partition(inputs, incremental);
    let mut jobs = Vec::new();

    for (unit, status) in &classification.work {
      let output = resolver
        .resolve(unit, provider)
        .map_err(|e| PipelineError::io(format!("failed to resolve output for {}", unit), e))?;
      debug!(unit = %unit, %status, output = %output.display(), "scheduling pre-dex");
      jobs.push(Job::Predex {
        unit: (*unit).clone(),
        output,
        cacheable: unit.is_external_library(),
      });
    }

    for unit in &classification.removed {
      let output = resolver
        .locate(unit, provider)
        .map_err(|e| PipelineError::io(format!("failed to resolve output for {}", unit), e))?;
      if output.symlink_metadata().is_ok() {
        debug!(unit = %unit, output = %output.display(), "scheduling delete");
        jobs.push(Job::Delete {
          unit: unit.path.clone(),
          output,
        });
      }
    }

    debug!(unchanged = classification.unchanged.len(), "skipping unchanged units");

    let scheduler = Scheduler::new(
      self.dexer.clone(),
      self.cache.clone(),
      self.pool.clone(),
      self.context.clone(),
      self.interrupt.clone(),
    );
    let report = scheduler.run(jobs, self.config.clone()).await;

    if report.interrupted() || self.interrupt.is_triggered() {
      return Err(PipelineError::Interrupted);
    }
    if !report.failures.is_empty() {
      return Err(PipelineError::Production {
        failures: report.failures,
      });
    }

    let mut summary = RunSummary {
      single_pass: false,
      mode: Some(mode),
      produced: report.produced,
      cache_hits: report.cache_hits,
      deduplicated: report.deduplicated,
      deleted: report.deleted,
      unchanged: classification.unchanged.len(),
      merged_inputs: 0,
      output: None,
    };

    if mode.is_merge() {
      let manifest = MergeManifest::discover(resolver.intermediate_dir(), self.config.multi_dex)?;
      let main = self.prepare_main(inputs, provider)?;

      info!(inputs = manifest.inputs.len(), output = %main.display(), "merging");
      self.convert(&manifest.inputs, &main).await?;

      summary.merged_inputs = manifest.inputs.len();
      summary.output = Some(main);
    }

    info!(
      produced = summary.produced,
      cache_hits = summary.cache_hits,
      deleted = summary.deleted,
      merged = summary.merged_inputs,
      "dex transform complete"
    );
    Ok(summary)
  }

  /// Dex every unit with one invocation straight into `main`.
  async fn run_single_pass(
    &self,
    inputs: &[InputUnit],
    provider: &dyn OutputProvider,
  ) -> Result<RunSummary, PipelineError> {
    info!(units = inputs.len(), "dexing in a single pass");

    let main = self.prepare_main(inputs, provider)?;

    // Archives first, then directories
    let paths: Vec<PathBuf> = inputs
      .iter()
      .filter(|u| u.is_archive())
      .chain(inputs.iter().filter(|u| !u.is_archive()))
      .map(|u| u.path.clone())
      .collect();

    self.convert(&paths, &main).await?;
    let reported = report_outputs(self.context.as_ref(), &main);
    debug!(files = reported, "reported outputs");

    Ok(RunSummary {
      single_pass: true,
      produced: inputs.len(),
      output: Some(main),
      ..RunSummary::default()
    })
  }

  /// Create `main` and empty it.
  fn prepare_main(&self, inputs: &[InputUnit], provider: &dyn OutputProvider) -> Result<PathBuf, PipelineError> {
    let mut scopes: BTreeSet<Scope> = inputs.iter().flat_map(|u| u.scopes.iter().copied()).collect();
    if scopes.is_empty() {
      scopes.insert(Scope::Project);
    }

    let main = provider
      .content_location(MAIN_OUTPUT_NAME, &scopes, Format::Directory)
      .map_err(|e| PipelineError::io("failed to resolve the main output", e))?;
    clear_dir(&main).map_err(|e| PipelineError::io(format!("failed to clean {}", main.display()), e))?;
    Ok(main)
  }

  async fn convert(&self, inputs: &[PathBuf], output: &Path) -> Result<(), PipelineError> {
    let flags = DexFlags::from_config(&self.config);
    match self.dexer.convert(inputs, output, &flags).await {
      Ok(()) => Ok(()),
      Err(DexerError::Interrupted) => Err(PipelineError::Interrupted),
      Err(e) => Err(PipelineError::Production {
        failures: vec![JobFailure {
          unit: output.to_path_buf(),
          error: JobError::from(e),
        }],
      }),
    }
  }
}
