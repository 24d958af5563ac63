//! Per-unit transform scheduling.
//!
//! Jobs run on the shared [`WorkerPool`]. The scheduler always waits for every
//! job, successful or not, and returns one report with all failures.
//!
//! A pre-dex job:
//! 1. claims the unit's fingerprint; if an identical unit was already claimed
//!    this run the job produces nothing (without a merge it copies the other
//!    job's output once that job finishes)
//! 2. computes the cache key when the unit is cacheable
//! 3. produces its output through the cache (or directly)
//! 4. reports every output file to the build context
//!
//! A delete job removes the prior output of a removed unit.

mod dedup;
mod pool;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::cache::{ArtifactCache, CacheError, CacheOutcome, build_key, produce_uncached};
use crate::config::PipelineConfig;
use crate::context::{BuildContext, report_outputs};
use crate::interrupt::Interrupt;
use crate::merge::MergeMode;
use crate::tool::{DexFlags, Dexer, DexerError};
use crate::unit::InputUnit;
use crate::util::fs::{copy_path, remove_path};

pub use dedup::{Claim, DuplicateOf, FingerprintSet, OwnerGuard, unit_fingerprint};
pub use pool::WorkerPool;

#[derive(Debug, Error)]
pub enum JobError {
  #[error(transparent)]
  Dexer(DexerError),

  #[error(transparent)]
  Cache(#[from] CacheError),

  #[error("failed to remove {path}: {source}")]
  Delete {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to copy {path}: {source}")]
  Copy {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("interrupted")]
  Interrupted,

  #[error("job aborted: {0}")]
  Aborted(String),
}

impl From<DexerError> for JobError {
  fn from(e: DexerError) -> Self {
    match e {
      DexerError::Interrupted => JobError::Interrupted,
      other => JobError::Dexer(other),
    }
  }
}

impl JobError {
  pub fn is_interrupted(&self) -> bool {
    matches!(self, JobError::Interrupted)
  }
}

/// A failed job and the unit it was working on.
#[derive(Debug)]
pub struct JobFailure {
  pub unit: PathBuf,
  pub error: JobError,
}

impl fmt::Display for JobFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.unit.display(), self.error)
  }
}

#[derive(Debug, Clone)]
pub enum Job {
  /// Produce the output of `unit` at `output`.
  Predex {
    unit: InputUnit,
    output: PathBuf,
    cacheable: bool,
  },
  /// Remove the output previously produced for `unit`.
  Delete { unit: PathBuf, output: PathBuf },
}

impl Job {
  pub fn unit_path(&self) -> &Path {
    match self {
      Job::Predex { unit, .. } => &unit.path,
      Job::Delete { unit, .. } => unit,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
  Produced,
  CacheHit,
  Deduplicated,
  Deleted,
}

#[derive(Debug, Default)]
pub struct ScheduleReport {
  pub produced: usize,
  pub cache_hits: usize,
  pub deduplicated: usize,
  pub deleted: usize,
  pub failures: Vec<JobFailure>,
}

impl ScheduleReport {
  pub fn interrupted(&self) -> bool {
    self.failures.iter().any(|f| f.error.is_interrupted())
  }

  fn record(&mut self, outcome: JobOutcome) {
    match outcome {
      JobOutcome::Produced => self.produced += 1,
      JobOutcome::CacheHit => self.cache_hits += 1,
      JobOutcome::Deduplicated => self.deduplicated += 1,
      JobOutcome::Deleted => self.deleted += 1,
    }
  }
}

struct Shared<D> {
  dexer: Arc<D>,
  cache: Arc<ArtifactCache>,
  config: Arc<PipelineConfig>,
  flags: Arc<DexFlags>,
  context: Arc<dyn BuildContext>,
  interrupt: Interrupt,
  fingerprints: FingerprintSet,
  copy_duplicates: bool,
}

pub struct Scheduler<D> {
  dexer: Arc<D>,
  cache: Arc<ArtifactCache>,
  pool: WorkerPool,
  context: Arc<dyn BuildContext>,
  interrupt: Interrupt,
}

impl<D: Dexer> Scheduler<D> {
  pub fn new(
    dexer: Arc<D>,
    cache: Arc<ArtifactCache>,
    pool: WorkerPool,
    context: Arc<dyn BuildContext>,
    interrupt: Interrupt,
  ) -> Self {
    Self {
      dexer,
      cache,
      pool,
      context,
      interrupt,
    }
  }

  /// Run every job and wait for all of them.
  ///
  /// Fingerprints are only shared between the jobs of this call.
  pub async fn run(&self, jobs: Vec<Job>, config: Arc<PipelineConfig>) -> ScheduleReport {
    let shared = Arc::new(Shared {
      dexer: self.dexer.clone(),
      cache: self.cache.clone(),
      flags: Arc::new(DexFlags::from_config(&config)),
      copy_duplicates: !MergeMode::decide(&config).is_merge(),
      config,
      context: self.context.clone(),
      interrupt: self.interrupt.clone(),
      fingerprints: FingerprintSet::new(),
    });

    info!(jobs = jobs.len(), parallelism = self.pool.size(), "scheduling jobs");

    let mut join_set = JoinSet::new();
    let mut units = HashMap::new();

    for job in jobs {
      let unit = job.unit_path().to_path_buf();
      let shared = shared.clone();
      let pool = self.pool.clone();

      let handle = join_set.spawn(async move {
        let _permit = pool
          .acquire()
          .await
          .map_err(|e| JobError::Aborted(e.to_string()))?;
        run_job(&shared, job).await
      });
      units.insert(handle.id(), unit);
    }

    let mut report = ScheduleReport::default();

    while let Some(joined) = join_set.join_next_with_id().await {
      let (id, result) = match joined {
        Ok((id, result)) => (id, result),
        Err(e) => {
          let id = e.id();
          (id, Err(JobError::Aborted(e.to_string())))
        }
      };
      let unit = units.remove(&id).unwrap_or_default();

      match result {
        Ok(outcome) => report.record(outcome),
        Err(error) => {
          if error.is_interrupted() {
            debug!(unit = %unit.display(), "job interrupted");
          } else {
            error!(unit = %unit.display(), error = %error, "job failed");
          }
          report.failures.push(JobFailure { unit, error });
        }
      }
    }

    report.failures.sort_by(|a, b| a.unit.cmp(&b.unit));

    info!(
      produced = report.produced,
      cache_hits = report.cache_hits,
      deduplicated = report.deduplicated,
      deleted = report.deleted,
      failed = report.failures.len(),
      "jobs complete"
    );

    report
  }
}

async fn run_job<D: Dexer>(shared: &Shared<D>, job: Job) -> Result<JobOutcome, JobError> {
  match job {
    Job::Predex {
      unit,
      output,
      cacheable,
    } => predex(shared, unit, output, cacheable).await,
    Job::Delete { unit, output } => {
      debug!(unit = %unit.display(), output = %output.display(), "removing stale output");
      tokio::task::spawn_blocking(move || remove_path(&output).map_err(|source| JobError::Delete { path: output, source }))
        .await
        .map_err(|e| JobError::Aborted(e.to_string()))??;
      Ok(JobOutcome::Deleted)
    }
  }
}

async fn predex<D: Dexer>(
  shared: &Shared<D>,
  unit: InputUnit,
  output: PathBuf,
  cacheable: bool,
) -> Result<JobOutcome, JobError> {
  if shared.interrupt.is_triggered() {
    return Err(JobError::Interrupted);
  }

  let (fingerprint, key) = {
    let unit = unit.clone();
    let config = shared.config.clone();
    tokio::task::spawn_blocking(move || {
      let fingerprint = unit_fingerprint(&unit.path).map_err(CacheError::from)?;
      let key = if cacheable {
        Some(build_key(&unit, &config)?)
      } else {
        None
      };
      Ok::<_, CacheError>((fingerprint, key))
    })
    .await
    .map_err(|e| JobError::Aborted(e.to_string()))??
  };

  let owner = match shared.fingerprints.claim(fingerprint, &output) {
    Claim::Owner(owner) => owner,
    Claim::Duplicate(original) => return share_duplicate(shared, &unit, output, original).await,
  };

  info!(unit = %unit.path.display(), "pre-dexing");

  let dexer = shared.dexer.clone();
  let flags = shared.flags.clone();
  let input = unit.path.clone();
  let produce = move |out: PathBuf| async move { dexer.predex(&input, &out, &flags).await.map_err(JobError::from) };

  let outcome = match &key {
    Some(key) => shared.cache.get_or_create(&output, key, produce).await?,
    None => {
      produce_uncached(&output, produce).await?;
      CacheOutcome::Uncached
    }
  };

  report_outputs(shared.context.as_ref(), &output);
  owner.succeed();

  Ok(match outcome {
    CacheOutcome::Hit => JobOutcome::CacheHit,
    CacheOutcome::Produced | CacheOutcome::Uncached => JobOutcome::Produced,
  })
}

async fn share_duplicate<D: Dexer>(
  shared: &Shared<D>,
  unit: &InputUnit,
  output: PathBuf,
  original: DuplicateOf,
) -> Result<JobOutcome, JobError> {
  debug!(
    unit = %unit.path.display(),
    original = %original.output().display(),
    "identical unit already scheduled"
  );

  if !shared.copy_duplicates || !original.wait().await {
    return Ok(JobOutcome::Deduplicated);
  }

  let source = original.output().to_path_buf();
  let target = output.clone();
  tokio::task::spawn_blocking(move || {
    remove_path(&target)
      .and_then(|()| copy_path(&source, &target))
      .map_err(|source| JobError::Copy { path: target, source })
  })
  .await
  .map_err(|e| JobError::Aborted(e.to_string()))??;

  report_outputs(shared.context.as_ref(), &output);
  Ok(JobOutcome::Deduplicated)
}
