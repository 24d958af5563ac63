//! predex-lib: incremental dex transform
//!
//! This crate turns compiled class inputs into dex output:
//! - `unit`: input units (directories and archives) with their change state
//! - `classify`: which units need work, which are gone, which can be skipped
//! - `cache`: content-addressed store of pre-dexed external libraries
//! - `schedule`: bounded concurrent pre-dex with in-run deduplication
//! - `merge` / `output`: where pre-dex output lands and whether it is merged
//! - `pipeline`: the `run` entry point tying it together
//! - `state`: snapshot of the inputs used to derive change state between runs

pub mod cache;
pub mod classify;
pub mod config;
pub mod consts;
pub mod context;
pub mod interrupt;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod schedule;
pub mod state;
pub mod tool;
pub mod unit;
pub mod util;
