//! End-to-end tests for `DexPipeline::run` with an in-process dexer.

mod common;
mod properties_tests;
mod scenarios_tests;
