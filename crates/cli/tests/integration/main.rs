//! CLI integration tests for strata.

mod build_tests;
mod cache_tests;
mod common;
mod plan_tests;
