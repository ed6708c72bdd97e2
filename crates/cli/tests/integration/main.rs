//! CLI integration tests that drive full builds against fake tools.

#[cfg(unix)]
mod common;

#[cfg(unix)]
mod build_tests;
#[cfg(unix)]
mod bundle_tests;
