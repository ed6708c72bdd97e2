//! mtpack-lib: build and packaging logic for mtpack
//!
//! This crate turns a desktop Python application into per-platform,
//! per-GPU-variant distributables:
//! - `variant`: resolves build mode and GPU variant into a configuration and
//!   dependency manifest
//! - `deps`: enforces the manifest on the Python environment
//! - `bundle`: stages the UI runtime client into the app's assets
//! - `freeze`: drives the ahead-of-time freezer
//! - `package`: names, trims, compresses and archives the frozen output
//! - `pipeline`: runs all of the above in order

pub mod bundle;
pub mod consts;
pub mod deps;
pub mod exec;
pub mod freeze;
pub mod package;
pub mod pipeline;
pub mod platform;
pub mod project;
pub mod toolchain;
pub mod util;
pub mod variant;
