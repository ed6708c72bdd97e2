//! Well-known names and defaults shared across the crate.

/// Project configuration file looked up at the project root.
pub const PROJECT_FILENAME: &str = "mtpack.toml";

/// Root of all freezer output, relative to the project root.
pub const DIST_DIR: &str = "dist";

/// Default number of parallel compile jobs handed to the freezer.
pub const DEFAULT_JOBS: u32 = 2;

/// Environment variable selecting the GPU variant.
pub const CUDA_VARIANT_ENV: &str = "CUDA_VARIANT";

/// Pinned ONNX Runtime release shared by every backend recipe.
pub const ONNXRUNTIME_VERSION: &str = "1.22.0";

/// Suffix of the freezer's standalone output directory.
pub const FREEZE_DIST_SUFFIX: &str = "dist";

/// Suffix of the freezer's intermediate build directory.
pub const FREEZE_BUILD_SUFFIX: &str = "build";

/// Appended to a bundle archive's name for its stamp file.
pub const BUNDLE_STAMP_SUFFIX: &str = ".stamp.json";

/// Appended to a bundle archive's name while it is being written.
pub const BUNDLE_PARTIAL_SUFFIX: &str = ".partial";

/// Modules the freezer must never follow into the frozen app.
pub const DEFAULT_EXCLUDED_MODULES: &[&str] = &[
  "tkinter",
  "unittest",
  "test",
  "pytest",
  "setuptools",
  "distutils",
  "wheel",
  "pip",
  "IPython",
  "matplotlib",
  "pdb",
  "xml",
];
