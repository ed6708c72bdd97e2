//! Static GPU backend recipe table.
//!
//! Each backend maps to exactly one substitution recipe: the distributions
//! that must leave the environment, then the pinned requirements that take
//! their place. Adding a backend means one more recipe and match arm here.

use std::fmt;

use serde::Serialize;

use crate::consts::ONNXRUNTIME_VERSION;

/// The inference backend a build links against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
  /// DirectML acceleration, any GPU vendor on Windows.
  DirectMl,
  /// Stock runtime with built-in CoreML on Apple Silicon.
  CoreMl,
  /// Stock runtime, CPU only.
  Cpu,
  /// CUDA runtime expected to be installed on the user's machine.
  Cuda,
  /// CUDA and cuDNN runtime wheels embedded in the build.
  CudaEmbedded,
}

impl Backend {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::DirectMl => "directml",
      Self::CoreMl => "coreml",
      Self::Cpu => "cpu",
      Self::Cuda => "cuda",
      Self::CudaEmbedded => "cuda_embedded",
    }
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A pinned requirement as it appears in a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedPackage {
  pub name: &'static str,
  pub extras: &'static [&'static str],
  pub version: &'static str,
}

#[derive(Debug)]
pub(crate) struct Recipe {
  pub backend: Backend,
  pub remove: &'static [&'static str],
  pub add: &'static [PinnedPackage],
}

/// Every distribution that provides the ONNX Runtime module, plus the
/// NVIDIA runtime wheels pulled in by the embedded CUDA extras.
pub const BACKEND_DISTRIBUTIONS: &[&str] = &[
  "onnxruntime",
  "onnxruntime-directml",
  "onnxruntime-gpu",
  "onnxruntime-silicon",
  "nvidia-cuda-runtime-cu12",
  "nvidia-cudnn-cu12",
  "nvidia-cublas-cu12",
  "nvidia-cufft-cu12",
  "nvidia-curand-cu12",
  "nvidia-cuda-nvrtc-cu12",
];

const STOCK_RUNTIME: &[PinnedPackage] = &[PinnedPackage {
  name: "onnxruntime",
  extras: &[],
  version: ONNXRUNTIME_VERSION,
}];

const REMOVE_ALL_BUT_STOCK: &[&str] = &[
  "onnxruntime-directml",
  "onnxruntime-gpu",
  "onnxruntime-silicon",
  "nvidia-cuda-runtime-cu12",
  "nvidia-cudnn-cu12",
  "nvidia-cublas-cu12",
  "nvidia-cufft-cu12",
  "nvidia-curand-cu12",
  "nvidia-cuda-nvrtc-cu12",
];

static DIRECTML: Recipe = Recipe {
  backend: Backend::DirectMl,
  remove: &[
    "onnxruntime",
    "onnxruntime-gpu",
    "onnxruntime-silicon",
    "nvidia-cuda-runtime-cu12",
    "nvidia-cudnn-cu12",
    "nvidia-cublas-cu12",
    "nvidia-cufft-cu12",
    "nvidia-curand-cu12",
    "nvidia-cuda-nvrtc-cu12",
  ],
  add: &[PinnedPackage {
    name: "onnxruntime-directml",
    extras: &[],
    version: ONNXRUNTIME_VERSION,
  }],
};

static COREML: Recipe = Recipe {
  backend: Backend::CoreMl,
  remove: REMOVE_ALL_BUT_STOCK,
  add: STOCK_RUNTIME,
};

static CPU: Recipe = Recipe {
  backend: Backend::Cpu,
  remove: REMOVE_ALL_BUT_STOCK,
  add: STOCK_RUNTIME,
};

static CUDA: Recipe = Recipe {
  backend: Backend::Cuda,
  // The embedded runtime wheels shadow the system CUDA libraries and
  // produce version conflicts at load time, so they go too.
  remove: &[
    "onnxruntime",
    "onnxruntime-directml",
    "onnxruntime-silicon",
    "nvidia-cuda-runtime-cu12",
    "nvidia-cudnn-cu12",
    "nvidia-cublas-cu12",
    "nvidia-cufft-cu12",
    "nvidia-curand-cu12",
    "nvidia-cuda-nvrtc-cu12",
  ],
  add: &[PinnedPackage {
    name: "onnxruntime-gpu",
    extras: &[],
    version: ONNXRUNTIME_VERSION,
  }],
};

static CUDA_EMBEDDED: Recipe = Recipe {
  backend: Backend::CudaEmbedded,
  // onnxruntime-gpu itself is reinstalled so the extras are resolved.
  remove: &[
    "onnxruntime",
    "onnxruntime-directml",
    "onnxruntime-silicon",
    "onnxruntime-gpu",
  ],
  add: &[PinnedPackage {
    name: "onnxruntime-gpu",
    extras: &["cuda", "cudnn"],
    version: ONNXRUNTIME_VERSION,
  }],
};

pub(crate) fn recipe_for(backend: Backend) -> &'static Recipe {
  match backend {
    Backend::DirectMl => &DIRECTML,
    Backend::CoreMl => &COREML,
    Backend::Cpu => &CPU,
    Backend::Cuda => &CUDA,
    Backend::CudaEmbedded => &CUDA_EMBEDDED,
  }
}
