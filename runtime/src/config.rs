//! Runtime configuration.
//!
//! Typed configuration with a bon builder, plus environment variable fallbacks.

use std::sync::Arc;

use bon::bon;

use crate::toolchain::{ClangToolchain, InterpToolchain, Toolchain};

/// Which toolchain compiles kernels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ToolchainKind {
    /// In-process reference evaluator.
    #[default]
    Interp,
    /// Native shared objects built with a C++ compiler.
    Clang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub toolchain: ToolchainKind,
    /// C++ compiler executable used by [`ToolchainKind::Clang`].
    pub cxx: String,
    /// Appended after the kernel's own flags.
    pub cxxflags: Vec<String>,
    pub opt_level: u8,
    /// Keep native build directories around for inspection.
    pub keep_build: bool,
    /// Highest derivative order accepted by the derivator.
    pub max_order: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            toolchain: ToolchainKind::Interp,
            cxx: "clang++".to_owned(),
            cxxflags: Vec::new(),
            opt_level: 2,
            keep_build: false,
            max_order: 4,
        }
    }
}

#[bon]
impl RuntimeConfig {
    #[builder]
    pub fn builder(
        #[builder(default)] toolchain: ToolchainKind,
        #[builder(default = "clang++".to_owned(), into)] cxx: String,
        #[builder(default)] cxxflags: Vec<String>,
        #[builder(default = 2)] opt_level: u8,
        #[builder(default = false)] keep_build: bool,
        #[builder(default = 4)] max_order: usize,
    ) -> Self {
        Self { toolchain, cxx, cxxflags, opt_level, keep_build, max_order }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `KERNAX_TOOLCHAIN` - `interp` or `clang` (default: interp)
    /// * `KERNAX_CXX` - C++ compiler executable (default: clang++)
    /// * `KERNAX_CXXFLAGS` - extra compiler flags, whitespace separated
    /// * `KERNAX_OPT_LEVEL` - optimisation level passed as `-O<n>` (default: 2)
    /// * `KERNAX_KEEP_BUILD` - keep native build directories if set
    /// * `KERNAX_MAX_ORDER` - highest derivative order (default: 4)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`Self::from_env`] with variables read through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let toolchain = var("KERNAX_TOOLCHAIN").and_then(|s| s.parse().ok()).unwrap_or_default();
        let cxx = var("KERNAX_CXX").filter(|s| !s.trim().is_empty()).unwrap_or_else(|| "clang++".to_owned());
        let cxxflags =
            var("KERNAX_CXXFLAGS").map(|s| s.split_whitespace().map(str::to_owned).collect()).unwrap_or_default();
        let opt_level = var("KERNAX_OPT_LEVEL").and_then(|s| s.parse().ok()).unwrap_or(2);
        let keep_build = var("KERNAX_KEEP_BUILD").is_some();
        let max_order = var("KERNAX_MAX_ORDER").and_then(|s| s.parse().ok()).unwrap_or(4);

        Self { toolchain, cxx, cxxflags, opt_level, keep_build, max_order }
    }

    /// Instantiate the configured toolchain.
    pub fn build_toolchain(&self) -> Arc<dyn Toolchain> {
        match self.toolchain {
            ToolchainKind::Interp => Arc::new(InterpToolchain::new()),
            ToolchainKind::Clang => Arc::new(ClangToolchain::from_config(self)),
        }
    }
}
