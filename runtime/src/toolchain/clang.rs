//! Native compilation through a C++ compiler and dynamic loading.
//!
//! Writes `prelude + user source + adapter` to a temp directory, compiles it via
//! `clang++ -std=c++17 -shared -fPIC -O<n>` and loads the resulting shared
//! library via `dlopen`. The only symbol looked up is the ABI adapter.

use std::ffi::c_void;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use kernax_codegen::adapter;
use kernax_device::Buffer;
use smallvec::SmallVec;

use super::{CompilerInvocation, NativeUnit, Toolchain};
use crate::config::RuntimeConfig;
use crate::error::*;

type AdapterFn = unsafe extern "C" fn(*mut *mut c_void, *mut *mut c_void);

#[derive(Debug)]
pub struct ClangToolchain {
    cxx: String,
    extra_flags: Vec<String>,
    opt_level: u8,
    keep_build: bool,
    invocations: AtomicUsize,
}

impl ClangToolchain {
    pub fn new(cxx: impl Into<String>) -> Self {
        Self::from_config(&RuntimeConfig::builder().cxx(cxx.into()).build())
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            cxx: config.cxx.clone(),
            extra_flags: config.cxxflags.clone(),
            opt_level: config.opt_level,
            keep_build: config.keep_build,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Whether the compiler executable can be run at all.
    pub fn is_available(&self) -> bool {
        Command::new(&self.cxx).arg("--version").output().is_ok_and(|out| out.status.success())
    }

    fn failure(invocation: &CompilerInvocation<'_>, diagnostic: impl Into<String>) -> Error {
        let diagnostic = diagnostic.into();
        tracing::warn!(entry = %invocation.source.entry, %diagnostic, "native compilation failed");
        Error::Compilation { entry: invocation.source.entry.clone(), diagnostic }
    }

    fn build(&self, invocation: &CompilerInvocation<'_>, dir: &Path) -> Result<libloading::Library> {
        let src_path = dir.join("kernel.cpp");
        let so_path = dir.join("kernel.so");

        let unit = adapter::translation_unit(
            &invocation.source.source,
            &invocation.source.entry,
            invocation.symbol,
            &invocation.abi.outputs,
            &invocation.abi.inputs,
        );
        std::fs::write(&src_path, unit)
            .map_err(|e| Self::failure(invocation, format!("failed to write {}: {e}", src_path.display())))?;

        let output = Command::new(&self.cxx)
            .args(["-std=c++17", "-shared", "-fPIC"])
            .arg(format!("-O{}", self.opt_level))
            .args(&invocation.source.flags)
            .args(&self.extra_flags)
            .arg("-o")
            .arg(&so_path)
            .arg(&src_path)
            .output()
            .map_err(|e| Self::failure(invocation, format!("failed to run {}: {e}. Is it installed?", self.cxx)))?;

        if !output.status.success() {
            return Err(Self::failure(invocation, String::from_utf8_lossy(&output.stderr)));
        }

        // SAFETY: the library was built from our own translation unit; its initialisers are
        // those of the C++ standard library only.
        unsafe { libloading::Library::new(&so_path) }
            .map_err(|e| Self::failure(invocation, format!("failed to load shared library: {e}")))
    }
}

impl Toolchain for ClangToolchain {
    fn name(&self) -> &'static str {
        "clang"
    }

    fn compile(&self, invocation: &CompilerInvocation<'_>) -> Result<Box<dyn NativeUnit>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let dir = tempfile::Builder::new()
            .prefix("kernax-")
            .keep(self.keep_build)
            .tempdir()
            .map_err(|e| Self::failure(invocation, format!("failed to create build directory: {e}")))?;
        tracing::debug!(
            entry = %invocation.source.entry,
            cxx = %self.cxx,
            dir = %dir.path().display(),
            "invoking native compiler"
        );

        let library = self.build(invocation, dir.path())?;

        // SAFETY: the adapter is emitted by `adapter::translation_unit` with exactly this signature.
        let func = unsafe { library.get::<AdapterFn>(invocation.symbol.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|e| Self::failure(invocation, format!("symbol '{}' not found: {e}", invocation.symbol)))?;

        tracing::debug!(
            entry = %invocation.source.entry,
            symbol = invocation.symbol,
            elapsed = ?started.elapsed(),
            "native kernel compiled and loaded"
        );

        Ok(Box::new(ClangUnit { func, symbol: invocation.symbol.to_owned(), _library: library, _dir: dir }))
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

/// A compiled kernel loaded as a shared library.
struct ClangUnit {
    func: AdapterFn,
    symbol: String,
    /// Keeps `func` mapped.
    _library: libloading::Library,
    _dir: tempfile::TempDir,
}

impl NativeUnit for ClangUnit {
    fn invoke(&self, outputs: &mut [Buffer], inputs: &[Buffer]) -> Result<()> {
        let mut outs: SmallVec<[*mut c_void; 4]> = outputs.iter_mut().map(|b| b.as_mut_ptr().cast()).collect();
        let mut ins: SmallVec<[*mut c_void; 4]> = inputs.iter().map(|b| b.as_ptr().cast_mut().cast()).collect();

        // SAFETY: the caller checked every buffer against the ABI the adapter was generated for,
        // so each pointer covers the full row-major extent the adapter reinterprets. Inputs are
        // only read through `const` references.
        unsafe { (self.func)(outs.as_mut_ptr(), ins.as_mut_ptr()) };
        Ok(())
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }
}
