//! Kernel identity: source text, entry point, flags and slot layout.

use std::hash::{Hash, Hasher};

use kernax_autodiff::Mode;
use kernax_dtype::ShapeSpec;
use rustc_hash::FxHasher;

/// A compilable unit. Two sources are the same kernel iff every field is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelSource {
    pub source: String,
    pub entry: String,
    pub flags: Vec<String>,
}

impl KernelSource {
    pub fn new(source: impl Into<String>, entry: impl Into<String>, flags: impl IntoIterator<Item = String>) -> Self {
        Self { source: source.into(), entry: entry.into(), flags: flags.into_iter().collect() }
    }
}

/// Calling convention of a compiled kernel: one slot per output, then one per input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelAbi {
    pub outputs: Vec<ShapeSpec>,
    pub inputs: Vec<ShapeSpec>,
}

impl KernelAbi {
    pub fn new(outputs: Vec<ShapeSpec>, inputs: Vec<ShapeSpec>) -> Self {
        Self { outputs, inputs }
    }

    /// Slot layout of the derivative kernel in `mode`.
    ///
    /// Forward interleaves every slot with its tangent. Reverse takes the
    /// inputs followed by output cotangents and returns input cotangents.
    pub fn derived(&self, mode: Mode) -> Self {
        match mode {
            Mode::Forward => Self {
                outputs: self.outputs.iter().flat_map(|s| [s.clone(), s.clone()]).collect(),
                inputs: self.inputs.iter().flat_map(|s| [s.clone(), s.clone()]).collect(),
            },
            Mode::Reverse => Self {
                outputs: self.inputs.clone(),
                inputs: self.inputs.iter().chain(&self.outputs).cloned().collect(),
            },
        }
    }
}

impl std::fmt::Display for KernelAbi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |specs: &[ShapeSpec]| specs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "({}) -> ({})", join(&self.inputs), join(&self.outputs))
    }
}

/// Content key of a compiled kernel.
pub fn content_key(source: &KernelSource, abi: &KernelAbi) -> u64 {
    let mut hasher = FxHasher::default();
    source.hash(&mut hasher);
    abi.hash(&mut hasher);
    hasher.finish()
}

/// Content key of one derivation step.
pub fn derivation_key(source: &KernelSource, abi: &KernelAbi, mode: Mode) -> u64 {
    let mut hasher = FxHasher::default();
    source.hash(&mut hasher);
    abi.hash(&mut hasher);
    mode.hash(&mut hasher);
    hasher.finish()
}
