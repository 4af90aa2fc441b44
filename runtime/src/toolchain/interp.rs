use std::sync::atomic::{AtomicUsize, Ordering};

use kernax_codegen::Function;
use kernax_device::Buffer;

use super::{CompilerInvocation, NativeUnit, Toolchain};
use crate::error::*;

/// Runs kernels in-process on the reference evaluator. Needs no external tools.
#[derive(Debug, Default)]
pub struct InterpToolchain {
    invocations: AtomicUsize,
}

impl InterpToolchain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Toolchain for InterpToolchain {
    fn name(&self) -> &'static str {
        "interp"
    }

    fn compile(&self, invocation: &CompilerInvocation<'_>) -> Result<Box<dyn NativeUnit>> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(InterpUnit { function: invocation.function.clone(), symbol: invocation.symbol.to_owned() }))
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

struct InterpUnit {
    function: Function,
    symbol: String,
}

impl NativeUnit for InterpUnit {
    fn invoke(&self, outputs: &mut [Buffer], inputs: &[Buffer]) -> Result<()> {
        kernax_codegen::eval::evaluate(&self.function, outputs, inputs)
            .map_err(|e| Error::Execution { entry: self.function.name.clone(), reason: e.to_string() })
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }
}
