//! Bridge configuration: the runtime's settings plus per-call defaults.

use bon::bon;
use kernax_runtime::RuntimeConfig;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeConfig {
    pub runtime: RuntimeConfig,
    /// Flags for kernel calls that do not set their own (include paths, defines).
    pub default_flags: Vec<String>,
}

#[bon]
impl BridgeConfig {
    #[builder]
    pub fn builder(#[builder(default)] runtime: RuntimeConfig, #[builder(default)] default_flags: Vec<String>) -> Self {
        Self { runtime, default_flags }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads everything [`RuntimeConfig::from_env`] does, plus:
    ///
    /// * `KERNAX_FLAGS` - default kernel flags, whitespace separated
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`Self::from_env`] with variables read through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let default_flags =
            var("KERNAX_FLAGS").map(|s| s.split_whitespace().map(str::to_owned).collect()).unwrap_or_default();
        Self { runtime: RuntimeConfig::from_lookup(&var), default_flags }
    }
}
