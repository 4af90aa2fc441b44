use std::collections::HashMap;

use crate::{BridgeConfig, RuntimeConfig, ToolchainKind};

fn from_vars(vars: &[(&str, &str)]) -> BridgeConfig {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    BridgeConfig::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn test_defaults() {
    let config = BridgeConfig::default();
    assert_eq!(config.runtime, RuntimeConfig::default());
    assert!(config.default_flags.is_empty());

    assert_eq!(BridgeConfig::builder().build(), config);
    assert_eq!(from_vars(&[]), config);
}

#[test]
fn test_builder_overrides() {
    let runtime = RuntimeConfig::builder().toolchain(ToolchainKind::Clang).max_order(2).build();
    let config =
        BridgeConfig::builder().runtime(runtime.clone()).default_flags(vec!["-I/opt/include".to_owned()]).build();
    assert_eq!(config.runtime, runtime);
    assert_eq!(config.default_flags, vec!["-I/opt/include"]);
}

#[test]
fn test_environment() {
    let config = from_vars(&[("KERNAX_FLAGS", " -DN=4  -I/opt/include "), ("KERNAX_MAX_ORDER", "3")]);
    assert_eq!(config.default_flags, vec!["-DN=4", "-I/opt/include"]);
    assert_eq!(config.runtime.max_order, 3);
    assert_eq!(config.runtime.toolchain, ToolchainKind::Interp);
}
