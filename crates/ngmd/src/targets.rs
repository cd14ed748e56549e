//! Expansion of configured components into scrape targets.

use anyhow::Context;

use ngm_conprof::{Target, default_profiling_paths};
use ngm_core::NgmConfig;

/// One target per configured component and built-in profile kind.
pub fn expand_targets(config: &NgmConfig) -> anyhow::Result<Vec<Target>> {
    let paths = default_profiling_paths(&config.continuous_profiling);
    let mut targets = Vec::with_capacity(config.targets.len() * paths.len());
    for component in &config.targets {
        for (kind, path) in &paths {
            let target = Target::from_config(component, kind, path).with_context(|| {
                format!(
                    "invalid target {}/{} ({kind})",
                    component.component, component.address
                )
            })?;
            targets.push(target);
        }
    }
    Ok(targets)
}
