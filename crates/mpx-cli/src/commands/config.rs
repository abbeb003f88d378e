use anyhow::Result;
use mpx_config::{load_layered_yaml, report_unused_keys, ConfigSurface, UnusedKeyPolicy};

/// Hash, canonical JSON and unused-key report of the given layers.
///
/// The typed engine view is built too, so shape errors surface here and
/// not at daemon start.
pub fn config_hash(paths: &[String], surface: ConfigSurface, strict: bool) -> Result<Vec<String>> {
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&refs)?;
    loaded.engine()?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(surface, &loaded.config_json, policy)?;

    let mut out = vec![
        format!("config_hash={}", loaded.config_hash),
        loaded.canonical_json.clone(),
    ];
    for p in &report.unused_leaf_pointers {
        out.push(format!("unused_key surface={} pointer={}", report.surface, p));
    }
    Ok(out)
}
