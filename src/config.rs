//! Run configuration snapshots.
//!
//! A run may declare a configuration file at open time. The file is loaded as
//! a flat key/value mapping and stored verbatim on the run; the engine never
//! interprets its contents.

use crate::error::{AgentraceError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Opaque mapping of declared configuration values, captured at run open.
pub type ConfigSnapshot = HashMap<String, Value>;

/// Load a configuration snapshot from a YAML file.
///
/// The document root must be a mapping with string keys (an empty document is
/// treated as an empty snapshot). Values are carried over verbatim.
///
/// # Examples
///
/// ```no_run
/// use agentrace::config::load_snapshot;
/// use std::path::Path;
///
/// let snapshot = load_snapshot(Path::new("agent_config.yaml")).unwrap();
/// ```
pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot> {
    let text = std::fs::read_to_string(path)?;
    parse_snapshot(&text).map_err(|e| match e {
        AgentraceError::ConfigError(msg) => {
            AgentraceError::ConfigError(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

fn parse_snapshot(text: &str) -> Result<ConfigSnapshot> {
    let document: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| AgentraceError::ConfigError(format!("invalid YAML: {}", e)))?;

    let mapping = match document {
        serde_yaml::Value::Mapping(mapping) => mapping,
        serde_yaml::Value::Null => return Ok(ConfigSnapshot::new()),
        _ => {
            return Err(AgentraceError::ConfigError(
                "config root must be a mapping".to_string(),
            ))
        }
    };

    let mut snapshot = ConfigSnapshot::new();
    for (key, value) in mapping {
        let key = key
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentraceError::ConfigError("config keys must be strings".to_string()))?;
        snapshot.insert(key, serde_json::to_value(&value)?);
    }

    Ok(snapshot)
}
