use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::expand_env_values,
    error::{Context, Error, Result},
    schema::PanelConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "wapanel.toml",
    "wapanel.yaml",
    "wapanel.yml",
    "wapanel.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<PanelConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_config(&raw, path, &|name| std::env::var(name).ok())
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wapanel.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wapanel/wapanel.{toml,yaml,yml,json}` (user-global)
///
/// Returns `PanelConfig::default()` if no config file is found.
pub fn discover_and_load() -> PanelConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    PanelConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/wapanel/
    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/wapanel/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wapanel").map(|d| d.config_dir().to_path_buf())
}

/// Parse by extension into a neutral document, expand `${VAR}` in its
/// string values, then read it as [`PanelConfig`].
fn parse_config(
    raw: &str,
    path: &Path,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<PanelConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    let mut doc: serde_json::Value = match ext {
        "toml" => toml::from_str(raw)?,
        "yaml" | "yml" => serde_yaml::from_str(raw)?,
        "json" => serde_json::from_str(raw)?,
        _ => return Err(Error::message(format!("unsupported config format: .{ext}"))),
    };
    if doc.is_null() {
        // Empty YAML document.
        doc = serde_json::Value::Object(serde_json::Map::new());
    }
    expand_env_values(&mut doc, lookup);
    Ok(serde_json::from_value(doc)?)
}
