use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::AgentwireConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "agentwire.toml",
    "agentwire.yaml",
    "agentwire.yml",
    "agentwire.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<AgentwireConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env overrides.
///
/// Search order:
/// 1. `./agentwire.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/agentwire/agentwire.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `AgentwireConfig::default()` if no file is found or it
/// fails to parse.
pub fn discover_and_load() -> AgentwireConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                AgentwireConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            AgentwireConfig::default()
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// Apply environment overrides on top of a loaded config.
///
/// `AGENTWIRE_*` variables win over the legacy `OLLAMA_*` pair.
pub fn apply_env_overrides(config: &mut AgentwireConfig, lookup: impl Fn(&str) -> Option<String>) {
    let first = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| lookup(n).filter(|v| !v.trim().is_empty()))
    };

    if let Some(url) = first(&["AGENTWIRE_BASE_URL", "OLLAMA_BASE_URL"]) {
        config.model.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(model) = first(&["AGENTWIRE_MODEL", "OLLAMA_MODEL"]) {
        config.model.model = model;
    }
    if let Some(key) = first(&["AGENTWIRE_API_KEY"]) {
        config.model.api_key = Some(Secret::new(key));
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists());
    if local.is_some() {
        return local;
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/agentwire/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agentwire").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory, or `./.agentwire` when no home is known.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "agentwire")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".agentwire"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<AgentwireConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
