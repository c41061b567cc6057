//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/sweb/config.toml` (user config, or `$SWEB_CONFIG_DIR`)
//! 2. `./sweb.toml` (project-local)
//! 3. An explicit `--config` file
//! 4. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, SwebConfig};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "sweb.toml";

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for platform directory resolution.
const APP_NAME: &str = "sweb";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "SWEB_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: SwebConfig,
    /// Sources that were checked, lowest precedence first.
    pub sources: Vec<ConfigSource>,
    /// Problems with optional layers that were skipped.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging the user and project layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None, None)
}

/// Load configuration with explicit control over every layer.
///
/// `config_dir` overrides both `SWEB_CONFIG_DIR` and the platform default.
/// `explicit` is applied last; unlike the discovered layers, a missing or
/// malformed explicit file is an error. The merged result is validated.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = SwebConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => user_config_path(),
    };
    if let Some(path) = user_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if let Some(path) = explicit {
        config.merge(load_config_file(path)?);
        sources.push(ConfigSource {
            path: path.to_path_buf(),
            loaded: true,
        });
    }

    config.validate()?;

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<SwebConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    SwebConfig::from_toml(&contents)
}

/// Path of the user config file.
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// User config directory for sweb. Also holds the `logs/` directory.
///
/// Checks `SWEB_CONFIG_DIR` first, then falls back to the platform default.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load an optional config file and merge it into `config`.
fn load_layer(config: &mut SwebConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    if !path.is_file() {
        return ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        };
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            }
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::ProviderKind;

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert!(loaded.config.session.is_none());
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_layers_merge_in_order() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let explicit_dir = TempDir::new().unwrap();

        fs::write(
            user.path().join("config.toml"),
            r#"
[session]
timeout_secs = 60

[cookie]
name = "USER"

[server]
bind = "127.0.0.1:1000"
"#,
        )
        .unwrap();
        fs::write(
            project.path().join("sweb.toml"),
            r#"
[cookie]
name = "PROJECT"

[server]
bind = "127.0.0.1:2000"
"#,
        )
        .unwrap();
        let explicit = explicit_dir.path().join("custom.toml");
        fs::write(&explicit, "[server]\nbind = \"127.0.0.1:3000\"\n").unwrap();

        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), Some(&explicit))
                .unwrap();
        let config = &loaded.config;

        assert_eq!(config.session().timeout_secs, 60);
        assert_eq!(config.cookie().name, "PROJECT");
        assert_eq!(config.server().bind, "127.0.0.1:3000");
        assert_eq!(loaded.loaded_from().len(), 3);
    }

    #[test]
    fn test_malformed_layer_warns_but_continues() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("sweb.toml"), "not valid toml {{{{").unwrap();

        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let result = load_config_with_options(
            Some(project.path()),
            Some(user.path()),
            Some(Path::new("/nonexistent/sweb.toml")),
        );
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_merged_config_is_validated() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(project.path().join("sweb.toml"), "[session]\nprovider = \"file\"\n").unwrap();

        let err =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        fs::write(
            project.path().join("sweb.toml"),
            "[session]\nprovider = \"file\"\nsave_path = \"/tmp/sweb\"\n",
        )
        .unwrap();
        let loaded =
            load_config_with_options(Some(project.path()), Some(user.path()), None).unwrap();
        assert_eq!(loaded.config.session().provider, ProviderKind::File);
    }
}
