use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::{DevenvError, Result};

/// Project configuration file, relative to the project root.
pub const CONFIG_RELATIVE_PATH: &str = ".devenv/config.yml";

/// User preferences directory, relative to the home directory.
pub const USER_CONFIG_SUBDIR: &str = ".config/devenv";

/// Base image used when the project does not pin one. Vanilla Ubuntu LTS is
/// enough since mise handles toolchain management inside the container.
pub const DEFAULT_BASE_IMAGE: &str = "mcr.microsoft.com/devcontainers/base:ubuntu-24.04";

/// Plugin list files scanned per editor kind, one id per line.
const PLUGIN_FILES: [(&str, &str); 2] = [
    ("vscode", "plugins.vscode.txt"),
    ("jetbrains", "plugins.jetbrains.txt"),
];

/// A bind/volume mount declaration, shared between the project config and
/// the generated specification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mount {
    #[serde(rename = "source")]
    pub source: String,

    #[serde(rename = "target")]
    pub target: String,

    #[serde(rename = "type")]
    pub mount_type: String,
}

impl Mount {
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mount_type: "bind".to_string(),
        }
    }
}

/// Project-scoped settings, persisted as `.devenv/config.yml`.
///
/// Every field is optional on disk; missing identity fields fall back to the
/// generated defaults during merging and are checked by validation after.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mounts: Option<Vec<Mount>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<BTreeMap<String, Vec<String>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_create_command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_start_command: Option<String>,
}

/// Personal preferences assembled from the user preferences directory.
///
/// Deliberately narrow: the type itself cannot carry identity or
/// infrastructure fields, which is how the merge ownership policy is
/// enforced by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserConfig {
    pub plugins: BTreeMap<String, Vec<String>>,
    pub hooks_dir: Option<PathBuf>,
    pub dotfiles_dir: Option<PathBuf>,
}

/// The single merged-and-validated configuration consumed by the generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedConfig {
    pub name: String,
    pub image: String,
    pub ports: Option<Vec<String>>,
    pub environment: Option<BTreeMap<String, String>>,
    pub features: Option<BTreeMap<String, serde_json::Value>>,
    pub mounts: Option<Vec<Mount>>,
    pub plugins: BTreeMap<String, Vec<String>>,
    pub post_create_command: Option<String>,
    pub post_start_command: Option<String>,
    pub hooks_dir: Option<PathBuf>,
    pub dotfiles_dir: Option<PathBuf>,
}

/// Generate default project settings for `init`.
pub fn generate_default_config(project_path: &Path, ports: Option<Vec<String>>) -> ProjectConfig {
    ProjectConfig {
        name: Some(project_dir_name(project_path)),
        image: Some(DEFAULT_BASE_IMAGE.to_string()),
        ports: ports.filter(|p| !p.is_empty()),
        ..Default::default()
    }
}

fn project_dir_name(project_path: &Path) -> String {
    let resolved = project_path
        .canonicalize()
        .unwrap_or_else(|_| project_path.to_path_buf());
    resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load the project configuration if the file exists.
///
/// An absent file is not an error; a file that fails to parse is.
pub fn load_project_config(config_path: &Path) -> Result<Option<ProjectConfig>> {
    if !config_path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(config_path)?;
    let config = serde_yaml::from_str(&raw).map_err(|source| DevenvError::ConfigParse {
        path: config_path.to_path_buf(),
        source,
    })?;

    Ok(Some(config))
}

/// Write the project configuration, creating `.devenv/` if needed.
pub fn write_config_file(config: &ProjectConfig, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let yaml = serde_yaml::to_string(config)?;
    fs::write(config_path, yaml)?;

    Ok(())
}

pub fn config_exists(config_path: &Path) -> bool {
    config_path.exists()
}

/// Assemble user preferences from `<home>/.config/devenv/`.
///
/// Returns `None` when the directory is absent or contributes nothing.
pub fn load_user_config(home_dir: &Path) -> Option<UserConfig> {
    let config_dir = home_dir.join(USER_CONFIG_SUBDIR);
    if !config_dir.is_dir() {
        return None;
    }

    let mut user = UserConfig::default();

    for (editor, file_name) in PLUGIN_FILES {
        let path = config_dir.join(file_name);
        if let Some(plugins) = read_plugin_list(&path) {
            if !plugins.is_empty() {
                user.plugins.insert(editor.to_string(), plugins);
            }
        }
    }

    let hooks_dir = config_dir.join("hooks");
    if hooks_dir.is_dir() {
        user.hooks_dir = Some(hooks_dir);
    }

    let dotfiles_dir = config_dir.join("dotfiles");
    if dotfiles_dir.is_dir() {
        user.dotfiles_dir = Some(dotfiles_dir);
    }

    if user.plugins.is_empty() && user.hooks_dir.is_none() && user.dotfiles_dir.is_none() {
        None
    } else {
        Some(user)
    }
}

/// One plugin id per non-empty, non-comment line, file order preserved.
fn read_plugin_list(path: &Path) -> Option<Vec<String>> {
    let raw = fs::read_to_string(path).ok()?;
    Some(
        raw.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
    )
}

/// Merge project settings and user preferences over generated defaults.
///
/// The user layer may contribute plugins, hooks_dir and dotfiles_dir only;
/// identity and infrastructure stay owned by the project layer.
pub fn merge_configs(
    project: Option<ProjectConfig>,
    user: Option<UserConfig>,
    project_path: &Path,
) -> MergedConfig {
    let mut merged = MergedConfig {
        name: project_dir_name(project_path),
        image: DEFAULT_BASE_IMAGE.to_string(),
        ..Default::default()
    };

    if let Some(project) = project {
        if let Some(name) = project.name {
            merged.name = name;
        }
        if let Some(image) = project.image {
            merged.image = image;
        }
        merged.ports = project.ports;
        merged.environment = project.environment;
        merged.features = project.features;
        merged.mounts = project.mounts;
        if let Some(plugins) = project.plugins {
            merged.plugins = plugins;
        }
        merged.post_create_command = project.post_create_command;
        merged.post_start_command = project.post_start_command;
    }

    if let Some(user) = user {
        for (editor, plugins) in user.plugins {
            let entry = merged.plugins.entry(editor).or_default();
            for plugin in plugins {
                if !entry.contains(&plugin) {
                    entry.push(plugin);
                }
            }
        }
        merged.hooks_dir = user.hooks_dir;
        merged.dotfiles_dir = user.dotfiles_dir;
    }

    merged
}

/// Validate the merged configuration. Runs after every merge.
pub fn validate_config(config: &MergedConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(DevenvError::Validation(
            "Required field 'name' is missing or empty".to_string(),
        ));
    }

    if config.image.trim().is_empty() {
        return Err(DevenvError::Validation(
            "Required field 'image' is missing or empty".to_string(),
        ));
    }

    if !config
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DevenvError::Validation(format!(
            "Project name '{}' contains invalid characters (letters, digits, '-' and '_' only)",
            config.name
        )));
    }

    Ok(())
}

/// Load both layers, merge and validate in one step.
pub fn load_and_merge_config(
    project_path: &Path,
    home_override: Option<&Path>,
) -> Result<MergedConfig> {
    let config_path = project_path.join(CONFIG_RELATIVE_PATH);
    let project = load_project_config(&config_path)?;
    if project.is_none() {
        debug!("No project configuration at {}", config_path.display());
    }

    let user = home_override
        .map(Path::to_path_buf)
        .or_else(dirs::home_dir)
        .and_then(|home| load_user_config(&home));

    let merged = merge_configs(project, user, project_path);
    validate_config(&merged)?;

    Ok(merged)
}
